//! Credential management for the options surface.

use std::sync::Arc;

use tracing::info;

use crate::store::{Options, Store, StoreError};

/// Reads and writes the stored provider credential.
#[derive(Clone)]
pub struct OptionsController {
    store: Arc<Store>,
}

impl OptionsController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Store `api_key` trimmed. A blank key clears the credential.
    pub fn save(&self, api_key: &str) -> Result<Options, StoreError> {
        let options = Options {
            openai_api_key: Some(api_key.trim().to_string()),
        };
        self.store.save_options(&options)?;
        let saved = self.store.load_options()?;
        if saved.openai_api_key.is_some() {
            info!("API key saved");
        } else {
            info!("API key cleared");
        }
        Ok(saved)
    }

    pub fn current(&self) -> Result<Options, StoreError> {
        self.store.load_options()
    }

    /// Whether a credential is configured.
    pub fn has_key(&self) -> Result<bool, StoreError> {
        Ok(self.store.api_key()?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_trims_and_current_reads_back() {
        let options = OptionsController::new(Arc::new(Store::in_memory()));
        assert!(!options.has_key().unwrap());

        let saved = options.save("  sk-test \n").unwrap();
        assert_eq!(saved.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(options.current().unwrap(), saved);
        assert!(options.has_key().unwrap());
    }

    #[test]
    fn blank_save_clears_the_key() {
        let options = OptionsController::new(Arc::new(Store::in_memory()));
        options.save("sk-test").unwrap();
        let saved = options.save("   ").unwrap();
        assert_eq!(saved.openai_api_key, None);
        assert!(!options.has_key().unwrap());
    }
}
