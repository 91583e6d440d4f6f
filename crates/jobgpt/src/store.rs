//! Options and per-client panel state persistence.
//!
//! Two kinds of records:
//!
//! - **Options**: one global record holding the provider credential.
//! - **State snapshots**: one record per client id, keyed
//!   `clientId_{client_id}`, holding the last [`PanelState`] plus metadata.
//!
//! On disk each record is a JSON file in the data directory:
//!
//! ```text
//! data_dir/
//!   options.json
//!   state/
//!     clientId_jobgpt-sidepanel.json
//! ```
//!
//! Client ids are percent-encoded into file names, so distinct ids never
//! share a file. Each write goes to its own temp file in the target
//! directory and is renamed into place. The in-memory backend stores the
//! same JSON text so both paths share serialization.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::panel::PanelState;

/// Version stamped into every state snapshot.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const OPTIONS_KEY: &str = "options";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// User options. Only the credential for now.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
}

/// Persisted panel state for one client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub client_id: String,
    pub client_version: String,
    pub updated_at: DateTime<Utc>,
    pub state: PanelState,
}

enum Backend {
    Disk { dir: PathBuf },
    Memory(Mutex<HashMap<String, String>>),
}

/// Key-value store for options and state snapshots.
pub struct Store {
    backend: Backend,
}

impl Store {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let state_dir = dir.join("state");
        std::fs::create_dir_all(&state_dir).map_err(|source| StoreError::Io {
            path: state_dir,
            source,
        })?;
        Ok(Self {
            backend: Backend::Disk { dir },
        })
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Root directory, or `None` for the in-memory backend.
    pub fn dir(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Disk { dir } => Some(dir),
            Backend::Memory(_) => None,
        }
    }

    // ── Options ────────────────────────────────────────────────────

    pub fn load_options(&self) -> Result<Options, StoreError> {
        Ok(self.read(OPTIONS_KEY)?.unwrap_or_default())
    }

    /// Persist options. A blank key is stored as unset.
    pub fn save_options(&self, options: &Options) -> Result<(), StoreError> {
        let normalized = Options {
            openai_api_key: normalize_key(options.openai_api_key.as_deref()),
        };
        self.write(OPTIONS_KEY, &normalized)
    }

    /// The stored credential, if any.
    pub fn api_key(&self) -> Result<Option<String>, StoreError> {
        Ok(normalize_key(self.load_options()?.openai_api_key.as_deref()))
    }

    // ── State snapshots ────────────────────────────────────────────

    pub fn load_snapshot(&self, client_id: &str) -> Result<Option<StateSnapshot>, StoreError> {
        self.read(&state_key(client_id))
    }

    pub fn load_state(&self, client_id: &str) -> Result<Option<PanelState>, StoreError> {
        Ok(self.load_snapshot(client_id)?.map(|s| s.state))
    }

    /// Persist `state` for `client_id`, stamped with the current time.
    pub fn save_state(
        &self,
        client_id: &str,
        state: &PanelState,
    ) -> Result<StateSnapshot, StoreError> {
        let snapshot = StateSnapshot {
            client_id: client_id.to_string(),
            client_version: CLIENT_VERSION.to_string(),
            updated_at: Utc::now(),
            state: state.clone(),
        };
        self.write(&state_key(client_id), &snapshot)?;
        debug!("Saved UI state for client {client_id}");
        Ok(snapshot)
    }

    // ── Backend ────────────────────────────────────────────────────

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let text = match &self.backend {
            Backend::Disk { dir } => {
                let path = record_path(dir, key);
                match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                    Err(source) => return Err(StoreError::Io { path, source }),
                }
            }
            Backend::Memory(map) => {
                let map = map.lock().unwrap_or_else(|e| e.into_inner());
                match map.get(key) {
                    Some(text) => text.clone(),
                    None => return Ok(None),
                }
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            key: key.to_string(),
            source,
        })?;
        match &self.backend {
            Backend::Disk { dir } => {
                let path = record_path(dir, key);
                let parent = path.parent().unwrap_or(dir);
                let io_err = |source: std::io::Error| StoreError::Io {
                    path: path.clone(),
                    source,
                };
                let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
                tmp.write_all(json.as_bytes()).map_err(io_err)?;
                tmp.persist(&path).map_err(|e| io_err(e.error))?;
                Ok(())
            }
            Backend::Memory(map) => {
                map.lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key.to_string(), json);
                Ok(())
            }
        }
    }
}

/// Storage key of a client's state snapshot.
pub fn state_key(client_id: &str) -> String {
    format!("clientId_{client_id}")
}

fn record_path(dir: &Path, key: &str) -> PathBuf {
    if key == OPTIONS_KEY {
        return dir.join("options.json");
    }
    // Percent-encoding is injective and never emits a path separator.
    dir.join("state")
        .join(format!("{}.json", urlencoding::encode(key)))
}

fn normalize_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
