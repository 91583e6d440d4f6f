//! Convenience re-exports for common `jobgpt` types.
//!
//! ```ignore
//! use jobgpt::prelude::*;
//! ```

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ErrorCode, Message, MessageRole, ResearchError};

// ── Research client ─────────────────────────────────────────────────
pub use crate::api::{HttpTransport, ResearchResponse, Researcher, TokenUsage, Transport};
pub use crate::config::{DEFAULT_CLIENT_ID, ResearchConfig, default_data_dir};

// ── Controllers ─────────────────────────────────────────────────────
pub use crate::background::{BackgroundController, Command, CommandResponse, Notification};
pub use crate::options::OptionsController;
pub use crate::panel::{PanelController, PanelState, PanelView, Status};

// ── Persistence and logging ─────────────────────────────────────────
pub use crate::logging::{LogBuffer, LogCaptureLayer};
pub use crate::store::{Store, StoreError};
