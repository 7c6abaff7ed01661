//! Gramcast - command-line publishing for Instagram business accounts
//!
//! This library implements the graph API publish protocol (container,
//! processing wait, publish) for single posts, carousels, stories and reels,
//! and the lifecycle of the account's long-lived access token.

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod media;
pub mod post_config;
pub mod publisher;
pub mod retry;
pub mod secrets;
pub mod token;
pub mod transcode;
pub mod upload;

// Re-export commonly used types
pub use config::{Config, StorageBackend};
pub use error::{GramcastError, Result};
pub use graph::{CreationId, GraphApi, MediaId};
pub use media::{MediaItem, MediaKind};
pub use post_config::PostConfig;
pub use publisher::{PublishPolicies, PublishReport, Publisher, ReelOptions};
pub use retry::RetryPolicy;
pub use secrets::{AccountSecrets, SecretStore};
pub use token::{DaysRemaining, RefreshOutcome, TokenHealth, TokenManager};
