//! Error types for the timeline client.

use thiserror::Error;
use timeline_store::StorageError;

use crate::api::ApiError;
use crate::config::ConfigError;

/// Errors surfaced by the sync facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote API failed (after retries, when retryable).
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// The local cache failed; the batch was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The outbound write queue refused the write.
    #[error("write queue error: {0}")]
    WriteQueue(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
