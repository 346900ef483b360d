//! Error types for timeline-store.

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error. Raised mid-batch, the whole batch is rolled back.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted JSON column could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A stored row could not be turned back into a value.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_row_display() {
        let err = StorageError::CorruptRow {
            table: "timeline_items",
            reason: "unknown timeline kind: quote".into(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt row in timeline_items: unknown timeline kind: quote"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StorageError>();
    }
}
