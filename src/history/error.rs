//! Error types for grab history operations.

use thiserror::Error;

/// Errors raised by history lookups.
#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    /// Database operation failed. `transient` failures (busy, locked, pool
    /// exhausted) may succeed on a later pass.
    #[error("history database error: {message}")]
    Database { message: String, transient: bool },

    /// No history record with this id.
    #[error(
        "history record not found: id {0}\n  Suggestion: The record may have been cleaned up or the ID is incorrect"
    )]
    RecordNotFound(i64),

    /// A stored row could not be mapped back to a record.
    #[error("invalid history record {id}: {reason}")]
    InvalidRecord { id: i64, reason: String },
}

impl From<sqlx::Error> for HistoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            transient: is_transient(&err),
            message: err.to_string(),
        }
    }
}

/// SQLite busy/locked (primary codes 5 and 6) or a pool that ran dry.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(database_error) => matches!(
            database_error.code().as_deref(),
            Some("5" | "6" | "SQLITE_BUSY" | "SQLITE_LOCKED")
        ),
        _ => false,
    }
}

impl HistoryError {
    /// Creates an `InvalidRecord` error.
    #[must_use]
    pub fn invalid_record(id: i64, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id,
            reason: reason.into(),
        }
    }

    /// Returns true when retrying the same operation later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_error_database_message() {
        let err = HistoryError::Database {
            message: "database is locked".to_string(),
            transient: true,
        };
        assert!(err.to_string().contains("database is locked"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_history_error_not_found_message() {
        let err = HistoryError::RecordNotFound(42);
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("Suggestion"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_pool_timeout_is_transient_and_closed_pool_is_not() {
        assert!(HistoryError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!HistoryError::from(sqlx::Error::PoolClosed).is_transient());
    }
}
