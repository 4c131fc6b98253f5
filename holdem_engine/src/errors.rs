//! Engine error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by every engine operation.
///
/// All variants except the I/O ones are recoverable: the caller can retry
/// (after re-fetching state) or correct its input. None of them leave
/// partially applied state behind, because mutations only commit after
/// full validation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller identity could not be resolved
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Table, hand, tournament or cash game does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Player has no seat at the table
    #[error("Player is not seated at this table")]
    NotSeated,

    /// Operation reserved for another participant (creator, registrant)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Illegal per the action rules, or not the caller's turn
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Caller acted on a stale hand version
    #[error("Version conflict: expected {expected}, hand is at {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// Malformed request (bad amounts, unknown action names, bad config)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request conflicts with the current lifecycle state
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Ledger refused a debit
    #[error("Insufficient chips: need {required}, have {available}")]
    InsufficientChips { required: i64, available: i64 },

    /// Ledger idempotency key already used
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage call exceeded its deadline
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Table actor is no longer running
    #[error("Table is closed")]
    ChannelClosed,
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller can recover by retrying or correcting input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::Database(_)
                | EngineError::Serialization(_)
                | EngineError::Timeout(_)
                | EngineError::ChannelClosed
        )
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            EngineError::Database(_) | EngineError::Serialization(_) => {
                "Internal server error".to_string()
            }
            EngineError::Timeout(_) => "Request timed out, please retry".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_message() {
        let err = EngineError::VersionConflict {
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.to_string(), "Version conflict: expected 3, hand is at 4");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_client_message_hides_database_details() {
        let err = EngineError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.client_message(), "Internal server error");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_not_found_helper() {
        let err = EngineError::not_found("table", 42);
        assert_eq!(err.to_string(), "table not found: 42");
    }
}
