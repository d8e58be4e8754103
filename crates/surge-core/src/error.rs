use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurgeError {
    /// A bulk submission failed. Every intent in the batch receives a clone of this value.
    #[error("Batch submission failed ({kind}, {size} intents): {reason}")]
    BatchSubmission {
        kind: &'static str,
        size: usize,
        reason: String,
    },

    /// The call was skipped because the dependency's circuit is open.
    #[error("Circuit open for dependency '{dependency}'")]
    CircuitOpen { dependency: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Write queue closed before the intent was resolved")]
    QueueClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SurgeError {
    /// `true` for the synthetic fast-fail raised while a circuit is open.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, SurgeError::CircuitOpen { .. })
    }

    /// `true` when retrying later might succeed (the dependency was down or
    /// unreachable, as opposed to rejecting the request itself).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SurgeError::CircuitOpen { .. }
                | SurgeError::Storage(_)
                | SurgeError::Cache(_)
                | SurgeError::QueueClosed
        )
    }
}

impl From<serde_json::Error> for SurgeError {
    fn from(err: serde_json::Error) -> Self {
        SurgeError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SurgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_open_is_distinct() {
        let open = SurgeError::CircuitOpen {
            dependency: "postgres".to_string(),
        };
        let failed = SurgeError::Storage("connection reset".to_string());

        assert!(open.is_circuit_open());
        assert!(!failed.is_circuit_open());
        assert!(open.is_transient());
        assert!(failed.is_transient());
        assert!(!SurgeError::NotFound("user 7".to_string()).is_transient());
    }

    #[test]
    fn test_batch_error_message() {
        let err = SurgeError::BatchSubmission {
            kind: "create",
            size: 3,
            reason: "duplicate email".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Batch submission failed (create, 3 intents): duplicate email"
        );
    }
}
