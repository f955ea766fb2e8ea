//! Error types for delivery-state

use thiserror::Error;

/// Errors that can occur in the ledger persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store cannot be reached or has not been provisioned yet.
    ///
    /// This is the transient case: it is distinct from "the ledger table is
    /// definitely absent", which `exists()` reports as `Ok(false)`.
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),

    /// Query or write failure reported by the backend
    #[error("ledger backend error: {0}")]
    Backend(String),

    /// Stored hash is not a valid SHA-256 hex string
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },
}

impl StorageError {
    /// Whether this error is the transient "store not reachable" case.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_distinguished_from_backend() {
        assert!(StorageError::Unavailable("refused".into()).is_unavailable());
        assert!(!StorageError::Backend("syntax".into()).is_unavailable());
    }

    #[test]
    fn display_carries_context() {
        let err = StorageError::InvalidDigest {
            digest: "xyz".to_string(),
        };
        assert!(err.to_string().contains("xyz"));
    }
}
