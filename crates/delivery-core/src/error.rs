//! Error taxonomy for the delivery engine.

use std::path::PathBuf;

use delivery_state::StorageError;

/// Delivery domain errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("cannot access delivery directory {path}: {source}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read delivery script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument '{0}'")]
    InvalidArgument(String),

    #[error("stop marker given more than once: '{first}' and '{second}'")]
    DuplicateStopMarker { first: String, second: String },

    #[error("invalid setting {key}: {reason}")]
    Settings { key: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_access_names_path() {
        let err = DeliveryError::DirectoryAccess {
            path: PathBuf::from("/srv/deliveries"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/srv/deliveries"));
    }

    #[test]
    fn storage_error_converts() {
        let err: DeliveryError = StorageError::Unavailable("refused".into()).into();
        assert!(err.to_string().contains("storage error"));
        assert!(err.to_string().contains("refused"));
    }
}
