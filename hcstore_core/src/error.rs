//! Error types for hcstore_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using hcstore_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred while opening, seeking, reading or writing a store file.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Logical name is not present in the name catalog.
    #[error("Name not found in catalog: {name}")]
    NameNotFound { name: String },

    /// Content hash is not present in the hash ledger.
    #[error("Hash not found in ledger: {hash}")]
    HashNotFound { hash: String },

    /// Blob or textual record does not follow the expected format.
    #[error("Format error: {reason}")]
    Format { reason: String },

    /// Fewer bytes (or bits) were available than declared.
    #[error("Truncated data: expected {expected}, got {actual}")]
    Truncated { expected: u64, actual: u64 },

    /// Catalog and ledger disagree with each other or with the pool.
    #[error("Inconsistency: {reason}")]
    Inconsistency { reason: String },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Logical name cannot be stored in the catalog.
    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },

    /// Store root is missing or unusable.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },
}

impl Error {
    /// Create a NameNotFound error.
    pub fn name_not_found(name: impl Into<String>) -> Self {
        Error::NameNotFound { name: name.into() }
    }

    /// Create a HashNotFound error.
    pub fn hash_not_found(hash: impl Into<String>) -> Self {
        Error::HashNotFound { hash: hash.into() }
    }

    /// Create a Format error.
    pub fn format(reason: impl Into<String>) -> Self {
        Error::Format {
            reason: reason.into(),
        }
    }

    /// Create a Truncated error.
    pub fn truncated(expected: u64, actual: u64) -> Self {
        Error::Truncated { expected, actual }
    }

    /// Create an Inconsistency error.
    pub fn inconsistency(reason: impl Into<String>) -> Self {
        Error::Inconsistency {
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidName error.
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Error::InvalidName {
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for the not-found kinds (missing name or missing hash).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NameNotFound { .. } | Error::HashNotFound { .. })
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(Error::name_not_found("a.txt").is_not_found());
        assert!(Error::hash_not_found("abcd").is_not_found());
        assert!(!Error::format("bad magic").is_not_found());
        assert!(!Error::truncated(10, 3).is_not_found());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            Error::truncated(28, 4).to_string(),
            "Truncated data: expected 28, got 4"
        );
        assert_eq!(
            Error::name_not_found("notes.txt").to_string(),
            "Name not found in catalog: notes.txt"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io { .. }));
    }
}
