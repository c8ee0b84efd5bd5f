//! Centralized error types for mailcore.

use std::path::PathBuf;
use thiserror::Error;

use crate::mime::MimeError;

/// All errors produced by the mailcore library outside the IMAP protocol layer.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The message file is above the load ceiling and was not parsed.
    #[error("Message file '{path}' is {size} bytes, above the {limit} byte load limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// The message file could not be parsed. A copy may have been kept for diagnosis.
    #[error("Message file '{path}' is corrupt: {reason}")]
    ParseCorruption {
        path: PathBuf,
        reason: String,
        backup: Option<PathBuf>,
    },

    /// An error raised by the MIME part tree.
    #[error(transparent)]
    Mime(#[from] MimeError),

    /// A requested body part already exists and cannot be created twice.
    #[error("Part of type '{0}' cannot be created")]
    InvalidPart(String),

    /// The configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a read failure, turning `NotFound` into [`MailError::FileNotFound`].
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::io(path, source)
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MailError::io`).
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_maps_not_found() {
        let err = MailError::read(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, MailError::FileNotFound(_)));
    }

    #[test]
    fn test_read_keeps_other_io_errors() {
        let err = MailError::read(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, MailError::Io { .. }));
        assert!(err.to_string().contains("/nope"));
    }
}
