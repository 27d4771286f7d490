use std::path::PathBuf;
use thiserror::Error;

/// Main error type for photo ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another instance holds the lock and could not be displaced
    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    /// Source or destination directory missing, unreadable or unreachable
    #[error("Directory access error at {}: {source}", path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A per-file read/write that kept failing after every retry
    #[error("I/O on {} still failing after {attempts} attempts: {source}", path.display())]
    Transient {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Corrupt image, unsupported format or encoder failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Chat notification failures
    #[error("Notification error: {0}")]
    Notification(String),

    /// Product API update failures
    #[error("Remote update error: {0}")]
    RemoteUpdate(String),

    /// Run stopped by Ctrl+C or a termination signal
    #[error("Interrupted by {0}")]
    Interrupted(String),
}

impl IngestError {
    /// Whether the error stops the whole run.
    ///
    /// Everything else degrades to a counted per-file failure or a logged
    /// warning from a best-effort sink.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Config(_)
                | IngestError::LockUnavailable(_)
                | IngestError::DirectoryAccess { .. }
                | IngestError::Interrupted(_)
        )
    }

    pub(crate) fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::DirectoryAccess {
            path: path.into(),
            source,
        }
    }
}

/// Convenient Result type using IngestError
pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::Config("SOURCE_DIR not set".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("SOURCE_DIR"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IngestError = io_err.into();
        assert!(matches!(err, IngestError::Io(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        let dir = IngestError::directory(
            "/mnt/photos",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(dir.is_fatal());
        assert!(dir.to_string().contains("/mnt/photos"));
        assert!(IngestError::LockUnavailable("pid 42".into()).is_fatal());
        assert!(IngestError::Interrupted("Ctrl+C".into()).is_fatal());

        assert!(!IngestError::Notification("timeout".into()).is_fatal());
        assert!(!IngestError::RemoteUpdate("500".into()).is_fatal());
        let transient = IngestError::Transient {
            path: "a.jpg".into(),
            attempts: 3,
            source: std::io::Error::new(std::io::ErrorKind::Other, "busy"),
        };
        assert!(!transient.is_fatal());
        assert!(transient.to_string().contains("3 attempts"));
    }
}
