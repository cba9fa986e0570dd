use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Lookup worker is not running")]
    WorkerUnavailable,
}

pub type Result<T> = std::result::Result<T, LookupError>;

impl LookupError {
    /// Wraps an I/O failure with the path that produced it.
    pub fn file_access(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the failure is a transient access problem, typically
    /// another process holding the file open while saving it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(source) | Self::FileAccess { source, .. } => io_error_is_transient(source),
            _ => false,
        }
    }

    /// Returns true when the failure means the file no longer exists.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PathNotFound(_) => true,
            Self::Io(source) | Self::FileAccess { source, .. } => {
                source.kind() == io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

// ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION.
const WINDOWS_SHARING_VIOLATION: i32 = 32;
const WINDOWS_LOCK_VIOLATION: i32 = 33;

fn io_error_is_transient(error: &io::Error) -> bool {
    if cfg!(windows)
        && matches!(
            error.raw_os_error(),
            Some(WINDOWS_SHARING_VIOLATION | WINDOWS_LOCK_VIOLATION)
        )
    {
        return true;
    }
    matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_retryable() {
        let error = LookupError::file_access(
            "strings.csv",
            io::Error::new(io::ErrorKind::PermissionDenied, "locked"),
        );
        assert!(error.is_retryable());
        assert!(!error.is_not_found());
    }

    #[test]
    fn not_found_is_not_retryable() {
        let error = LookupError::file_access(
            "strings.csv",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(!error.is_retryable());
        assert!(error.is_not_found());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let error = LookupError::InvalidConfig("delimiter equals quote".to_string());
        assert!(!error.is_retryable());
        assert!(error.to_string().contains("delimiter equals quote"));
    }

    #[test]
    fn file_access_message_names_path() {
        let error = LookupError::file_access(
            "/data/strings.csv",
            io::Error::new(io::ErrorKind::Other, "boom"),
        );
        let message = error.to_string();
        assert!(message.contains("/data/strings.csv"));
        assert!(message.contains("boom"));
    }
}
