//! Error types shared across vgmsplit crates.

use std::path::PathBuf;

/// A container the playback engine could not identify or parse.
///
/// Both variants carry the engine's numeric status code so it can be shown
/// to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Unrecognized file type (status 0x{status:02X})")]
    UnrecognizedType { status: u8 },

    #[error("Failed to parse file (status 0x{status:02X}): {message}")]
    Malformed { status: u8, message: String },
}

impl FormatError {
    /// Engine status code reported alongside the failure.
    pub fn status(&self) -> u8 {
        match self {
            Self::UnrecognizedType { status } | Self::Malformed { status, .. } => *status,
        }
    }
}

/// Top-level error type for vgmsplit operations.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("Error accessing \"{}\": {message}", path.display())]
    FileIo { path: PathBuf, message: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Unsupported output configuration: {message}")]
    UnsupportedOutput { message: String },

    #[error("{message}")]
    ConcurrencyState { message: String },

    #[error("Error rendering \"{name}\": {message}")]
    Job { name: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using SplitError.
pub type SplitResult<T> = Result<T, SplitError>;

impl SplitError {
    /// Wrap an OS-level failure on `path`, keeping the OS error text.
    pub fn file_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn unsupported_output(msg: impl Into<String>) -> Self {
        Self::UnsupportedOutput {
            message: msg.into(),
        }
    }

    pub fn concurrency_state(msg: impl Into<String>) -> Self {
        Self::ConcurrencyState {
            message: msg.into(),
        }
    }

    pub fn job(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Job {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Whether this error came from an I/O failure (open/read/write/close).
    pub fn is_file_io(&self) -> bool {
        matches!(self, Self::FileIo { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_carries_status() {
        let err = FormatError::Malformed {
            status: 0x11,
            message: "truncated header".to_string(),
        };
        assert_eq!(err.status(), 0x11);
        assert_eq!(
            err.to_string(),
            "Failed to parse file (status 0x11): truncated header"
        );

        let wrapped: SplitError = FormatError::UnrecognizedType { status: 0xF0 }.into();
        assert!(matches!(
            wrapped,
            SplitError::Format(FormatError::UnrecognizedType { status: 0xF0 })
        ));
    }

    #[test]
    fn test_file_io_keeps_os_text() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory");
        let err = SplitError::file_io("/tmp/missing.vgm", &io);
        assert!(err.is_file_io());
        assert_eq!(
            err.to_string(),
            "Error accessing \"/tmp/missing.vgm\": No such file or directory"
        );
    }
}
