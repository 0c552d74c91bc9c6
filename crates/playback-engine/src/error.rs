//! Engine status codes and error type.

/// Numeric status codes reported by the engine.
pub mod status {
    /// Header fields are inconsistent or out of range.
    pub const BAD_HEADER: u8 = 0x10;
    /// The file ends before a header or command is complete.
    pub const TRUNCATED: u8 = 0x11;
    /// Compressed payloads are not supported.
    pub const COMPRESSED: u8 = 0x12;
    /// An unknown command byte was found in the command stream.
    pub const BAD_COMMAND: u8 = 0x13;
    /// The file declares a device type the engine does not know.
    pub const BAD_DEVICE_TYPE: u8 = 0x14;
    /// The requested output format cannot be produced.
    pub const BAD_OUTPUT: u8 = 0x20;
    /// Device id does not exist in the loaded file.
    pub const BAD_DEVICE_ID: u8 = 0x80;
    /// Operation requires `start()` first.
    pub const NOT_STARTED: u8 = 0x81;
    /// No player recognises the file signature.
    pub const UNKNOWN_FORMAT: u8 = 0xF0;
}

/// Error reported by the playback engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status 0x{status:02X})")]
pub struct EngineError {
    pub status: u8,
    pub message: String,
}

impl EngineError {
    pub fn new(status: u8, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn truncated(what: &str) -> Self {
        Self::new(status::TRUNCATED, format!("File truncated while reading {what}"))
    }

    /// Whether the failure means no player recognised the data at all.
    pub fn is_unknown_format(&self) -> bool {
        self.status == status::UNKNOWN_FORMAT
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
