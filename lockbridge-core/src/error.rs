//! Error types for lockbridge-core

/// Result type alias for lockbridge wire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire-level protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame length does not match the layout
    #[error("Frame length mismatch: expected {expected} bytes, got {actual} bytes")]
    BadLength {
        expected: usize,
        actual: usize,
    },

    /// Frame does not start with 0xAA 0x55
    #[error("Bad frame header: 0x{0:02X} 0x{1:02X}")]
    BadHeader(u8, u8),

    /// Checksum verification failed
    #[error("Checksum mismatch: calculated 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        command: u8,
        expected: u8,
        received: u8,
    },

    /// Unknown command code
    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Command does not match what the decoder expected
    #[error("Unexpected command: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedCommand {
        expected: u8,
        actual: u8,
    },
}

impl Error {
    /// Check if the error came from line corruption
    ///
    /// The MCU resends on its own timeout, so these are dropped quietly.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::BadHeader(..) | Self::BadLength { .. }
        )
    }

    /// Check if the frame was intact but not understood
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::UnknownCommand(_) | Self::UnexpectedCommand { .. })
    }
}
