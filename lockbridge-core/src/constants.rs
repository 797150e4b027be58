//! Protocol constants

/// Frame magic header
pub const HEADER: [u8; 2] = [0xAA, 0x55];

/// Payload bytes in a standard frame
pub const DATA_LEN: usize = 6;

/// Status byte carried in `CMD_RESPONSE` data[0]
pub mod response_status {
    /// Operation succeeded
    pub const SUCCESS: u8 = 0x00;

    /// Provisioning timed out
    pub const TIMEOUT: u8 = 0x01;

    /// Operation failed
    pub const FAILED: u8 = 0x02;
}

/// Event codes carried in `CMD_EVENT_UPLOAD` data[0]
pub mod events {
    /// Door reported as unlocked
    pub const UNLOCKED: u8 = 0x01;

    /// User at the door asks the cloud for a remote unlock
    pub const UNLOCK_REQUEST: u8 = 0x03;
}

/// Modes carried in `CMD_IMG_TRANSFER` data[0]
pub mod image_modes {
    /// Capture and upload one frame
    pub const ENABLE: u8 = 0x00;

    /// Stop image transfer
    pub const DISABLE: u8 = 0x01;
}

/// Result codes carried in `CMD_IMG_TRANSFER_RESULT` data[0]
pub mod image_results {
    pub const SUCCESS: u8 = 0x00;
    pub const UPLOAD_FAILED: u8 = 0x01;
    pub const TIMEOUT: u8 = 0x02;
}

/// Power-off notice modes carried in `CMD_POWER_OFF` data[0]
pub mod power_off_modes {
    pub const NORMAL: u8 = 0x00;
    pub const TEST: u8 = 0x01;
}

/// User types carried in `CMD_REMOTE_UNLOCK` data[0]
pub mod user_types {
    /// Phone app user
    pub const PHONE: u8 = 0x05;
}
