//! Lock link command definitions

use std::fmt;

use crate::error::{Error, Result};

/// Who originates a command on the serial link
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Lock MCU to Wi-Fi module
    FromMcu,
    /// Wi-Fi module to lock MCU
    ToMcu,
}

/// Protocol command codes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Command {
    // Provisioning
    WifiConfig = 0x01,
    Response = 0x02,
    ExitConfig = 0x1A,
    ExitConfigAck = 0x1B,

    // Lock events
    EventUpload = 0x03,
    PowerOff = 0x04,
    ClearData = 0x05,

    // Device information
    GetDeviceInfo = 0x06,
    DeviceInfo = 0x07,

    // Time
    GetNetworkTime = 0x10,
    NetworkTime = 0x11,

    // Remote unlock
    RemoteUnlockAck = 0x12,
    RemoteUnlock = 0x13,

    // Image transfer
    ImageTransfer = 0x1C,
    ImageTransferAck = 0x1D,
    ImageTransferResult = 0x27,

    // Connectivity
    NetworkStatus = 0x23,

    // State reporting
    StateReport = 0x42,
    StateReportAck = 0x43,
}

impl Command {
    /// Every command the link understands
    pub const ALL: [Command; 19] = [
        Self::WifiConfig,
        Self::Response,
        Self::EventUpload,
        Self::PowerOff,
        Self::ClearData,
        Self::GetDeviceInfo,
        Self::DeviceInfo,
        Self::GetNetworkTime,
        Self::NetworkTime,
        Self::RemoteUnlockAck,
        Self::RemoteUnlock,
        Self::ExitConfig,
        Self::ExitConfigAck,
        Self::ImageTransfer,
        Self::ImageTransferAck,
        Self::NetworkStatus,
        Self::ImageTransferResult,
        Self::StateReport,
        Self::StateReportAck,
    ];

    /// Raw command byte
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Originating side of this command
    ///
    /// `StateReport` travels both ways; it is listed as `FromMcu`
    /// because that is the direction the dispatcher sees.
    pub fn direction(self) -> Direction {
        match self {
            Self::WifiConfig
            | Self::EventUpload
            | Self::PowerOff
            | Self::ClearData
            | Self::GetDeviceInfo
            | Self::GetNetworkTime
            | Self::RemoteUnlockAck
            | Self::ExitConfig
            | Self::ImageTransfer
            | Self::StateReport => Direction::FromMcu,

            Self::Response
            | Self::DeviceInfo
            | Self::NetworkTime
            | Self::RemoteUnlock
            | Self::ExitConfigAck
            | Self::ImageTransferAck
            | Self::NetworkStatus
            | Self::ImageTransferResult
            | Self::StateReportAck => Direction::ToMcu,
        }
    }

    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::WifiConfig => "CMD_WIFI_CONFIG",
            Self::Response => "CMD_RESPONSE",
            Self::EventUpload => "CMD_EVENT_UPLOAD",
            Self::PowerOff => "CMD_POWER_OFF",
            Self::ClearData => "CMD_CLEAR_DATA",
            Self::GetDeviceInfo => "CMD_GET_DEVICE_INFO",
            Self::DeviceInfo => "CMD_DEVICE_INFO",
            Self::GetNetworkTime => "CMD_GET_NETWORK_TIME",
            Self::NetworkTime => "CMD_NETWORK_TIME",
            Self::RemoteUnlockAck => "CMD_REMOTE_UNLOCK_ACK",
            Self::RemoteUnlock => "CMD_REMOTE_UNLOCK",
            Self::ExitConfig => "CMD_EXIT_CONFIG",
            Self::ExitConfigAck => "CMD_EXIT_CONFIG_ACK",
            Self::ImageTransfer => "CMD_IMG_TRANSFER",
            Self::ImageTransferAck => "CMD_IMG_TRANSFER_ACK",
            Self::NetworkStatus => "CMD_NETWORK_STATUS",
            Self::ImageTransferResult => "CMD_IMG_TRANSFER_RESULT",
            Self::StateReport => "CMD_STATE_REPORT",
            Self::StateReportAck => "CMD_STATE_REPORT_ACK",
        }
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.code() == value)
            .ok_or(Error::UnknownCommand(value))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_conversion() {
        assert_eq!(u8::from(Command::WifiConfig), 0x01);
        assert_eq!(Command::try_from(0x42).unwrap(), Command::StateReport);
        assert_eq!(Command::try_from(0x23).unwrap(), Command::NetworkStatus);
    }

    #[test]
    fn test_every_code_round_trips() {
        for cmd in Command::ALL {
            assert_eq!(Command::try_from(cmd.code()).unwrap(), cmd);
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(matches!(
            Command::try_from(0x99),
            Err(Error::UnknownCommand(0x99))
        ));
    }

    #[test]
    fn test_direction() {
        assert_eq!(Command::WifiConfig.direction(), Direction::FromMcu);
        assert_eq!(Command::RemoteUnlock.direction(), Direction::ToMcu);
        assert_eq!(Command::RemoteUnlockAck.direction(), Direction::FromMcu);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::StateReportAck.to_string(), "CMD_STATE_REPORT_ACK(0x43)");
    }
}
