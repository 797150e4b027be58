//! Connectivity level reported to the lock

use std::fmt;

use crate::error::{Error, Result};

/// Network status, in increasing order of connectivity
///
/// The discriminant is the byte sent in `CMD_NETWORK_STATUS` data[0].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum NetStatus {
    /// No Wi-Fi credentials, or the station dropped
    #[default]
    NotConfigured = 1,
    /// Credentials known, association in progress
    ConnectingRouter = 2,
    /// Associated with the router, cloud not yet reachable
    ConnectedRouter = 3,
    /// MQTT session up
    ConnectedServer = 4,
}

impl NetStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Whether the router has been reached
    pub fn has_router(self) -> bool {
        self >= NetStatus::ConnectedRouter
    }
}

impl From<NetStatus> for u8 {
    fn from(status: NetStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for NetStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(NetStatus::NotConfigured),
            2 => Ok(NetStatus::ConnectingRouter),
            3 => Ok(NetStatus::ConnectedRouter),
            4 => Ok(NetStatus::ConnectedServer),
            other => Err(Error::Validation(format!("unknown network status {}", other))),
        }
    }
}

impl fmt::Display for NetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetStatus::NotConfigured => "not configured",
            NetStatus::ConnectingRouter => "connecting router",
            NetStatus::ConnectedRouter => "connected router",
            NetStatus::ConnectedServer => "connected server",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ordering() {
        assert!(NetStatus::NotConfigured < NetStatus::ConnectingRouter);
        assert!(NetStatus::ConnectingRouter < NetStatus::ConnectedRouter);
        assert!(NetStatus::ConnectedRouter < NetStatus::ConnectedServer);
        assert!(NetStatus::ConnectedServer.has_router());
        assert!(!NetStatus::ConnectingRouter.has_router());
    }

    #[test]
    fn test_codes() {
        for code in 1..=4u8 {
            assert_eq!(NetStatus::try_from(code).unwrap().code(), code);
        }
        assert!(NetStatus::try_from(0).is_err());
        assert!(NetStatus::try_from(5).is_err());
    }

    #[test]
    fn test_default_is_not_configured() {
        assert_eq!(NetStatus::default(), NetStatus::NotConfigured);
    }
}
