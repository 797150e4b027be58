//! Device information structures

use std::fmt;

use crate::error::{Error, Result};

/// Identity reported to the lock in `CMD_DEVICE_INFO`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Cloud device id (at most 12 ASCII bytes go on the wire)
    pub device_id: String,

    /// Station MAC address
    pub mac: [u8; 6],
}

impl DeviceInfo {
    pub fn new(device_id: impl Into<String>, mac: [u8; 6]) -> Self {
        Self {
            device_id: device_id.into(),
            mac,
        }
    }

    /// Parse a MAC address written as `aa:bb:cc:dd:ee:ff`
    pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
        let mut mac = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');

        for byte in mac.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::Parse(format!("MAC '{}' is too short", s)))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::Parse(format!("bad MAC octet '{}'", part)))?;
        }

        if parts.next().is_some() {
            return Err(Error::Parse(format!("MAC '{}' is too long", s)));
        }
        Ok(mac)
    }

    pub fn mac_string(&self) -> String {
        self.mac
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device[ID: {}, MAC: {}]", self.device_id, self.mac_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display() {
        let info = DeviceInfo::new("LOCK0001", [0x24, 0x0A, 0xC4, 0x00, 0x01, 0xFF]);
        assert_eq!(info.to_string(), "Device[ID: LOCK0001, MAC: 24:0A:C4:00:01:FF]");
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            DeviceInfo::parse_mac("24:0a:c4:00:01:ff").unwrap(),
            [0x24, 0x0A, 0xC4, 0x00, 0x01, 0xFF]
        );
        assert!(DeviceInfo::parse_mac("24:0a:c4").is_err());
        assert!(DeviceInfo::parse_mac("24:0a:c4:00:01:ff:00").is_err());
        assert!(DeviceInfo::parse_mac("zz:0a:c4:00:01:ff").is_err());
    }
}
