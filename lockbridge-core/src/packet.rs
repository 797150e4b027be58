//! Lock link frame structure and encoding/decoding

use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::Command,
    constants::{DATA_LEN, HEADER},
    error::{Error, Result},
};

/// Standard lock link frame
///
/// # Frame Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┐
/// │   Header    │   Command   │    Data     │  Checksum   │
/// │   2 bytes   │   1 byte    │   6 bytes   │   1 byte    │
/// │ (0xAA 0x55) │             │ (LE fields) │ (sum & 0xFF)│
/// └─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// Multi-byte fields inside the data area are little-endian.
/// A packet is immutable once built; the checksum is derived on encode.
///
/// # Examples
///
/// ```
/// use lockbridge_core::{Command, Packet};
///
/// let packet = Packet::new(Command::WifiConfig, [0; 6]);
/// let encoded = packet.encode();
///
/// let decoded = Packet::decode(&encoded).unwrap();
/// assert_eq!(packet, decoded);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    command: u8,
    data: [u8; DATA_LEN],
}

impl Packet {
    /// Encoded frame size in bytes
    pub const SIZE: usize = 10;

    /// Create a packet for a known command
    pub fn new(command: Command, data: [u8; DATA_LEN]) -> Self {
        Self::from_raw(command.code(), data)
    }

    /// Create a packet with an all-zero data area
    pub fn empty(command: Command) -> Self {
        Self::new(command, [0; DATA_LEN])
    }

    /// Create a packet from a raw command byte
    ///
    /// The command byte is not validated so unknown commands can be carried
    /// to a fallback handler.
    pub fn from_raw(command: u8, data: [u8; DATA_LEN]) -> Self {
        Self { command, data }
    }

    /// Raw command byte
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Parsed command
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] for codes outside the command table.
    pub fn kind(&self) -> Result<Command> {
        Command::try_from(self.command)
    }

    /// Check whether this packet carries `command`
    pub fn is(&self, command: Command) -> bool {
        self.command == command.code()
    }

    /// Data area
    pub fn data(&self) -> &[u8; DATA_LEN] {
        &self.data
    }

    /// Calculate the checksum for this packet
    pub fn checksum(&self) -> u8 {
        let mut body = [0u8; Self::SIZE - 1];
        body[..2].copy_from_slice(&HEADER);
        body[2] = self.command;
        body[3..].copy_from_slice(&self.data);
        checksum::calculate(&body)
    }

    /// Encode into a fixed-size array
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut frame = [0u8; Self::SIZE];
        frame[..2].copy_from_slice(&HEADER);
        frame[2] = self.command;
        frame[3..9].copy_from_slice(&self.data);
        frame[9] = self.checksum();
        frame
    }

    /// Encode packet to bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use lockbridge_core::{Command, Packet};
    ///
    /// let bytes = Packet::empty(Command::StateReportAck).encode();
    /// assert_eq!(bytes.len(), Packet::SIZE);
    /// assert_eq!(&bytes[..3], &[0xAA, 0x55, 0x43]);
    /// ```
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(&self.to_bytes());
        buf
    }

    /// Decode a complete frame
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The frame is not exactly 10 bytes
    /// - The header is not 0xAA 0x55
    /// - Checksum verification fails
    ///
    /// Unknown command codes decode successfully; see [`Packet::kind`].
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() != Self::SIZE {
            return Err(Error::BadLength {
                expected: Self::SIZE,
                actual: frame.len(),
            });
        }

        if frame[..2] != HEADER {
            return Err(Error::BadHeader(frame[0], frame[1]));
        }

        let mut data = [0u8; DATA_LEN];
        data.copy_from_slice(&frame[3..9]);

        let packet = Self::from_raw(frame[2], data);

        let calculated = packet.checksum();
        if calculated != frame[9] {
            return Err(Error::ChecksumMismatch {
                command: frame[2],
                expected: calculated,
                received: frame[9],
            });
        }

        Ok(packet)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("command", &format!("0x{:02X}", self.command))
            .field("data", &format!("{:02X?}", self.data))
            .field("checksum", &format!("0x{:02X}", self.checksum()))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Ok(cmd) => write!(f, "Packet[{}]({})", cmd, hex::encode(self.data)),
            Err(_) => write!(
                f,
                "Packet[UNKNOWN(0x{:02X})]({})",
                self.command,
                hex::encode(self.data)
            ),
        }
    }
}

/// Device information reply (`CMD_DEVICE_INFO`, 0x07)
///
/// # Frame Structure
///
/// ```text
/// ┌────────┬─────────┬──────────────┬────────┬──────────┬──────────┐
/// │ Header │ Command │  Device ID   │  MAC   │ Reserved │ Checksum │
/// │   2    │    1    │ 12 (ASCII,   │   6    │ 6 (zero) │    1     │
/// │        │         │ zero padded) │        │          │          │
/// └────────┴─────────┴──────────────┴────────┴──────────┴──────────┘
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceInfoPacket {
    device_id: [u8; Self::DEVICE_ID_LEN],
    mac: [u8; 6],
}

impl DeviceInfoPacket {
    /// Encoded frame size in bytes
    pub const SIZE: usize = 28;

    /// Device ID field width
    pub const DEVICE_ID_LEN: usize = 12;

    /// Build a device info reply
    ///
    /// IDs longer than 12 bytes are truncated; shorter ones are zero padded.
    pub fn new(device_id: &str, mac: [u8; 6]) -> Self {
        let mut id = [0u8; Self::DEVICE_ID_LEN];
        let raw = device_id.as_bytes();
        let len = raw.len().min(Self::DEVICE_ID_LEN);
        if raw.len() > Self::DEVICE_ID_LEN {
            tracing::warn!(
                "Device ID '{}' exceeds {} bytes, truncating",
                device_id,
                Self::DEVICE_ID_LEN
            );
        }
        id[..len].copy_from_slice(&raw[..len]);

        Self { device_id: id, mac }
    }

    /// Device ID with zero padding stripped
    pub fn device_id(&self) -> String {
        let end = self
            .device_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(Self::DEVICE_ID_LEN);
        String::from_utf8_lossy(&self.device_id[..end]).into_owned()
    }

    /// MAC address
    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Encode packet to bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_slice(&HEADER);
        buf.put_u8(Command::DeviceInfo.code());
        buf.put_slice(&self.device_id);
        buf.put_slice(&self.mac);
        buf.put_bytes(0, 6);
        let sum = checksum::calculate(&buf);
        buf.put_u8(sum);
        buf
    }

    /// Decode a complete device info frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() != Self::SIZE {
            return Err(Error::BadLength {
                expected: Self::SIZE,
                actual: frame.len(),
            });
        }

        if frame[..2] != HEADER {
            return Err(Error::BadHeader(frame[0], frame[1]));
        }

        if frame[2] != Command::DeviceInfo.code() {
            return Err(Error::UnexpectedCommand {
                expected: Command::DeviceInfo.code(),
                actual: frame[2],
            });
        }

        if !checksum::verify(frame) {
            return Err(Error::ChecksumMismatch {
                command: frame[2],
                expected: checksum::calculate(&frame[..Self::SIZE - 1]),
                received: frame[Self::SIZE - 1],
            });
        }

        let mut device_id = [0u8; Self::DEVICE_ID_LEN];
        device_id.copy_from_slice(&frame[3..15]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&frame[15..21]);

        Ok(Self { device_id, mac })
    }
}

impl fmt::Debug for DeviceInfoPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInfoPacket")
            .field("device_id", &self.device_id())
            .field("mac", &hex::encode(self.mac))
            .finish()
    }
}
