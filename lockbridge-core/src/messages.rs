//! Typed views of the 6-byte data area for each command
//!
//! Each message converts to a [`Packet`] with `to_packet` and back with
//! `from_packet`, which checks the command byte first.

use byteorder::{ByteOrder, LittleEndian};

use crate::{
    command::Command,
    constants::{response_status, DATA_LEN},
    error::{Error, Result},
    packet::Packet,
};

fn expect(packet: &Packet, command: Command) -> Result<()> {
    if packet.is(command) {
        Ok(())
    } else {
        Err(Error::UnexpectedCommand {
            expected: command.code(),
            actual: packet.command(),
        })
    }
}

/// Generic reply (`CMD_RESPONSE`, 0x02)
///
/// `data[0]` is the status, `data[1]` names what is being acknowledged
/// (0x03 for event uploads, 0x04 for power-off notices, 0x00 for Wi-Fi
/// provisioning results and clear-data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub subject: u8,
}

impl Response {
    pub fn success(subject: u8) -> Self {
        Self { status: response_status::SUCCESS, subject }
    }

    pub fn failure(subject: u8) -> Self {
        Self { status: response_status::FAILED, subject }
    }

    pub fn is_success(&self) -> bool {
        self.status == response_status::SUCCESS
    }

    pub fn to_packet(&self) -> Packet {
        Packet::new(Command::Response, [self.status, self.subject, 0, 0, 0, 0])
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::Response)?;
        let d = packet.data();
        Ok(Self { status: d[0], subject: d[1] })
    }
}

/// Connectivity notification (`CMD_NETWORK_STATUS`, 0x23)
///
/// `[status, utc (LE u32), timezone code]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatusReport {
    pub status: u8,
    pub utc_seconds: u32,
    pub timezone: i8,
}

impl NetworkStatusReport {
    pub fn to_packet(&self) -> Packet {
        let mut data = [0u8; DATA_LEN];
        data[0] = self.status;
        LittleEndian::write_u32(&mut data[1..5], self.utc_seconds);
        data[5] = self.timezone as u8;
        Packet::new(Command::NetworkStatus, data)
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::NetworkStatus)?;
        let d = packet.data();
        Ok(Self {
            status: d[0],
            utc_seconds: LittleEndian::read_u32(&d[1..5]),
            timezone: d[5] as i8,
        })
    }
}

/// Network time reply (`CMD_NETWORK_TIME`, 0x11)
///
/// `[utc (LE u32), timezone code, reserved]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTimeReply {
    pub utc_seconds: u32,
    pub timezone: i8,
}

impl NetworkTimeReply {
    pub fn to_packet(&self) -> Packet {
        let mut data = [0u8; DATA_LEN];
        LittleEndian::write_u32(&mut data[0..4], self.utc_seconds);
        data[4] = self.timezone as u8;
        Packet::new(Command::NetworkTime, data)
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::NetworkTime)?;
        let d = packet.data();
        Ok(Self {
            utc_seconds: LittleEndian::read_u32(&d[0..4]),
            timezone: d[4] as i8,
        })
    }
}

/// State report (`CMD_STATE_REPORT`, 0x42), sent in both directions
///
/// `[type (LE u16), value (LE u32)]`, e.g. type 0x1006 is battery level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateReport {
    pub state_type: u16,
    pub state_value: u32,
}

impl StateReport {
    pub fn to_packet(&self) -> Packet {
        let mut data = [0u8; DATA_LEN];
        LittleEndian::write_u16(&mut data[0..2], self.state_type);
        LittleEndian::write_u32(&mut data[2..6], self.state_value);
        Packet::new(Command::StateReport, data)
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::StateReport)?;
        let d = packet.data();
        Ok(Self {
            state_type: LittleEndian::read_u16(&d[0..2]),
            state_value: LittleEndian::read_u32(&d[2..6]),
        })
    }
}

/// Remote unlock command (`CMD_REMOTE_UNLOCK`, 0x13)
///
/// `[user type, user id (LE u16), 0, 0, 0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteUnlock {
    pub user_type: u8,
    pub user_id: u16,
}

impl RemoteUnlock {
    pub fn to_packet(&self) -> Packet {
        let mut data = [0u8; DATA_LEN];
        data[0] = self.user_type;
        LittleEndian::write_u16(&mut data[1..3], self.user_id);
        Packet::new(Command::RemoteUnlock, data)
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::RemoteUnlock)?;
        let d = packet.data();
        Ok(Self {
            user_type: d[0],
            user_id: LittleEndian::read_u16(&d[1..3]),
        })
    }
}

/// Lock event upload (`CMD_EVENT_UPLOAD`, 0x03)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventUpload {
    pub event: u8,
    pub info: u8,
}

impl EventUpload {
    pub fn to_packet(&self) -> Packet {
        Packet::new(Command::EventUpload, [self.event, self.info, 0, 0, 0, 0])
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::EventUpload)?;
        let d = packet.data();
        Ok(Self { event: d[0], info: d[1] })
    }
}

/// Image transfer outcome (`CMD_IMG_TRANSFER_RESULT`, 0x27)
///
/// `[result, size (LE u16), image checksum (LE u16), reserved]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransferResult {
    pub result: u8,
    pub size: u16,
    pub checksum: u16,
}

impl ImageTransferResult {
    pub fn to_packet(&self) -> Packet {
        let mut data = [0u8; DATA_LEN];
        data[0] = self.result;
        LittleEndian::write_u16(&mut data[1..3], self.size);
        LittleEndian::write_u16(&mut data[3..5], self.checksum);
        Packet::new(Command::ImageTransferResult, data)
    }

    pub fn from_packet(packet: &Packet) -> Result<Self> {
        expect(packet, Command::ImageTransferResult)?;
        let d = packet.data();
        Ok(Self {
            result: d[0],
            size: LittleEndian::read_u16(&d[1..3]),
            checksum: LittleEndian::read_u16(&d[3..5]),
        })
    }
}

/// 16-bit byte sum used for image payloads in [`ImageTransferResult`]
pub fn image_checksum(data: &[u8]) -> u16 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32)) as u16
}
