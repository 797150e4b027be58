//! Byte-stream framer
//!
//! Recovers frame boundaries from a raw serial byte stream that arrives in
//! chunks of any size. The walk is strictly positional:
//!
//! ```text
//! WaitHeader1 -0xAA-> WaitHeader2 -0x55-> Command -> Data(0) .. Data(5) -> Checksum
//!      ^                   |                                                 |
//!      +---- other byte ---+------------- frame complete (valid or not) -----+
//! ```
//!
//! Payload bytes are not escaped, so a stray 0xAA inside a corrupted frame is
//! not treated as a new start. Recovery relies on the checksum rejecting the
//! bad frame and the walk restarting at the next byte.

use tracing::{debug, error, trace};

use crate::{
    constants::{DATA_LEN, HEADER},
    error::Result,
    packet::Packet,
};

/// Position of the framer inside the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Scanning for 0xAA
    WaitHeader1,
    /// Got 0xAA, expecting 0x55
    WaitHeader2,
    /// Expecting the command byte
    Command,
    /// Expecting data byte `n` (0..=5)
    Data(usize),
    /// Expecting the checksum byte
    Checksum,
}

/// Incremental frame parser
///
/// Owned by the receive loop; exactly one frame is in flight at a time.
///
/// # Examples
///
/// ```
/// use lockbridge_core::{Command, Framer, Packet};
///
/// let mut framer = Framer::new();
/// let frame = Packet::empty(Command::GetNetworkTime).encode();
///
/// // Arbitrary chunking
/// assert!(framer.feed(&frame[..4]).is_empty());
/// let packets = framer.feed(&frame[4..]);
///
/// assert_eq!(packets.len(), 1);
/// assert!(packets[0].as_ref().unwrap().is(Command::GetNetworkTime));
/// ```
#[derive(Debug, Clone)]
pub struct Framer {
    state: FramerState,
    frame: [u8; Packet::SIZE],
}

impl Framer {
    /// Create a framer waiting for a header
    pub fn new() -> Self {
        Self {
            state: FramerState::WaitHeader1,
            frame: [0; Packet::SIZE],
        }
    }

    /// Current state
    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Drop any partial frame and wait for a new header
    pub fn reset(&mut self) {
        self.state = FramerState::WaitHeader1;
        self.frame = [0; Packet::SIZE];
    }

    /// Feed one byte
    ///
    /// Returns `Some` when the byte completed a frame: `Ok` if the checksum
    /// matched, `Err(ChecksumMismatch)` otherwise. Either way the framer is
    /// back to [`FramerState::WaitHeader1`] afterwards.
    pub fn push(&mut self, byte: u8) -> Option<Result<Packet>> {
        match self.state {
            FramerState::WaitHeader1 => {
                if byte == HEADER[0] {
                    self.frame[0] = byte;
                    self.state = FramerState::WaitHeader2;
                }
                None
            }

            FramerState::WaitHeader2 => {
                if byte == HEADER[1] {
                    self.frame[1] = byte;
                    self.state = FramerState::Command;
                } else {
                    trace!("Header mismatch (0x{:02X}), rescanning", byte);
                    self.state = FramerState::WaitHeader1;
                }
                None
            }

            FramerState::Command => {
                self.frame[2] = byte;
                self.state = FramerState::Data(0);
                None
            }

            FramerState::Data(index) => {
                self.frame[3 + index] = byte;
                self.state = if index + 1 < DATA_LEN {
                    FramerState::Data(index + 1)
                } else {
                    FramerState::Checksum
                };
                None
            }

            FramerState::Checksum => {
                self.frame[Packet::SIZE - 1] = byte;
                self.state = FramerState::WaitHeader1;

                let result = Packet::decode(&self.frame);
                match &result {
                    Ok(packet) => debug!("Received valid packet: {}", packet),
                    Err(e) => error!("Dropping frame {}: {}", hex::encode(self.frame), e),
                }
                Some(result)
            }
        }
    }

    /// Feed a chunk of bytes, returning every frame it completed in order
    pub fn feed(&mut self, data: &[u8]) -> Vec<Result<Packet>> {
        trace!("Raw data: {}", hex::encode(data));
        data.iter().filter_map(|&b| self.push(b)).collect()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
