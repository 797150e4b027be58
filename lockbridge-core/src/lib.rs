//! # lockbridge-core
//!
//! Wire protocol of the serial link between a door-lock MCU and its Wi-Fi module.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Byte-stream framing
//! - Command definitions and typed payloads
//! - Protocol constants

pub mod checksum;
pub mod command;
pub mod constants;
pub mod error;
pub mod framer;
pub mod messages;
pub mod packet;

pub use command::{Command, Direction};
pub use error::{Error, Result};
pub use framer::{Framer, FramerState};
pub use packet::{DeviceInfoPacket, Packet};
