//! Transport layer for the lock link
//!
//! Provides the byte pipe between the Wi-Fi module and the lock MCU: a UART
//! in production, a TCP bridge for bench setups, and an in-memory pair for
//! tests.

pub mod error;
pub mod memory;
pub mod serial;
pub mod tcp;

pub use error::{Error, Result};
pub use memory::{MemoryPeer, MemoryTransport};
pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Transport trait for different link types
///
/// `receive` must be cancel-safe: the bridge loop races it against the
/// outbound queue and drops it when a frame needs sending.
#[async_trait]
pub trait Transport: Send {
    /// Open the link
    async fn connect(&mut self) -> Result<()>;

    /// Close the link
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available (with timeout)
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;

    /// Human-readable endpoint (device path or address)
    fn remote_addr(&self) -> String;
}
