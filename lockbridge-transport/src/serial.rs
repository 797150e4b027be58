//! UART transport

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use serial2_tokio::SerialPort;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Default UART speed of the lock (8N1, no flow control)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const READ_CHUNK: usize = 128;

/// Serial transport to the lock MCU
pub struct SerialTransport {
    path: PathBuf,
    baud_rate: u32,
    port: Option<SerialPort>,
}

impl SerialTransport {
    /// Create new serial transport for a device path such as `/dev/ttyUSB0`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
        }
    }

    /// Set baud rate
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        debug!("Opening {} at {} baud...", self.path.display(), self.baud_rate);

        // A u32 baud rate configures 8 data bits, no parity, 1 stop bit
        let port = SerialPort::open(&self.path, self.baud_rate)?;

        debug!("Opened {}", self.path.display());

        self.port = Some(port);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed {}", self.path.display());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_ref().ok_or(Error::NotConnected)?;

        trace!("Sending {} bytes: {:02X?}", data.len(), data);

        let mut written = 0;
        while written < data.len() {
            let n = port.write(&data[written..]).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            written += n;
        }

        Ok(())
    }

    async fn receive(&mut self, timeout_duration: Duration) -> Result<BytesMut> {
        let port = self.port.as_ref().ok_or(Error::NotConnected)?;

        let mut buf = [0u8; READ_CHUNK];

        let n = timeout(timeout_duration, port.read(&mut buf))
            .await
            .map_err(|_| Error::ReadTimeout)?
            .map_err(Error::Io)?;

        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!("Received {} bytes: {:02X?}", n, &buf[..n]);

        Ok(BytesMut::from(&buf[..n]))
    }

    fn remote_addr(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("Serial transport dropped while still open");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serial_transport_create() {
        let transport = SerialTransport::new("/dev/ttyUSB0");
        assert!(!transport.is_connected());
        assert_eq!(transport.baud_rate(), 9600);
        assert_eq!(transport.remote_addr(), "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_serial_transport_missing_device() {
        let mut transport =
            SerialTransport::new("/dev/lockbridge-does-not-exist").with_baud_rate(115_200);

        let result = transport.connect().await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_requires_open_port() {
        let mut transport = SerialTransport::new("/dev/ttyUSB0");
        assert!(matches!(transport.send(&[0xAA]).await, Err(Error::NotConnected)));
    }
}
