//! TCP transport
//!
//! Talks to a lock UART exposed over the network by a raw serial server
//! such as ser2net, for bench setups without a module attached. The server
//! must run in raw mode: bytes are passed through untouched.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, Transport};

/// Bytes reserved per read; the lock never sends more than a few frames at once
const READ_CHUNK: usize = 128;

/// Link to a UART behind a raw TCP serial server
pub struct TcpTransport {
    host: String,
    port: u16,
    peer: Option<SocketAddr>,
    stream: Option<TcpStream>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Target `host:port` of the serial server
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            peer: None,
            stream: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Limit on each connection attempt
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Try every resolved address in turn
    async fn open(&self) -> Result<(TcpStream, SocketAddr)> {
        let target = format!("{}:{}", self.host, self.port);
        let candidates = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", target, e)))?;

        let mut last_error = Error::InvalidAddress(format!("{} resolved to nothing", target));
        for addr in candidates {
            debug!("Trying serial server at {}", addr);
            match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => return Ok((stream, addr)),
                Ok(Err(e)) => last_error = Error::Io(e),
                Err(_) => last_error = Error::ConnectionTimeout,
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::AlreadyConnected);
        }

        let (stream, addr) = self.open().await?;
        // Frames are 10 bytes; do not let them sit in the Nagle buffer
        stream.set_nodelay(true)?;

        debug!("Connected to serial server {}", addr);
        self.peer = Some(addr);
        self.stream = Some(stream);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing link to {}", self.remote_addr());
            let _ = stream.shutdown().await;
        }
        self.peer = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        trace!("TCP TX {} bytes: {:02X?}", data.len(), data);
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self, wait: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        // read_buf is cancel-safe
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let n = match timeout(wait, stream.read_buf(&mut buf)).await {
            Err(_) => return Err(Error::ReadTimeout),
            Ok(result) => result?,
        };
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!("TCP RX {} bytes: {:02X?}", n, &buf[..]);
        Ok(buf)
    }

    fn remote_addr(&self) -> String {
        match self.peer {
            Some(addr) => addr.to_string(),
            None => format!("{}:{}", self.host, self.port),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            warn!("TCP transport to {} dropped while open", self.remote_addr());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_new_transport_is_closed() {
        let transport = TcpTransport::new("192.168.1.50", 2000);
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "192.168.1.50:2000");
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let mut transport = TcpTransport::new("invalid..address", 2000)
            .with_connect_timeout(Duration::from_millis(100));

        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let mut transport = TcpTransport::new("127.0.0.1", 2000);
        assert!(matches!(transport.send(&[0xAA]).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_echo_through_serial_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect().await.unwrap();
        assert!(matches!(transport.connect().await, Err(Error::AlreadyConnected)));
        transport.send(&[0xAA, 0x55, 0x10]).await.unwrap();

        let mut echoed = Vec::new();
        while echoed.len() < 3 {
            let chunk = transport.receive(Duration::from_secs(1)).await.unwrap();
            echoed.extend_from_slice(&chunk);
        }
        assert_eq!(echoed, vec![0xAA, 0x55, 0x10]);

        server.await.unwrap();
        assert!(matches!(
            transport.receive(Duration::from_secs(1)).await,
            Err(Error::ConnectionClosed)
        ));

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }
}
