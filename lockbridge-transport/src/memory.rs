//! In-memory transport
//!
//! A [`MemoryTransport`] stands in for the UART; its [`MemoryPeer`] plays
//! the lock side, injecting bytes and collecting everything written.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::trace;

use crate::{error::*, Transport};

/// Bridge side of an in-memory link
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    connected: bool,
}

/// Lock side of an in-memory link
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryTransport {
    /// Create a connected transport and its peer
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let transport = MemoryTransport {
            inbound: in_rx,
            outbound: out_tx,
            connected: true,
        };
        let peer = MemoryPeer {
            inbound: in_tx,
            outbound: out_rx,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Err(Error::AlreadyConnected);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        trace!("Sending {} bytes: {:02X?}", data.len(), data);
        self.outbound
            .send(data.to_vec())
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn receive(&mut self, timeout_duration: Duration) -> Result<BytesMut> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let chunk = timeout(timeout_duration, self.inbound.recv())
            .await
            .map_err(|_| Error::ReadTimeout)?
            .ok_or(Error::ConnectionClosed)?;

        Ok(BytesMut::from(&chunk[..]))
    }

    fn remote_addr(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryPeer {
    /// Deliver bytes to the bridge as if the lock had written them
    pub fn inject(&self, bytes: &[u8]) -> Result<()> {
        self.inbound
            .send(bytes.to_vec())
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Next chunk written by the bridge, `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.outbound.recv().await
    }

    /// Next chunk written by the bridge if one is already queued
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.outbound.try_recv().ok()
    }

    /// Everything written so far, concatenated
    pub fn drain(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.try_recv() {
            out.extend_from_slice(&chunk);
        }
        out
    }
}
