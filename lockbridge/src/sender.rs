//! Outbound packet queue
//!
//! Every component writes through a [`PacketSender`]; the bridge loop is the
//! only reader and writes each queued frame with a single transport call, so
//! frames never interleave on the wire.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use lockbridge_core::{DeviceInfoPacket, Packet};

use crate::error::{Error, Result};

/// Receiving end, drained by the bridge loop
pub type FrameReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Cloneable handle used to queue frames for the lock
#[derive(Debug, Clone)]
pub struct PacketSender {
    tx: mpsc::UnboundedSender<Bytes>,
}

/// Create a queue
pub fn channel() -> (PacketSender, FrameReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PacketSender { tx }, rx)
}

impl PacketSender {
    /// Queue a standard 10-byte packet; never blocks
    pub fn send(&self, packet: Packet) -> Result<()> {
        debug!("Queueing packet: {:?}", packet);
        self.push(packet.encode().freeze())
    }

    /// Queue the 28-byte device info reply
    pub fn send_device_info(&self, packet: &DeviceInfoPacket) -> Result<()> {
        debug!("Queueing device info: {:?}", packet);
        self.push(packet.encode().freeze())
    }

    /// Queue a packet, logging instead of failing when the bridge is gone
    pub fn send_or_log(&self, packet: Packet) {
        if let Err(e) = self.send(packet) {
            warn!("Dropping outbound packet {}: {}", packet, e);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn push(&self, frame: Bytes) -> Result<()> {
        self.tx.send(frame).map_err(|_| Error::QueueClosed)
    }
}

/// Decode every 10-byte packet currently queued
#[cfg(test)]
pub(crate) fn drain_packets(rx: &mut FrameReceiver) -> Vec<Packet> {
    let mut packets = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        packets.push(Packet::decode(&frame).expect("queued frame is a standard packet"));
    }
    packets
}
