//! Image transfer (`CMD_IMG_TRANSFER`, 0x1C)
//!
//! The lock asks for a snapshot; the module acks the mode at once, then
//! captures and uploads one frame in the background and reports the outcome
//! with `CMD_IMG_TRANSFER_RESULT` (0x27).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use lockbridge_core::{
    constants::{image_modes, image_results},
    messages::{image_checksum, ImageTransferResult},
    Command, Packet,
};

use crate::{hooks::ImagePipeline, sender::PacketSender};

/// Handles `CMD_IMG_TRANSFER`
#[derive(Clone)]
pub struct ImageTransfer {
    sender: PacketSender,
    pipeline: Arc<dyn ImagePipeline>,
    timeout: Duration,
    enabled: Arc<AtomicBool>,
}

impl ImageTransfer {
    pub fn new(sender: PacketSender, pipeline: Arc<dyn ImagePipeline>, timeout: Duration) -> Self {
        Self {
            sender,
            pipeline,
            timeout,
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Ack the requested mode; returns the capture task when one was started
    pub fn handle(&self, packet: &Packet) -> Option<JoinHandle<()>> {
        if !packet.is(Command::ImageTransfer) {
            return None;
        }

        let mode = packet.data()[0];
        info!(mode, "Image transfer command");
        self.sender
            .send_or_log(Packet::new(Command::ImageTransferAck, [mode, 0, 0, 0, 0, 0]));

        match mode {
            image_modes::ENABLE => {
                self.enabled.store(true, Ordering::SeqCst);
                let this = self.clone();
                Some(tokio::spawn(async move { this.transfer().await }))
            }
            image_modes::DISABLE => {
                self.enabled.store(false, Ordering::SeqCst);
                info!("Image transfer disabled by lock");
                None
            }
            other => {
                warn!("Unknown image transfer mode 0x{:02X}", other);
                None
            }
        }
    }

    async fn transfer(&self) {
        let started = Instant::now();

        let image = match self.pipeline.capture().await {
            Ok(image) => image,
            Err(e) => {
                error!("Image capture failed: {}", e);
                self.report(image_results::TIMEOUT, 0, 0);
                return;
            }
        };

        // The result frame has two bytes for the size; the lock firmware
        // expects the low 16 bits of larger images
        let size = image.len() as u16;
        if image.len() > u16::MAX as usize {
            warn!(
                "Image of {} bytes does not fit the result frame, reporting size {}",
                image.len(),
                size
            );
        }
        let checksum = image_checksum(&image);
        info!("Captured image: {} bytes, checksum 0x{:04X}", image.len(), checksum);

        let mut result = image_results::SUCCESS;
        if let Err(e) = self.pipeline.upload(&image).await {
            error!("Image upload failed: {}", e);
            result = image_results::UPLOAD_FAILED;
        }

        let elapsed = started.elapsed();
        if elapsed > self.timeout {
            warn!("Image transfer took {:?}, over the {:?} limit", elapsed, self.timeout);
            result = image_results::TIMEOUT;
        }

        self.report(result, size, checksum);
    }

    fn report(&self, result: u8, size: u16, checksum: u16) {
        info!(result, size, "Image transfer result, checksum 0x{:04X}", checksum);
        self.sender.send_or_log(
            ImageTransferResult {
                result,
                size,
                checksum,
            }
            .to_packet(),
        );
    }
}
