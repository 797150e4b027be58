//! Collaborators the bridge drives but does not implement
//!
//! The Wi-Fi driver, persistent storage, MQTT client, camera and the BLE
//! provisioning flow live outside this crate. The bridge reaches them only
//! through these traits.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use lockbridge_core::Packet;

use crate::error::Result;

/// Platform services of the module
#[cfg_attr(test, automock)]
pub trait SystemControl: Send + Sync {
    /// Cloud device id reported in `CMD_DEVICE_INFO`
    fn device_id(&self) -> String;

    /// Station MAC address
    fn mac(&self) -> [u8; 6];

    /// Drop the station connection
    fn disconnect_wifi(&self) -> Result<()>;

    /// Erase stored credentials and settings
    fn erase_storage(&self) -> Result<()>;

    /// Reboot the module
    fn restart(&self);
}

/// MQTT publishing
///
/// Called from tasks spawned off the receive loop, never from the loop
/// itself, so an implementation may wait on the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

/// Camera capture and upload used by `CMD_IMG_TRANSFER`
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Grab one encoded frame
    async fn capture(&self) -> Result<Vec<u8>>;

    /// Push a frame to the cloud
    async fn upload(&self, image: &[u8]) -> Result<()>;
}

/// Receives Wi-Fi provisioning packets from the lock
#[cfg_attr(test, automock)]
pub trait ProvisioningHandler: Send + Sync {
    /// `CMD_WIFI_CONFIG`: the user asked for provisioning mode
    fn on_wifi_config(&self, packet: &Packet);

    /// `CMD_EXIT_CONFIG`: leave provisioning mode
    fn on_exit_config(&self, packet: &Packet);
}

/// Hooks used when none are supplied: log and succeed
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SystemControl for NoopHooks {
    fn device_id(&self) -> String {
        String::new()
    }

    fn mac(&self) -> [u8; 6] {
        [0; 6]
    }

    fn disconnect_wifi(&self) -> Result<()> {
        Ok(())
    }

    fn erase_storage(&self) -> Result<()> {
        Ok(())
    }

    fn restart(&self) {
        tracing::warn!("Restart requested but no system control is installed");
    }
}

#[async_trait]
impl CloudPublisher for NoopHooks {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        tracing::debug!(topic, payload, "No publisher installed, dropping message");
        Ok(())
    }
}

#[async_trait]
impl ImagePipeline for NoopHooks {
    async fn capture(&self) -> Result<Vec<u8>> {
        Err(crate::Error::Collaborator("no camera installed".into()))
    }

    async fn upload(&self, _image: &[u8]) -> Result<()> {
        Err(crate::Error::Collaborator("no image uploader installed".into()))
    }
}

impl ProvisioningHandler for NoopHooks {
    fn on_wifi_config(&self, _packet: &Packet) {}

    fn on_exit_config(&self, _packet: &Packet) {}
}
