//! # lockbridge
//!
//! UART link-layer engine of a smart lock's Wi-Fi module.
//!
//! ## Features
//!
//! - Framing and checksum validation of the `AA 55` lock protocol
//! - Command dispatch with a built-in table and a pluggable fallback
//! - Network status tracking with provisioning watchdogs
//! - At-least-once state reports with bounded retries
//! - Single-flight remote unlock with timeout
//!
//! ## Quick Start
//!
//! ```no_run
//! use lockbridge::{Bridge, BridgeConfig};
//! use lockbridge_transport::SerialTransport;
//!
//! #[tokio::main]
//! async fn main() -> lockbridge::Result<()> {
//!     let transport = SerialTransport::new("/dev/ttyS1");
//!     let bridge = Bridge::builder(transport)
//!         .with_config(BridgeConfig::from_env())
//!         .build();
//!
//!     // Hand this to the Wi-Fi and MQTT tasks
//!     let handle = bridge.handle();
//!     handle.upload_state(0x1006, 16)?;
//!
//!     bridge.run(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod img_transfer;
pub mod msg_upload;
pub mod net_sta;
pub mod sender;
pub mod state_report;
pub mod time_cache;
pub mod timer;
pub mod unlock;

// Re-exports
pub use bridge::{Bridge, BridgeBuilder, BridgeHandle};
pub use config::{BridgeConfig, RetryPolicy};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::{Error, Result};
pub use hooks::{CloudPublisher, ImagePipeline, NoopHooks, ProvisioningHandler, SystemControl};
pub use net_sta::{NetStaNotice, NetStatusTracker, NetworkEvent, Watchdog};
pub use state_report::{PendingReport, StateReporter};
pub use unlock::{UnlockCorrelator, UnlockOutcome};

// Re-export protocol types
pub use lockbridge_core::{Command, DeviceInfoPacket, Packet};
pub use lockbridge_types::{DeviceInfo, NetStatus, NetworkTime, TimeZoneCode};
