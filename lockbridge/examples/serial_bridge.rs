//! Serial bridge example
//!
//! Runs the bridge on a UART and pretends the module reaches the cloud a
//! few seconds after start.
//!
//! ```text
//! LOCKBRIDGE_PORT=/dev/ttyUSB0 RUST_LOG=lockbridge=debug cargo run --example serial_bridge
//! ```

use std::time::Duration;

use anyhow::Context;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use lockbridge::{Bridge, BridgeConfig, NetworkEvent, NetworkTime, TimeZoneCode};
use lockbridge_transport::SerialTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("LOCKBRIDGE_PORT").unwrap_or_else(|_| "/dev/ttyUSB0".to_string());
    let zone: TimeZoneCode = std::env::var("LOCKBRIDGE_TZ")
        .unwrap_or_else(|_| "UTC +8".to_string())
        .parse()
        .context("LOCKBRIDGE_TZ")?;

    let bridge = Bridge::builder(SerialTransport::new(port))
        .with_config(BridgeConfig::from_env())
        .with_fallback(|packet| tracing::warn!("Unhandled packet from lock: {}", packet))
        .build();
    let handle = bridge.handle();

    tokio::spawn(async move {
        let mut outcomes = handle.subscribe_unlock_outcomes();

        for event in [
            NetworkEvent::WifiLinkUp,
            NetworkEvent::GotIp,
            NetworkEvent::MqttConnected,
        ] {
            sleep(Duration::from_secs(1)).await;
            handle.network_event(event);
        }

        let now = chrono::Utc::now().timestamp() as u32;
        handle.set_network_time(NetworkTime::new(now, zone));

        if let Err(e) = handle.upload_state(0x1006, 16) {
            tracing::error!("State upload failed: {}", e);
        }

        while let Ok(outcome) = outcomes.recv().await {
            println!("Unlock finished: {:?}", outcome);
        }
    });

    bridge
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    println!("Done!");
    Ok(())
}
