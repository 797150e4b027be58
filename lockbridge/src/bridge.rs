//! Bridge between the lock MCU link and the module's services
//!
//! A [`Bridge`] owns the transport and the framer and runs the single loop
//! that reads bytes from the lock, dispatches decoded packets and writes
//! queued frames back out. Everything else talks to it through a cloneable
//! [`BridgeHandle`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use lockbridge_core::{
    constants::response_status,
    messages::{NetworkStatusReport, NetworkTimeReply, Response, StateReport},
    Command, DeviceInfoPacket, Framer, Packet,
};
use lockbridge_transport::{Error as TransportError, Transport};
use lockbridge_types::{DeviceInfo, NetStatus, NetworkTime};

use crate::{
    config::BridgeConfig,
    dispatcher::Dispatcher,
    error::{Error, Result},
    hooks::{CloudPublisher, ImagePipeline, NoopHooks, ProvisioningHandler, SystemControl},
    img_transfer::ImageTransfer,
    msg_upload::EventUploader,
    net_sta::{NetStaNotice, NetStatusTracker, NetworkEvent},
    sender::{self, FrameReceiver, PacketSender},
    state_report::{PendingReport, StateReporter},
    time_cache::TimeCache,
    unlock::{UnlockCorrelator, UnlockOutcome},
};

/// `data[1]` of Wi-Fi provisioning and clear-data responses
const RESPONSE_SUBJECT: u8 = 0x00;

/// UART bridge to the lock MCU
///
/// # Examples
///
/// ```no_run
/// use lockbridge::{Bridge, NetworkEvent};
/// use lockbridge_transport::SerialTransport;
///
/// #[tokio::main]
/// async fn main() -> lockbridge::Result<()> {
///     let bridge = Bridge::builder(SerialTransport::new("/dev/ttyUSB0")).build();
///     let handle = bridge.handle();
///
///     tokio::spawn(async move {
///         handle.network_event(NetworkEvent::GotIp);
///     });
///
///     bridge.run(async { let _ = tokio::signal::ctrl_c().await; }).await
/// }
/// ```
pub struct Bridge<T: Transport> {
    transport: T,
    framer: Framer,
    dispatcher: Dispatcher,
    outbound: FrameReceiver,
    handle: BridgeHandle,
    config: BridgeConfig,
}

impl<T: Transport> Bridge<T> {
    /// Start configuring a bridge over `transport`
    pub fn builder(transport: T) -> BridgeBuilder<T> {
        BridgeBuilder::new(transport)
    }

    /// Handle for other tasks; stays usable after the bridge stops, though
    /// packets queued then are dropped
    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run until `shutdown` resolves or the transport fails
    ///
    /// Connects the transport if needed and starts the state-report
    /// retransmission task for the lifetime of the loop.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] before touching the transport if the
    /// configuration has a zero period; otherwise the transport error that
    /// stopped the loop.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Bridge {
            mut transport,
            mut framer,
            dispatcher,
            mut outbound,
            handle,
            config,
        } = self;

        config.validate()?;
        if !transport.is_connected() {
            transport.connect().await?;
        }
        info!("Bridge running on {}", transport.remote_addr());

        let retransmit = handle.reports.spawn_retransmit_task()?;
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }

                Some(frame) = outbound.recv() => {
                    debug!("TX {} bytes", frame.len());
                    if let Err(e) = transport.send(&frame).await {
                        if e.is_fatal() {
                            error!("Transport write failed: {}", e);
                            break Err(Error::from(e));
                        }
                        warn!("Dropping outbound frame: {}", e);
                    }
                }

                received = transport.receive(config.receive_timeout) => match received {
                    Ok(bytes) => {
                        for decoded in framer.feed(&bytes) {
                            match decoded {
                                Ok(packet) => {
                                    dispatcher.dispatch(&packet);
                                }
                                Err(e) if e.is_corruption() => debug!("Resynchronising after: {}", e),
                                Err(e) => warn!("Discarding frame: {}", e),
                            }
                        }
                    }
                    Err(TransportError::ReadTimeout) => continue,
                    Err(e) if e.is_fatal() => {
                        error!("Transport read failed: {}", e);
                        break Err(Error::from(e));
                    }
                    Err(e) => warn!("Transport read error: {}", e),
                },
            }
        };

        retransmit.abort();
        if transport.is_connected() {
            if let Err(e) = transport.disconnect().await {
                warn!("Error while closing transport: {}", e);
            }
        }
        info!("Bridge stopped");
        result
    }
}

/// Configures and wires a [`Bridge`]
pub struct BridgeBuilder<T: Transport> {
    transport: T,
    config: BridgeConfig,
    system: Arc<dyn SystemControl>,
    publisher: Arc<dyn CloudPublisher>,
    images: Arc<dyn ImagePipeline>,
    provisioning: Arc<dyn ProvisioningHandler>,
    fallback: Option<crate::dispatcher::Handler>,
}

impl<T: Transport> BridgeBuilder<T> {
    fn new(transport: T) -> Self {
        Self {
            transport,
            config: BridgeConfig::default(),
            system: Arc::new(NoopHooks),
            publisher: Arc::new(NoopHooks),
            images: Arc::new(NoopHooks),
            provisioning: Arc::new(NoopHooks),
            fallback: None,
        }
    }

    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_system_control(mut self, system: Arc<dyn SystemControl>) -> Self {
        self.system = system;
        self
    }

    pub fn with_cloud_publisher(mut self, publisher: Arc<dyn CloudPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_image_pipeline(mut self, images: Arc<dyn ImagePipeline>) -> Self {
        self.images = images;
        self
    }

    pub fn with_provisioning(mut self, provisioning: Arc<dyn ProvisioningHandler>) -> Self {
        self.provisioning = provisioning;
        self
    }

    /// Handler for commands outside the built-in table
    pub fn with_fallback<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Bridge<T> {
        let config = self.config;
        let (sender, outbound) = sender::channel();
        let time = TimeCache::new();

        let net = NetStatusTracker::new(
            sender.clone(),
            time.clone(),
            config.router_watchdog,
            config.server_watchdog,
        );
        let handle = BridgeHandle {
            reports: StateReporter::new(sender.clone(), time.clone(), config.state_report),
            unlock: UnlockCorrelator::new(sender.clone(), config.unlock_timeout),
            events: EventUploader::new(
                sender.clone(),
                self.publisher,
                config.remote_request_window,
                config.unlocked_event_window,
            ),
            images: ImageTransfer::new(
                sender.clone(),
                self.images,
                config.image_transfer_timeout,
            ),
            reset: DataReset {
                system: self.system.clone(),
                net: net.clone(),
                sender: sender.clone(),
                restart_delay: config.restart_delay,
                busy: Arc::new(AtomicBool::new(false)),
            },
            net,
            time,
            sender,
        };

        let mut dispatcher = register_builtins(&handle, self.system, self.provisioning);
        if let Some(fallback) = self.fallback {
            dispatcher.set_fallback(move |packet| fallback(packet));
        }
        debug!("Dispatcher ready: {:?}", dispatcher);

        Bridge {
            transport: self.transport,
            framer: Framer::new(),
            dispatcher,
            outbound,
            handle,
            config,
        }
    }
}

fn register_builtins(
    handle: &BridgeHandle,
    system: Arc<dyn SystemControl>,
    provisioning: Arc<dyn ProvisioningHandler>,
) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    let net = handle.net.clone();
    let wifi_config = provisioning.clone();
    dispatcher.register(Command::WifiConfig, move |packet| {
        info!("Wi-Fi provisioning requested by lock");
        net.start_monitor();
        wifi_config.on_wifi_config(packet);
    });

    let sender = handle.sender.clone();
    dispatcher.register(Command::ExitConfig, move |packet| {
        info!("Lock asked to leave provisioning mode");
        provisioning.on_exit_config(packet);
        sender.send_or_log(Packet::empty(Command::ExitConfigAck));
    });

    let events = handle.events.clone();
    dispatcher.register(Command::EventUpload, move |packet| {
        events.handle(packet);
    });
    let events = handle.events.clone();
    dispatcher.register(Command::PowerOff, move |packet| {
        events.handle(packet);
    });

    let reset = handle.reset.clone();
    dispatcher.register(Command::ClearData, move |_| {
        if let Err(e) = reset.start() {
            warn!("Clear data rejected: {}", e);
            reset.reply(response_status::FAILED);
        }
    });

    let sender = handle.sender.clone();
    dispatcher.register(Command::GetDeviceInfo, move |_| {
        let device_id = system.device_id();
        if device_id.is_empty() {
            error!("Device id unavailable, not answering device info request");
            return;
        }
        let info = DeviceInfo::new(device_id, system.mac());
        info!("Answering device info request: {}", info);
        if let Err(e) = sender.send_device_info(&DeviceInfoPacket::new(&info.device_id, info.mac)) {
            warn!("Dropping device info reply: {}", e);
        }
    });

    let (sender, time) = (handle.sender.clone(), handle.time.clone());
    dispatcher.register(Command::GetNetworkTime, move |_| {
        let now = time.get();
        debug!("Network time requested, replying {}", now);
        sender.send_or_log(
            NetworkTimeReply {
                utc_seconds: now.utc_seconds,
                timezone: now.zone.code(),
            }
            .to_packet(),
        );
    });

    let unlock = handle.unlock.clone();
    dispatcher.register(Command::RemoteUnlockAck, move |packet| unlock.on_mcu_ack(packet));

    let images = handle.images.clone();
    dispatcher.register(Command::ImageTransfer, move |packet| {
        images.handle(packet);
    });

    dispatcher.register(Command::NetworkStatus, log_network_status);

    let reports = handle.reports.clone();
    dispatcher.register(Command::StateReport, move |packet| reports.handle_incoming(packet));
    let reports = handle.reports.clone();
    dispatcher.register(Command::StateReportAck, move |_| {
        reports.on_ack();
    });

    dispatcher
}

fn log_network_status(packet: &Packet) {
    let Ok(report) = NetworkStatusReport::from_packet(packet) else {
        return;
    };
    match NetStatus::try_from(report.status) {
        Ok(status) => info!(
            "Lock reports network status {} (utc={}, tz={})",
            status, report.utc_seconds, report.timezone
        ),
        Err(_) => warn!("Lock reports unknown network status 0x{:02X}", report.status),
    }
}

/// Factory reset requested by `CMD_CLEAR_DATA`
#[derive(Clone)]
struct DataReset {
    system: Arc<dyn SystemControl>,
    net: NetStatusTracker,
    sender: PacketSender,
    restart_delay: Duration,
    busy: Arc<AtomicBool>,
}

impl DataReset {
    fn start(&self) -> Result<JoinHandle<()>> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(Error::ClearInProgress);
        }

        let this = self.clone();
        Ok(tokio::spawn(async move {
            this.run().await;
            this.busy.store(false, Ordering::SeqCst);
        }))
    }

    async fn run(&self) {
        info!("Clearing stored data");

        let erased = self
            .system
            .disconnect_wifi()
            .and_then(|()| self.system.erase_storage());
        if let Err(e) = erased {
            error!("Clear data failed: {}", e);
            self.reply(response_status::FAILED);
            return;
        }

        self.net.update_status(NetStatus::NotConfigured);
        self.reply(response_status::SUCCESS);

        info!("Data cleared, restarting in {:?}", self.restart_delay);
        tokio::time::sleep(self.restart_delay).await;
        self.system.restart();
    }

    fn reply(&self, status: u8) {
        self.sender.send_or_log(
            Response {
                status,
                subject: RESPONSE_SUBJECT,
            }
            .to_packet(),
        );
    }

    fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}

/// Cloneable handle to a [`Bridge`]'s components
#[derive(Clone)]
pub struct BridgeHandle {
    net: NetStatusTracker,
    reports: StateReporter,
    unlock: UnlockCorrelator,
    events: EventUploader,
    images: ImageTransfer,
    reset: DataReset,
    time: TimeCache,
    sender: PacketSender,
}

impl BridgeHandle {
    /// Feed a Wi-Fi or MQTT event into the status tracker
    pub fn network_event(&self, event: NetworkEvent) {
        self.net.handle_event(event);
    }

    /// Set the connectivity level directly; returns whether it changed
    pub fn update_status(&self, status: NetStatus) -> bool {
        self.net.update_status(status)
    }

    pub fn net_status(&self) -> NetStatus {
        self.net.status()
    }

    /// Queue a state report for the lock with at-least-once delivery
    pub fn upload_state(&self, state_type: u16, state_value: u32) -> Result<()> {
        self.reports.upload(state_type, state_value)
    }

    pub fn pending_reports(&self) -> Vec<PendingReport> {
        self.reports.pending()
    }

    /// Forward a cloud unlock command to the lock
    ///
    /// Also closes the lock's pending remote-request window, since this is
    /// the cloud's answer to it.
    ///
    /// # Errors
    ///
    /// [`Error::UnlockInProgress`] while an earlier unlock awaits its ack.
    pub fn remote_unlock(&self, user_type: u8, user_id: u16) -> Result<()> {
        self.unlock.request(user_type, user_id)?;
        self.events.clear_remote_request();
        Ok(())
    }

    pub fn is_unlock_in_progress(&self) -> bool {
        self.unlock.is_in_progress()
    }

    /// Report the outcome of Wi-Fi provisioning to the lock
    ///
    /// `status` is one of [`response_status`].
    pub fn send_provisioning_result(&self, status: u8) -> Result<()> {
        info!("Provisioning result 0x{:02X}", status);
        self.sender.send(
            Response {
                status,
                subject: RESPONSE_SUBJECT,
            }
            .to_packet(),
        )
    }

    /// Store the time obtained from the cloud
    pub fn set_network_time(&self, time: NetworkTime) {
        self.time.set(time);
    }

    pub fn network_time(&self) -> NetworkTime {
        self.time.get()
    }

    pub fn is_clearing_data(&self) -> bool {
        self.reset.is_running()
    }

    pub fn is_image_transfer_enabled(&self) -> bool {
        self.images.is_enabled()
    }

    pub fn subscribe_net_status(&self) -> broadcast::Receiver<NetStaNotice> {
        self.net.subscribe()
    }

    pub fn subscribe_state_reports(&self) -> broadcast::Receiver<StateReport> {
        self.reports.subscribe()
    }

    pub fn subscribe_unlock_outcomes(&self) -> broadcast::Receiver<UnlockOutcome> {
        self.unlock.subscribe()
    }
}
