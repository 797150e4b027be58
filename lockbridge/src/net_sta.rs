//! Network status tracker
//!
//! Owns the module's connectivity level, tells the lock about every change
//! with one `CMD_NETWORK_STATUS` packet and runs the provisioning watchdogs:
//! the router must be reached within 5 s and the cloud within 12 s of
//! [`NetStatusTracker::start_monitor`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use lockbridge_core::messages::NetworkStatusReport;
use lockbridge_types::NetStatus;

use crate::{sender::PacketSender, time_cache::TimeCache, timer::OneShotTimer};

/// Connectivity events from the Wi-Fi and MQTT stacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Station associated, waiting for an address
    WifiLinkUp,
    /// DHCP lease obtained
    GotIp,
    MqttConnected,
    WifiDisconnected,
    MqttDisconnected,
}

/// Provisioning watchdogs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watchdog {
    Router,
    Server,
}

impl Watchdog {
    /// Status that must be reached before this watchdog expires
    pub fn threshold(self) -> NetStatus {
        match self {
            Watchdog::Router => NetStatus::ConnectedRouter,
            Watchdog::Server => NetStatus::ConnectedServer,
        }
    }
}

/// Broadcast to subscribers of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetStaNotice {
    StatusChanged { from: NetStatus, to: NetStatus },
    WatchdogExpired { watchdog: Watchdog, status: NetStatus },
}

struct Inner {
    status: Mutex<NetStatus>,
    sender: PacketSender,
    time: TimeCache,
    router_timer: OneShotTimer,
    server_timer: OneShotTimer,
    router_period: Duration,
    server_period: Duration,
    notices: broadcast::Sender<NetStaNotice>,
}

/// Cloneable handle to the tracker
#[derive(Clone)]
pub struct NetStatusTracker {
    inner: Arc<Inner>,
}

impl NetStatusTracker {
    pub fn new(
        sender: PacketSender,
        time: TimeCache,
        router_period: Duration,
        server_period: Duration,
    ) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                status: Mutex::new(NetStatus::NotConfigured),
                sender,
                time,
                router_timer: OneShotTimer::new("net_sta_router"),
                server_timer: OneShotTimer::new("net_sta_server"),
                router_period,
                server_period,
                notices,
            }),
        }
    }

    pub fn status(&self) -> NetStatus {
        *self.inner.status.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetStaNotice> {
        self.inner.notices.subscribe()
    }

    /// Record a new status
    ///
    /// Does nothing if the status is unchanged. Otherwise cancels the
    /// watchdogs whose threshold is now met and queues exactly one
    /// notification carrying the cached network time. Returns whether the
    /// status changed.
    pub fn update_status(&self, status: NetStatus) -> bool {
        self.update_status_if(|_| true, status)
    }

    /// [`update_status`](Self::update_status) applied only if `guard`
    /// accepts the current status
    ///
    /// The guard runs under the same lock as the write, so no other update
    /// can slip in between the check and the change.
    pub fn update_status_if(&self, guard: impl FnOnce(NetStatus) -> bool, status: NetStatus) -> bool {
        let inner = &self.inner;
        let from = {
            let mut current = inner.status.lock();
            if !guard(*current) {
                warn!("Status {} not applied at {}", status, *current);
                return false;
            }
            if *current == status {
                return false;
            }
            let from = std::mem::replace(&mut *current, status);

            if status >= Watchdog::Router.threshold() && inner.router_timer.cancel() {
                info!("Router watchdog stopped at {}", status);
            }
            if status >= Watchdog::Server.threshold() && inner.server_timer.cancel() {
                info!("Server watchdog stopped at {}", status);
            }

            // Queued under the lock so notifications keep the order of changes
            let time = inner.time.get();
            let report = NetworkStatusReport {
                status: status.code(),
                utc_seconds: time.utc_seconds,
                timezone: time.zone.code(),
            };
            if let Err(e) = inner.sender.send(report.to_packet()) {
                error!("Failed to send network status notification: {}", e);
            }
            from
        };

        info!(status = status.code(), "Network status {} -> {}", from, status);
        let _ = inner.notices.send(NetStaNotice::StatusChanged { from, to: status });
        true
    }

    /// Map a connectivity event onto a status update
    pub fn handle_event(&self, event: NetworkEvent) {
        let target = match event {
            NetworkEvent::WifiLinkUp => NetStatus::ConnectingRouter,
            NetworkEvent::GotIp => NetStatus::ConnectedRouter,
            NetworkEvent::MqttConnected => NetStatus::ConnectedServer,
            NetworkEvent::WifiDisconnected => NetStatus::NotConfigured,
            NetworkEvent::MqttDisconnected => {
                self.update_status_if(
                    |current| current >= NetStatus::ConnectedRouter,
                    NetStatus::ConnectedRouter,
                );
                return;
            }
        };
        self.update_status(target);
    }

    /// Arm the router and server watchdogs (each only if not already armed)
    pub fn start_monitor(&self) {
        for watchdog in [Watchdog::Router, Watchdog::Server] {
            let (timer, period) = self.watchdog(watchdog);
            if timer.is_armed() {
                continue;
            }

            let weak = Arc::downgrade(&self.inner);
            timer.start(period, move || Self::on_watchdog(weak, watchdog));
            info!("{:?} watchdog started ({:?})", watchdog, period);
        }
    }

    /// Which watchdogs are currently armed, as `(router, server)`
    pub fn watchdogs_armed(&self) -> (bool, bool) {
        (
            self.inner.router_timer.is_armed(),
            self.inner.server_timer.is_armed(),
        )
    }

    fn watchdog(&self, watchdog: Watchdog) -> (&OneShotTimer, Duration) {
        match watchdog {
            Watchdog::Router => (&self.inner.router_timer, self.inner.router_period),
            Watchdog::Server => (&self.inner.server_timer, self.inner.server_period),
        }
    }

    fn on_watchdog(inner: Weak<Inner>, watchdog: Watchdog) {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let status = *inner.status.lock();
        if status >= watchdog.threshold() {
            return;
        }

        error!(
            status = status.code(),
            "Network connection failed: {:?} watchdog expired at {}", watchdog, status
        );
        let _ = inner
            .notices
            .send(NetStaNotice::WatchdogExpired { watchdog, status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{channel, drain_packets, FrameReceiver};
    use lockbridge_core::Command;
    use lockbridge_types::{NetworkTime, TimeZoneCode};
    use pretty_assertions::assert_eq;

    fn tracker() -> (NetStatusTracker, FrameReceiver, TimeCache) {
        let (sender, rx) = channel();
        let time = TimeCache::new();
        let tracker = NetStatusTracker::new(
            sender,
            time.clone(),
            Duration::from_secs(5),
            Duration::from_secs(12),
        );
        (tracker, rx, time)
    }

    #[tokio::test]
    async fn test_connected_server_notification() {
        let (tracker, mut rx, time) = tracker();
        time.set(NetworkTime::new(0x6553_F100, TimeZoneCode::from_code(80)));
        tracker.update_status(NetStatus::ConnectedRouter);
        drain_packets(&mut rx);

        assert!(tracker.update_status(NetStatus::ConnectedServer));

        let packets = drain_packets(&mut rx);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is(Command::NetworkStatus));
        assert_eq!(packets[0].data(), &[0x04, 0x00, 0xF1, 0x53, 0x65, 80]);
    }

    #[tokio::test]
    async fn test_notify_only_on_change() {
        let (tracker, mut rx, _) = tracker();

        assert!(!tracker.update_status(NetStatus::NotConfigured));
        assert!(tracker.update_status(NetStatus::ConnectingRouter));
        assert!(!tracker.update_status(NetStatus::ConnectingRouter));

        let packets = drain_packets(&mut rx);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data()[0], 0x02);
    }

    #[tokio::test]
    async fn test_unsynced_time_sends_zero() {
        let (tracker, mut rx, _) = tracker();
        tracker.update_status(NetStatus::ConnectedRouter);

        let packets = drain_packets(&mut rx);
        assert_eq!(packets[0].data(), &[0x03, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_event_mapping() {
        let (tracker, mut rx, _) = tracker();
        let mut notices = tracker.subscribe();

        tracker.handle_event(NetworkEvent::WifiLinkUp);
        tracker.handle_event(NetworkEvent::GotIp);
        tracker.handle_event(NetworkEvent::MqttConnected);
        tracker.handle_event(NetworkEvent::MqttDisconnected);
        tracker.handle_event(NetworkEvent::WifiDisconnected);

        let statuses: Vec<u8> = drain_packets(&mut rx).iter().map(|p| p.data()[0]).collect();
        assert_eq!(statuses, vec![2, 3, 4, 3, 1]);

        assert_eq!(
            notices.try_recv().unwrap(),
            NetStaNotice::StatusChanged {
                from: NetStatus::NotConfigured,
                to: NetStatus::ConnectingRouter,
            }
        );
    }

    #[tokio::test]
    async fn test_mqtt_disconnect_below_router_ignored() {
        let (tracker, mut rx, _) = tracker();
        tracker.handle_event(NetworkEvent::WifiLinkUp);
        drain_packets(&mut rx);

        tracker.handle_event(NetworkEvent::MqttDisconnected);

        assert_eq!(tracker.status(), NetStatus::ConnectingRouter);
        assert!(drain_packets(&mut rx).is_empty());
    }

    #[test]
    fn test_racing_disconnects_end_not_configured() {
        use std::sync::Barrier;

        let (tracker, mut rx, _) = tracker();
        for _ in 0..200 {
            tracker.update_status(NetStatus::ConnectedServer);
            let barrier = Barrier::new(2);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    tracker.handle_event(NetworkEvent::MqttDisconnected);
                });
                scope.spawn(|| {
                    barrier.wait();
                    tracker.handle_event(NetworkEvent::WifiDisconnected);
                });
            });

            assert_eq!(tracker.status(), NetStatus::NotConfigured);
            let last = drain_packets(&mut rx).pop().unwrap();
            assert_eq!(last.data()[0], NetStatus::NotConfigured.code());
        }
    }

    #[tokio::test]
    async fn test_guarded_update_rejected() {
        let (tracker, mut rx, _) = tracker();
        tracker.update_status(NetStatus::ConnectingRouter);
        drain_packets(&mut rx);

        let applied = tracker.update_status_if(
            |current| current >= NetStatus::ConnectedRouter,
            NetStatus::ConnectedRouter,
        );

        assert!(!applied);
        assert_eq!(tracker.status(), NetStatus::ConnectingRouter);
        assert!(drain_packets(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_wifi_disconnect_from_any_state() {
        let (tracker, mut rx, _) = tracker();
        tracker.update_status(NetStatus::ConnectedServer);
        tracker.handle_event(NetworkEvent::WifiDisconnected);

        assert_eq!(tracker.status(), NetStatus::NotConfigured);
        assert_eq!(drain_packets(&mut rx).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdogs_expire_when_thresholds_missed() {
        let (tracker, _rx, _) = tracker();
        let mut notices = tracker.subscribe();

        tracker.start_monitor();
        assert_eq!(tracker.watchdogs_armed(), (true, true));

        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert_eq!(
            notices.try_recv().unwrap(),
            NetStaNotice::WatchdogExpired {
                watchdog: Watchdog::Router,
                status: NetStatus::NotConfigured,
            }
        );

        tracker.update_status(NetStatus::ConnectedRouter);
        tokio::time::sleep(Duration::from_secs(7)).await;

        let mut expired = Vec::new();
        while let Ok(notice) = notices.try_recv() {
            if let NetStaNotice::WatchdogExpired { watchdog, status } = notice {
                expired.push((watchdog, status));
            }
        }
        assert_eq!(expired, vec![(Watchdog::Server, NetStatus::ConnectedRouter)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaching_threshold_cancels_watchdogs() {
        let (tracker, _rx, _) = tracker();
        let mut notices = tracker.subscribe();

        tracker.start_monitor();
        tracker.update_status(NetStatus::ConnectedRouter);
        assert_eq!(tracker.watchdogs_armed(), (false, true));

        tracker.update_status(NetStatus::ConnectedServer);
        assert_eq!(tracker.watchdogs_armed(), (false, false));

        tokio::time::sleep(Duration::from_secs(20)).await;
        while let Ok(notice) = notices.try_recv() {
            assert!(!matches!(notice, NetStaNotice::WatchdogExpired { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_monitor_does_not_rearm_running_watchdog() {
        let (tracker, _rx, _) = tracker();
        let mut notices = tracker.subscribe();

        tracker.start_monitor();
        tokio::time::sleep(Duration::from_secs(3)).await;
        tracker.start_monitor();

        // First arming still expires at 5 s, not 8 s
        tokio::time::sleep(Duration::from_millis(2_001)).await;
        assert!(matches!(
            notices.try_recv(),
            Ok(NetStaNotice::WatchdogExpired { watchdog: Watchdog::Router, .. })
        ));
    }
}
