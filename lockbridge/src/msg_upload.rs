//! Lock event uploads and power-off notices
//!
//! `CMD_EVENT_UPLOAD` (0x03) carries lock events that are forwarded to the
//! cloud. A remote-unlock request and an "unlocked" event each open an
//! in-progress window; a second event of the same kind inside its window is
//! rejected with a failure ack.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use lockbridge_core::{
    constants::{events, power_off_modes},
    messages::{EventUpload, Response},
    Command, Packet,
};

use crate::{hooks::CloudPublisher, sender::PacketSender, timer::OneShotTimer};

/// Topic that lock events are published to
pub const EVENT_TOPIC: &str = "/event/property/post";

/// `data[1]` of the acks sent by this module
const EVENT_SUBJECT: u8 = 0x03;
const POWER_OFF_SUBJECT: u8 = 0x04;

/// An in-progress window for one kind of event
struct EventWindow {
    name: &'static str,
    period: Duration,
    active: Mutex<Option<u64>>,
    next_id: Mutex<u64>,
    timer: OneShotTimer,
}

impl EventWindow {
    fn new(name: &'static str, period: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            period,
            active: Mutex::new(None),
            next_id: Mutex::new(0),
            timer: OneShotTimer::new(name),
        })
    }

    /// Open the window unless it is already open
    fn try_begin(self: &Arc<Self>) -> bool {
        let mut active = self.active.lock();
        if active.is_some() {
            return false;
        }

        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            *next
        };
        *active = Some(id);

        let weak: Weak<Self> = Arc::downgrade(self);
        self.timer.start(self.period, move || {
            if let Some(window) = weak.upgrade() {
                window.expire(id);
            }
        });
        true
    }

    fn expire(&self, id: u64) {
        let mut active = self.active.lock();
        if *active == Some(id) {
            *active = None;
            warn!("{} window of {:?} elapsed without a cloud response", self.name, self.period);
        }
    }

    fn clear(&self) -> bool {
        let mut active = self.active.lock();
        self.timer.cancel();
        active.take().is_some()
    }

    fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }
}

/// Handles `CMD_EVENT_UPLOAD` and `CMD_POWER_OFF`
#[derive(Clone)]
pub struct EventUploader {
    sender: PacketSender,
    publisher: Arc<dyn CloudPublisher>,
    remote_request: Arc<EventWindow>,
    unlocked: Arc<EventWindow>,
}

impl EventUploader {
    pub fn new(
        sender: PacketSender,
        publisher: Arc<dyn CloudPublisher>,
        remote_request_window: Duration,
        unlocked_window: Duration,
    ) -> Self {
        Self {
            sender,
            publisher,
            remote_request: EventWindow::new("remote_request", remote_request_window),
            unlocked: EventWindow::new("unlocked", unlocked_window),
        }
    }

    /// Route a packet from the lock; returns the publish task when one was
    /// started
    pub fn handle(&self, packet: &Packet) -> Option<JoinHandle<()>> {
        if packet.is(Command::EventUpload) {
            return self.handle_event(packet);
        }
        if packet.is(Command::PowerOff) {
            self.handle_power_off(packet);
        }
        None
    }

    pub fn is_remote_request_in_progress(&self) -> bool {
        self.remote_request.is_active()
    }

    pub fn is_unlocked_in_progress(&self) -> bool {
        self.unlocked.is_active()
    }

    /// The cloud answered the pending remote-unlock request
    pub fn clear_remote_request(&self) {
        if self.remote_request.clear() {
            info!("Remote unlock request answered by the cloud");
        }
    }

    fn handle_event(&self, packet: &Packet) -> Option<JoinHandle<()>> {
        let event = EventUpload::from_packet(packet).ok()?;
        info!("Event upload: event=0x{:02X}, info=0x{:02X}", event.event, event.info);

        let (window, desc) = match event.event {
            events::UNLOCK_REQUEST => (&self.remote_request, "remote_req"),
            events::UNLOCKED => (&self.unlocked, "unlocked"),
            other => {
                info!("Event 0x{:02X} needs no cloud round-trip", other);
                self.ack(Response::success(EVENT_SUBJECT));
                return None;
            }
        };

        if !window.try_begin() {
            warn!("{} event already in progress, rejecting", window.name);
            self.ack(Response::failure(EVENT_SUBJECT));
            return None;
        }

        self.ack(Response::success(EVENT_SUBJECT));

        let publisher = self.publisher.clone();
        let payload = format!(r#"{{"cmd":3,"desc":"{}"}}"#, desc);
        Some(tokio::spawn(async move {
            if let Err(e) = publisher.publish(EVENT_TOPIC, &payload).await {
                error!("Failed to publish {} event: {}", desc, e);
            }
        }))
    }

    fn handle_power_off(&self, packet: &Packet) {
        match packet.data()[0] {
            power_off_modes::NORMAL => info!("Lock is powering off"),
            power_off_modes::TEST => info!("Lock is powering off after a factory test"),
            other => warn!("Power-off notice with unknown mode 0x{:02X}", other),
        }
        self.ack(Response::success(POWER_OFF_SUBJECT));
    }

    fn ack(&self, response: Response) {
        self.sender.send_or_log(response.to_packet());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hooks::MockCloudPublisher,
        sender::{channel, drain_packets, FrameReceiver},
    };
    use async_trait::async_trait;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn uploader(publisher: MockCloudPublisher) -> (EventUploader, FrameReceiver) {
        let (sender, rx) = channel();
        let uploader = EventUploader::new(
            sender,
            Arc::new(publisher),
            Duration::from_secs(60),
            Duration::from_secs(12),
        );
        (uploader, rx)
    }

    fn event(code: u8) -> Packet {
        EventUpload { event: code, info: 0 }.to_packet()
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_request_published_and_acked() {
        let mut publisher = MockCloudPublisher::new();
        publisher
            .expect_publish()
            .with(eq(EVENT_TOPIC), eq(r#"{"cmd":3,"desc":"remote_req"}"#))
            .times(1)
            .returning(|_, _| Ok(()));
        let (uploader, mut rx) = uploader(publisher);

        uploader.handle(&event(events::UNLOCK_REQUEST)).unwrap().await.unwrap();

        let packets = drain_packets(&mut rx);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is(Command::Response));
        assert_eq!(packets[0].data(), &[0x00, 0x03, 0, 0, 0, 0]);
        assert!(uploader.is_remote_request_in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_remote_request_rejected() {
        let mut publisher = MockCloudPublisher::new();
        publisher.expect_publish().times(1).returning(|_, _| Ok(()));
        let (uploader, mut rx) = uploader(publisher);

        let publish = uploader.handle(&event(events::UNLOCK_REQUEST)).unwrap();
        assert!(uploader.handle(&event(events::UNLOCK_REQUEST)).is_none());
        publish.await.unwrap();

        let packets = drain_packets(&mut rx);
        assert_eq!(packets[1].data(), &[0x02, 0x03, 0, 0, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires() {
        let mut publisher = MockCloudPublisher::new();
        publisher
            .expect_publish()
            .with(eq(EVENT_TOPIC), eq(r#"{"cmd":3,"desc":"unlocked"}"#))
            .times(2)
            .returning(|_, _| Ok(()));
        let (uploader, mut rx) = uploader(publisher);

        uploader.handle(&event(events::UNLOCKED)).unwrap().await.unwrap();
        tokio::time::sleep(Duration::from_millis(12_001)).await;
        assert!(!uploader.is_unlocked_in_progress());

        uploader.handle(&event(events::UNLOCKED)).unwrap().await.unwrap();
        let acks: Vec<u8> = drain_packets(&mut rx).iter().map(|p| p.data()[0]).collect();
        assert_eq!(acks, vec![0x00, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_windows_are_independent() {
        let mut publisher = MockCloudPublisher::new();
        publisher.expect_publish().times(2).returning(|_, _| Ok(()));
        let (uploader, mut rx) = uploader(publisher);

        uploader.handle(&event(events::UNLOCK_REQUEST)).unwrap().await.unwrap();
        uploader.handle(&event(events::UNLOCKED)).unwrap().await.unwrap();

        let acks: Vec<u8> = drain_packets(&mut rx).iter().map(|p| p.data()[0]).collect();
        assert_eq!(acks, vec![0x00, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_remote_request() {
        let mut publisher = MockCloudPublisher::new();
        publisher.expect_publish().times(2).returning(|_, _| Ok(()));
        let (uploader, mut rx) = uploader(publisher);

        uploader.handle(&event(events::UNLOCK_REQUEST)).unwrap().await.unwrap();
        uploader.clear_remote_request();
        assert!(!uploader.is_remote_request_in_progress());

        uploader.handle(&event(events::UNLOCK_REQUEST)).unwrap().await.unwrap();
        let acks: Vec<u8> = drain_packets(&mut rx).iter().map(|p| p.data()[0]).collect();
        assert_eq!(acks, vec![0x00, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_failure_still_acks_success() {
        let mut publisher = MockCloudPublisher::new();
        publisher
            .expect_publish()
            .returning(|_, _| Err(crate::Error::Collaborator("mqtt down".into())));
        let (uploader, mut rx) = uploader(publisher);

        uploader.handle(&event(events::UNLOCKED)).unwrap().await.unwrap();

        assert_eq!(drain_packets(&mut rx)[0].data()[0], 0x00);
    }

    struct SlowBroker {
        delay: Duration,
        published: AtomicBool,
    }

    #[async_trait]
    impl CloudPublisher for SlowBroker {
        async fn publish(&self, _topic: &str, _payload: &str) -> crate::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.published.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_broker_does_not_hold_ack() {
        let broker = Arc::new(SlowBroker {
            delay: Duration::from_secs(30),
            published: AtomicBool::new(false),
        });
        let (sender, mut rx) = channel();
        let uploader = EventUploader::new(
            sender,
            broker.clone(),
            Duration::from_secs(60),
            Duration::from_secs(12),
        );

        let publish = uploader.handle(&event(events::UNLOCK_REQUEST)).unwrap();

        // Acked before the broker has answered
        assert_eq!(drain_packets(&mut rx)[0].data(), &[0x00, 0x03, 0, 0, 0, 0]);
        assert!(!broker.published.load(Ordering::SeqCst));

        publish.await.unwrap();
        assert!(broker.published.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_other_event_acked_without_publish() {
        let mut publisher = MockCloudPublisher::new();
        publisher.expect_publish().never();
        let (uploader, mut rx) = uploader(publisher);

        assert!(uploader.handle(&event(0x09)).is_none());

        assert_eq!(drain_packets(&mut rx)[0].data(), &[0x00, 0x03, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_power_off_acked() {
        let mut publisher = MockCloudPublisher::new();
        publisher.expect_publish().never();
        let (uploader, mut rx) = uploader(publisher);

        assert!(uploader
            .handle(&Packet::new(Command::PowerOff, [0x01, 0, 0, 0, 0, 0]))
            .is_none());

        let packets = drain_packets(&mut rx);
        assert!(packets[0].is(Command::Response));
        assert_eq!(packets[0].data(), &[0x00, 0x04, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_power_off_any_mode_acked() {
        let (uploader, mut rx) = uploader(MockCloudPublisher::new());

        for mode in [power_off_modes::NORMAL, power_off_modes::TEST, 0x7F] {
            uploader.handle(&Packet::new(Command::PowerOff, [mode, 0, 0, 0, 0, 0]));
        }

        let acks: Vec<u8> = drain_packets(&mut rx).iter().map(|p| p.data()[1]).collect();
        assert_eq!(acks, vec![POWER_OFF_SUBJECT; 3]);
    }
}
