//! State-report reliability layer
//!
//! Outbound reports (`CMD_STATE_REPORT`, 0x42) are kept in a pending list
//! until the lock acknowledges them with `CMD_STATE_REPORT_ACK` (0x43).
//! A periodic scan resends reports whose ack is overdue, at most
//! `max_retries` times after the initial transmission, then drops them.
//! Delivery is therefore at-least-once while retries last, and may silently
//! fail afterwards.
//!
//! "Connected" means the network time has been synchronised at least once.
//! While disconnected reports are only cached; the first scan after the
//! link comes up sends them.
//!
//! The lock acks without echoing the report, so an ack always retires the
//! oldest pending report.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use lockbridge_core::{messages::StateReport, Command, Packet};

use crate::{config::RetryPolicy, error::Result, sender::PacketSender, time_cache::TimeCache};

/// A report awaiting acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReport {
    pub state_type: u16,
    pub state_value: u32,
    /// `None` until the first transmission
    pub last_sent: Option<Instant>,
    /// Retransmissions so far, the initial send excluded
    pub retry_count: u8,
}

impl PendingReport {
    fn packet(&self) -> Packet {
        StateReport {
            state_type: self.state_type,
            state_value: self.state_value,
        }
        .to_packet()
    }
}

struct Inner {
    pending: Mutex<VecDeque<PendingReport>>,
    sender: PacketSender,
    time: TimeCache,
    policy: RetryPolicy,
    incoming: broadcast::Sender<StateReport>,
}

/// Cloneable handle to the reliability layer
#[derive(Clone)]
pub struct StateReporter {
    inner: Arc<Inner>,
}

impl StateReporter {
    pub fn new(sender: PacketSender, time: TimeCache, policy: RetryPolicy) -> Self {
        let (incoming, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(VecDeque::new()),
                sender,
                time,
                policy,
                incoming,
            }),
        }
    }

    /// Reports received from the lock
    pub fn subscribe(&self) -> broadcast::Receiver<StateReport> {
        self.inner.incoming.subscribe()
    }

    /// Queue a report for the lock, sending it at once if connected
    pub fn upload(&self, state_type: u16, state_value: u32) -> Result<()> {
        let connected = self.inner.time.is_synchronized();
        let item = PendingReport {
            state_type,
            state_value,
            last_sent: connected.then(Instant::now),
            retry_count: 0,
        };

        self.inner.pending.lock().push_back(item);

        if connected {
            self.inner.sender.send(item.packet())?;
            info!("State report 0x{:04X}={} sent", state_type, state_value);
        } else {
            warn!("Not connected, state report 0x{:04X}={} cached", state_type, state_value);
        }
        Ok(())
    }

    /// Handle a report from the lock: log, hand to subscribers and always ack
    pub fn handle_incoming(&self, packet: &Packet) {
        match StateReport::from_packet(packet) {
            Ok(report) => {
                info!(
                    "State report from lock: type=0x{:04X}, value={}",
                    report.state_type, report.state_value
                );
                let _ = self.inner.incoming.send(report);
            }
            Err(e) => warn!("Malformed state report: {}", e),
        }

        self.inner.sender.send_or_log(Packet::empty(Command::StateReportAck));
    }

    /// The lock acknowledged a report; retires the oldest pending one
    pub fn on_ack(&self) -> Option<PendingReport> {
        let acked = self.inner.pending.lock().pop_front();
        match &acked {
            Some(item) => info!(
                "State report acknowledged: type=0x{:04X}, value={}",
                item.state_type, item.state_value
            ),
            None => warn!("State report ack with nothing pending"),
        }
        acked
    }

    /// One retransmission scan
    ///
    /// Does nothing while disconnected. Never-sent reports get their initial
    /// transmission; reports whose last send is at least `ack_timeout` old are
    /// resent while `retry_count < max_retries` and dropped otherwise.
    pub fn tick(&self, now: Instant) {
        if !self.inner.time.is_synchronized() {
            return;
        }

        let policy = self.inner.policy;
        let mut outbound = Vec::new();
        {
            let mut pending = self.inner.pending.lock();
            pending.retain_mut(|item| match item.last_sent {
                None => {
                    item.last_sent = Some(now);
                    outbound.push(item.packet());
                    debug!("Initial send of cached report 0x{:04X}", item.state_type);
                    true
                }
                Some(sent) if now.saturating_duration_since(sent) >= policy.ack_timeout => {
                    if item.retry_count < policy.max_retries {
                        item.retry_count += 1;
                        item.last_sent = Some(now);
                        outbound.push(item.packet());
                        info!(
                            "Retransmitted state report: type=0x{:04X}, value={}, retry={}",
                            item.state_type, item.state_value, item.retry_count
                        );
                        true
                    } else {
                        warn!(
                            "Dropping state report after {} retries: type=0x{:04X}, value={}",
                            item.retry_count, item.state_type, item.state_value
                        );
                        false
                    }
                }
                Some(_) => true,
            });
        }

        for packet in outbound {
            self.inner.sender.send_or_log(packet);
        }
    }

    /// Run [`tick`](Self::tick) every `policy.tick` until every handle is dropped
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the policy
    /// has a zero period.
    pub fn spawn_retransmit_task(&self) -> Result<JoinHandle<()>> {
        self.inner.policy.validate()?;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.policy.tick;

        Ok(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                StateReporter { inner }.tick(Instant::now());
            }
        }))
    }

    /// Snapshot of the pending list, oldest first
    pub fn pending(&self) -> Vec<PendingReport> {
        self.inner.pending.lock().iter().copied().collect()
    }
}
