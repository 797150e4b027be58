//! Remote-unlock correlator
//!
//! Sends `CMD_REMOTE_UNLOCK` (0x13) on behalf of the cloud and waits for the
//! lock's `CMD_REMOTE_UNLOCK_ACK` (0x12). Only one request may be in flight;
//! it ends with the ack or after the timeout, with no automatic retry.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use lockbridge_core::{messages::RemoteUnlock, Command, Packet};

use crate::{
    error::{Error, Result},
    sender::PacketSender,
    timer::OneShotTimer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnlockState {
    Idle,
    AwaitingAck {
        user_type: u8,
        user_id: u16,
        request_id: u64,
    },
}

/// How an unlock request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Completed { user_type: u8, user_id: u16 },
    TimedOut { user_type: u8, user_id: u16 },
}

struct Inner {
    state: Mutex<UnlockState>,
    next_request: Mutex<u64>,
    sender: PacketSender,
    timer: OneShotTimer,
    timeout: Duration,
    outcomes: broadcast::Sender<UnlockOutcome>,
}

/// Cloneable handle to the correlator
#[derive(Clone)]
pub struct UnlockCorrelator {
    inner: Arc<Inner>,
}

impl UnlockCorrelator {
    pub fn new(sender: PacketSender, timeout: Duration) -> Self {
        let (outcomes, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(UnlockState::Idle),
                next_request: Mutex::new(0),
                sender,
                timer: OneShotTimer::new("remote_unlock"),
                timeout,
                outcomes,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnlockOutcome> {
        self.inner.outcomes.subscribe()
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(*self.inner.state.lock(), UnlockState::AwaitingAck { .. })
    }

    /// Ask the lock to open
    ///
    /// # Errors
    ///
    /// [`Error::UnlockInProgress`] if an earlier request is still awaiting
    /// its ack, [`Error::QueueClosed`] if the bridge has stopped.
    pub fn request(&self, user_type: u8, user_id: u16) -> Result<()> {
        let mut state = self.inner.state.lock();
        if let UnlockState::AwaitingAck { user_id: busy, .. } = *state {
            warn!("Remote unlock for user {} rejected, user {} still pending", user_id, busy);
            return Err(Error::UnlockInProgress);
        }

        self.inner
            .sender
            .send(RemoteUnlock { user_type, user_id }.to_packet())?;

        let request_id = {
            let mut next = self.inner.next_request.lock();
            *next += 1;
            *next
        };
        *state = UnlockState::AwaitingAck {
            user_type,
            user_id,
            request_id,
        };

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .timer
            .start(self.inner.timeout, move || Self::on_timeout(weak, request_id));

        info!("Remote unlock sent: user_type=0x{:02X}, user_id={}", user_type, user_id);
        Ok(())
    }

    /// Handle a packet from the lock; only `CMD_REMOTE_UNLOCK_ACK` matters
    pub fn on_mcu_ack(&self, packet: &Packet) {
        if !packet.is(Command::RemoteUnlockAck) {
            return;
        }

        let previous = {
            let mut state = self.inner.state.lock();
            let previous = std::mem::replace(&mut *state, UnlockState::Idle);
            if previous != UnlockState::Idle {
                self.inner.timer.cancel();
            }
            previous
        };

        match previous {
            UnlockState::AwaitingAck {
                user_type, user_id, ..
            } => {
                info!("Remote unlock done: user_type=0x{:02X}, user_id={}", user_type, user_id);
                let _ = self
                    .inner
                    .outcomes
                    .send(UnlockOutcome::Completed { user_type, user_id });
            }
            UnlockState::Idle => warn!("Remote unlock ack with no request in flight"),
        }
    }

    fn on_timeout(inner: Weak<Inner>, request_id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let mut state = inner.state.lock();
        let current_state = *state;
        match current_state {
            UnlockState::AwaitingAck {
                user_type,
                user_id,
                request_id: current,
            } if current == request_id => {
                *state = UnlockState::Idle;
                drop(state);
                warn!(
                    "Remote unlock failed: no ack within {:?} (user_type=0x{:02X}, user_id={})",
                    inner.timeout, user_type, user_id
                );
                let _ = inner
                    .outcomes
                    .send(UnlockOutcome::TimedOut { user_type, user_id });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::{channel, drain_packets, FrameReceiver};
    use lockbridge_core::constants::user_types;
    use pretty_assertions::assert_eq;

    fn correlator() -> (UnlockCorrelator, FrameReceiver) {
        let (sender, rx) = channel();
        (UnlockCorrelator::new(sender, Duration::from_secs(15)), rx)
    }

    fn ack() -> Packet {
        Packet::empty(Command::RemoteUnlockAck)
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_sends_unlock_packet() {
        let (unlock, mut rx) = correlator();

        unlock.request(user_types::PHONE, 0x0102).unwrap();

        let packets = drain_packets(&mut rx);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].is(Command::RemoteUnlock));
        assert_eq!(packets[0].data(), &[0x05, 0x02, 0x01, 0, 0, 0]);
        assert!(unlock.is_in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight() {
        let (unlock, mut rx) = correlator();

        unlock.request(user_types::PHONE, 1).unwrap();
        assert!(matches!(unlock.request(user_types::PHONE, 2), Err(Error::UnlockInProgress)));
        assert_eq!(drain_packets(&mut rx).len(), 1);

        unlock.on_mcu_ack(&ack());
        assert!(!unlock.is_in_progress());
        unlock.request(user_types::PHONE, 2).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_just_before_timeout() {
        let (unlock, _rx) = correlator();
        let mut outcomes = unlock.subscribe();

        unlock.request(user_types::PHONE, 7).unwrap();
        tokio::time::sleep(Duration::from_millis(14_999)).await;
        unlock.on_mcu_ack(&ack());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            outcomes.try_recv().unwrap(),
            UnlockOutcome::Completed { user_type: 0x05, user_id: 7 }
        );
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_ack() {
        let (unlock, _rx) = correlator();
        let mut outcomes = unlock.subscribe();

        unlock.request(user_types::PHONE, 7).unwrap();
        tokio::time::sleep(Duration::from_millis(15_001)).await;

        assert!(!unlock.is_in_progress());
        assert_eq!(
            outcomes.try_recv().unwrap(),
            UnlockOutcome::TimedOut { user_type: 0x05, user_id: 7 }
        );

        unlock.on_mcu_ack(&ack());
        assert!(outcomes.try_recv().is_err());
        unlock.request(user_types::PHONE, 8).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_keeps_original_deadline() {
        let (unlock, mut rx) = correlator();
        let mut outcomes = unlock.subscribe();

        unlock.request(user_types::PHONE, 1).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(unlock.request(user_types::PHONE, 2), Err(Error::UnlockInProgress)));

        // 15 s after the first request, not after the rejected one
        tokio::time::sleep(Duration::from_millis(5_001)).await;
        assert!(!unlock.is_in_progress());
        assert_eq!(
            outcomes.try_recv().unwrap(),
            UnlockOutcome::TimedOut { user_type: 0x05, user_id: 1 }
        );
        assert!(outcomes.try_recv().is_err());
        assert_eq!(drain_packets(&mut rx).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_ignored() {
        let (unlock, _rx) = correlator();
        let mut outcomes = unlock.subscribe();

        unlock.request(user_types::PHONE, 1).unwrap();
        unlock.on_mcu_ack(&ack());
        unlock.request(user_types::PHONE, 2).unwrap();

        // A fire for the first request that lost the race with its ack
        UnlockCorrelator::on_timeout(Arc::downgrade(&unlock.inner), 1);

        assert!(unlock.is_in_progress());
        assert!(matches!(outcomes.try_recv(), Ok(UnlockOutcome::Completed { user_id: 1, .. })));
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_commands_ignored() {
        let (unlock, _rx) = correlator();
        unlock.request(user_types::PHONE, 1).unwrap();

        unlock.on_mcu_ack(&Packet::empty(Command::StateReportAck));
        assert!(unlock.is_in_progress());
    }

    #[tokio::test]
    async fn test_failed_send_leaves_idle() {
        let (unlock, rx) = correlator();
        drop(rx);

        assert!(matches!(unlock.request(user_types::PHONE, 1), Err(Error::QueueClosed)));
        assert!(!unlock.is_in_progress());
    }
}
