//! Bridge configuration
//!
//! Every duration defaults to the value the lock firmware was tuned for and
//! can be overridden with a `with_*` setter or a `LOCKBRIDGE_*_MS`
//! environment variable.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Retransmission policy for outbound state reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Age after which an unacknowledged report is resent
    pub ack_timeout: Duration,
    /// Resends allowed after the initial transmission
    pub max_retries: u8,
    /// Period of the retransmit scan
    pub tick: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(100),
            max_retries: 3,
            tick: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Reject periods the scan cannot run with
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for a zero `tick` or `ack_timeout`.
    pub fn validate(&self) -> Result<()> {
        if self.tick.is_zero() {
            return Err(Error::InvalidConfig("state report tick must be non-zero".into()));
        }
        if self.ack_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "state report ack timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Timing knobs of the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub receive_timeout: Duration,
    pub router_watchdog: Duration,
    pub server_watchdog: Duration,
    pub state_report: RetryPolicy,
    pub unlock_timeout: Duration,
    pub remote_request_window: Duration,
    pub unlocked_event_window: Duration,
    pub image_transfer_timeout: Duration,
    pub restart_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(1),
            router_watchdog: Duration::from_secs(5),
            server_watchdog: Duration::from_secs(12),
            state_report: RetryPolicy::default(),
            unlock_timeout: Duration::from_secs(15),
            remote_request_window: Duration::from_secs(60),
            unlocked_event_window: Duration::from_secs(12),
            image_transfer_timeout: Duration::from_secs(3),
            restart_delay: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `LOCKBRIDGE_*_MS` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let read_ms = |key: &str| -> Option<Duration> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                _ => {
                    warn!(key, value = %raw, "Ignoring invalid duration");
                    None
                }
            }
        };

        let fields: [(&str, &mut Duration); 10] = [
            ("LOCKBRIDGE_RECEIVE_TIMEOUT_MS", &mut config.receive_timeout),
            ("LOCKBRIDGE_ROUTER_WATCHDOG_MS", &mut config.router_watchdog),
            ("LOCKBRIDGE_SERVER_WATCHDOG_MS", &mut config.server_watchdog),
            ("LOCKBRIDGE_STATE_REPORT_ACK_TIMEOUT_MS", &mut config.state_report.ack_timeout),
            ("LOCKBRIDGE_STATE_REPORT_TICK_MS", &mut config.state_report.tick),
            ("LOCKBRIDGE_UNLOCK_TIMEOUT_MS", &mut config.unlock_timeout),
            ("LOCKBRIDGE_REMOTE_REQUEST_WINDOW_MS", &mut config.remote_request_window),
            ("LOCKBRIDGE_UNLOCKED_EVENT_WINDOW_MS", &mut config.unlocked_event_window),
            ("LOCKBRIDGE_IMAGE_TRANSFER_TIMEOUT_MS", &mut config.image_transfer_timeout),
            ("LOCKBRIDGE_RESTART_DELAY_MS", &mut config.restart_delay),
        ];
        for (key, slot) in fields {
            if let Some(value) = read_ms(key) {
                *slot = value;
            }
        }

        if let Some(raw) = lookup("LOCKBRIDGE_STATE_REPORT_MAX_RETRIES") {
            match raw.trim().parse::<u8>() {
                Ok(n) => config.state_report.max_retries = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid LOCKBRIDGE_STATE_REPORT_MAX_RETRIES"),
            }
        }

        config
    }

    /// Check the values the bridge loop depends on
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.receive_timeout.is_zero() {
            return Err(Error::InvalidConfig("receive timeout must be non-zero".into()));
        }
        self.state_report.validate()
    }

    /// Set transport poll timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Set the router and server watchdog periods
    pub fn with_watchdogs(mut self, router: Duration, server: Duration) -> Self {
        self.router_watchdog = router;
        self.server_watchdog = server;
        self
    }

    /// Set state-report retransmission policy
    pub fn with_state_report(mut self, policy: RetryPolicy) -> Self {
        self.state_report = policy;
        self
    }

    /// Set remote unlock ack timeout
    pub fn with_unlock_timeout(mut self, timeout: Duration) -> Self {
        self.unlock_timeout = timeout;
        self
    }

    /// Set the in-progress windows of remote-request and unlocked events
    pub fn with_event_windows(mut self, remote_request: Duration, unlocked: Duration) -> Self {
        self.remote_request_window = remote_request;
        self.unlocked_event_window = unlocked;
        self
    }

    /// Set image capture/upload deadline
    pub fn with_image_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.image_transfer_timeout = timeout;
        self
    }

    /// Set delay between the clear-data reply and the restart
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }
}
