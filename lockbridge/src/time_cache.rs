//! Cached network time

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use lockbridge_types::NetworkTime;

/// Last time received from the cloud, shared by every component
///
/// A zero UTC value means no sync yet, which the state-report layer treats
/// as "not connected".
#[derive(Debug, Clone, Default)]
pub struct TimeCache {
    inner: Arc<RwLock<NetworkTime>>,
}

impl TimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> NetworkTime {
        *self.inner.read()
    }

    pub fn set(&self, time: NetworkTime) {
        info!(utc = time.utc_seconds, timezone = time.zone.code(), "Updated network time");
        *self.inner.write() = time;
    }

    pub fn is_synchronized(&self) -> bool {
        self.inner.read().is_synchronized()
    }
}
