//! Command dispatcher
//!
//! Routes each valid packet to the handler registered for its command byte.
//! Handlers run inline on the receive loop, so anything slow must be spawned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use lockbridge_core::{Command, Packet};

/// Packet handler
pub type Handler = Arc<dyn Fn(&Packet) + Send + Sync>;

/// Where a packet ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A handler registered for the command ran
    Handler,
    /// No exact match, the fallback ran
    Fallback,
    /// No exact match and no fallback
    Dropped,
}

/// Command table
#[derive(Default, Clone)]
pub struct Dispatcher {
    handlers: HashMap<u8, Handler>,
    fallback: Option<Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for a command byte
    pub fn register<F>(&mut self, command: impl Into<u8>, handler: F)
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        let code = command.into();
        if self.handlers.insert(code, Arc::new(handler)).is_some() {
            debug!("Replaced handler for 0x{:02X}", code);
        }
    }

    /// Handler for commands with no registered entry
    pub fn set_fallback<F>(&mut self, handler: F)
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(handler));
    }

    pub fn is_registered(&self, command: impl Into<u8>) -> bool {
        self.handlers.contains_key(&command.into())
    }

    /// Route one packet
    pub fn dispatch(&self, packet: &Packet) -> Dispatched {
        let code = packet.command();

        if let Some(handler) = self.handlers.get(&code) {
            debug!(command = code, "Dispatching {}", describe(code));
            handler(packet);
            return Dispatched::Handler;
        }

        if let Some(fallback) = &self.fallback {
            debug!(command = code, "No handler for {}, using fallback", describe(code));
            fallback(packet);
            return Dispatched::Fallback;
        }

        warn!(command = code, "No handler for {}, dropping", describe(code));
        Dispatched::Dropped
    }
}

fn describe(code: u8) -> String {
    match Command::try_from(code) {
        Ok(command) => command.to_string(),
        Err(_) => format!("unknown command 0x{:02X}", code),
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.handlers.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("commands", &codes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
