//! Device-B engine configuration.

use std::time::Duration;

use super::registry::INBOUND_CAPACITY;

#[derive(Clone)]
pub struct EngineBuilder {
    pub(crate) heartbeat_interval_ms: u64,
    pub(crate) command_timeout: Duration,
    pub(crate) long_timeout: Duration,
    pub(crate) inbound_capacity: usize,
    pub(crate) last_ppm_capacity: usize,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            heartbeat_interval_ms: 900,
            command_timeout: Duration::from_millis(2000),
            long_timeout: Duration::from_millis(5000),
            inbound_capacity: INBOUND_CAPACITY,
            last_ppm_capacity: 250,
        }
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn long_timeout(mut self, timeout: Duration) -> Self {
        self.long_timeout = timeout;
        self
    }

    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    pub fn last_ppm_capacity(mut self, capacity: usize) -> Self {
        self.last_ppm_capacity = capacity;
        self
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
