//! Device-A engine configuration.
//!
//! Chained-setter configuration: every knob defaults to a sane constant,
//! and callers only touch the ones they need to override (mainly tests
//! shrinking timeouts).

use std::time::Duration;

use super::status::ControlConfig;

#[derive(Clone)]
pub struct EngineBuilder {
    pub(crate) polling_interval_ms: u64,
    pub(crate) command_timeout: Duration,
    pub(crate) long_timeout: Duration,
    pub(crate) control: ControlConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            polling_interval_ms: 250,
            command_timeout: Duration::from_millis(2000),
            long_timeout: Duration::from_millis(5000),
            control: ControlConfig::default(),
        }
    }

    pub fn polling_interval_ms(mut self, ms: u64) -> Self {
        self.polling_interval_ms = ms;
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

    pub fn short_average_count(mut self, count: usize) -> Self {
        self.control.short_average_count = count;
        self
    }

    pub fn long_average_count(mut self, count: usize) -> Self {
        self.control.long_average_count = count;
        self
    }

    pub fn use_avg_percent(mut self, percent: f64) -> Self {
        self.control.use_avg_percent = percent;
        self
    }

    pub fn past_ppm_capacity(mut self, capacity: usize) -> Self {
        self.control.past_ppm_capacity = capacity;
        self
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
