//! Keep-alive tick scheduling scoped to the open state.
//!
//! The monitor only generates ticks. It does not wait for replies and never
//! declares the connection dead on its own.

use std::time::{Duration, Instant};

use super::{config::HeartbeatConfig, payload::Payload};

#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: Option<HeartbeatConfig>,
    next_tick: Option<Instant>,
}

impl HeartbeatMonitor {
    /// A monitor that stays inert when `config` is `None`.
    pub fn new(config: Option<HeartbeatConfig>) -> Self {
        Self {
            config,
            next_tick: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Start ticking from `now`. No-op when the heartbeat is disabled.
    pub fn arm(&mut self, now: Instant) {
        self.next_tick = self.interval().map(|interval| now + interval);
    }

    pub fn disarm(&mut self) {
        self.next_tick = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Report whether a tick is due at `now`, scheduling the following one.
    pub fn poll(&mut self, now: Instant) -> bool {
        match (self.next_tick, self.interval()) {
            (Some(due), Some(interval)) if due <= now => {
                self.next_tick = Some(now + interval);
                true
            }
            _ => false,
        }
    }

    pub fn message(&self) -> Option<&Payload> {
        self.config.as_ref().map(|config| &config.message)
    }

    fn interval(&self) -> Option<Duration> {
        self.config.as_ref().map(|config| config.interval)
    }
}
