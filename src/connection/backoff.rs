//! Reconnection delay policies used by the connection state machine.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

use super::config::{BackoffKind, ConnectionConfig};

/// Maps a 1-based reconnection attempt to the delay before that attempt.
pub trait BackoffPolicy: Send {
    fn next_delay(&mut self, attempt: u32) -> Duration;
}

/// Reuses the same delay for every attempt. No jitter, no cap.
#[derive(Clone, Debug)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedDelay {
    fn next_delay(&mut self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Exponential backoff with full jitter.
///
/// The ceiling for attempt `n` is `base * 2^(n-1)` clamped to `cap`; the
/// returned delay is drawn uniformly between a small floor and that ceiling.
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
    rng: StdRng,
}

const MIN_SLEEP_MS: u64 = 10;

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self::with_rng(base, cap, StdRng::from_entropy())
    }

    /// Construct with a fixed seed so tests observe a reproducible sequence.
    pub fn seeded(base: Duration, cap: Duration, seed: u64) -> Self {
        Self::with_rng(base, cap, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base: Duration, cap: Duration, rng: StdRng) -> Self {
        Self { base, cap, rng }
    }

    /// Upper bound of the jitter window for `attempt`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Duration {
        let max_ms = self.ceiling(attempt).as_millis().min(u128::from(u64::MAX)) as u64;
        let sleep_ms = match max_ms {
            0 => MIN_SLEEP_MS,
            1..=MIN_SLEEP_MS => max_ms,
            _ => self.rng.gen_range(MIN_SLEEP_MS..=max_ms),
        };
        Duration::from_millis(sleep_ms)
    }
}

impl std::fmt::Debug for ExponentialBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExponentialBackoff")
            .field("base", &self.base)
            .field("cap", &self.cap)
            .finish()
    }
}

/// Build the policy selected by the configuration.
pub(crate) fn policy_for(config: &ConnectionConfig) -> Box<dyn BackoffPolicy> {
    match config.backoff {
        BackoffKind::Fixed => Box::new(FixedDelay::new(config.reconnect_delay)),
        BackoffKind::Exponential { cap } => {
            Box::new(ExponentialBackoff::new(config.reconnect_delay, cap))
        }
    }
}
