use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default minimum interval between successive warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Helper that rate limits repetitive warnings.
///
/// The caller increments the counter via [`record`](Self::record). The next
/// call to [`warn_if_due`](Self::warn_if_due) emits a warning using the
/// provided callback if the configured interval has elapsed, reporting how
/// many events were recorded since the previous warning.
pub struct RateLimitedWarner {
    interval: Duration,
    state: Mutex<WarnState>,
}

struct WarnState {
    last_warn: Option<Instant>,
    pending: u64,
}

impl RateLimitedWarner {
    /// Create a new [`RateLimitedWarner`]. The first warning can be emitted
    /// immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(WarnState {
                last_warn: None,
                pending: 0,
            }),
        }
    }

    /// Increment the pending counter.
    pub fn record(&self) {
        self.state.lock().pending += 1;
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, warn: impl FnOnce(u64)) {
        self.warn_if_due_at(Instant::now(), warn);
    }

    pub(crate) fn warn_if_due_at(&self, now: Instant, warn: impl FnOnce(u64)) {
        let mut state = self.state.lock();
        let due = state
            .last_warn
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !due || state.pending == 0 {
            return;
        }
        let count = std::mem::take(&mut state.pending);
        state.last_warn = Some(now);
        drop(state);
        warn(count);
    }
}

impl Default for RateLimitedWarner {
    fn default() -> Self {
        Self::new(DEFAULT_WARN_INTERVAL)
    }
}

impl std::fmt::Debug for RateLimitedWarner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedWarner")
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn emits_first_warning_immediately() {
        let warner = RateLimitedWarner::new(Duration::from_secs(5));
        let mut warnings = Vec::new();
        warner.record();
        warner.warn_if_due(|c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
    }

    #[rstest]
    fn rate_limits_subsequent_warnings() {
        let warner = RateLimitedWarner::new(Duration::from_secs(5));
        let start = Instant::now();
        let mut warnings = Vec::new();
        warner.record();
        warner.warn_if_due_at(start, |c| warnings.push(c));
        warner.record();
        warner.record();
        warner.warn_if_due_at(start + Duration::from_secs(1), |c| warnings.push(c));
        assert_eq!(warnings, vec![1]);
        warner.warn_if_due_at(start + Duration::from_secs(5), |c| warnings.push(c));
        assert_eq!(warnings, vec![1, 2]);
    }

    #[rstest]
    fn silent_when_nothing_recorded() {
        let warner = RateLimitedWarner::new(Duration::ZERO);
        let mut warnings = Vec::new();
        warner.warn_if_due(|c| warnings.push(c));
        assert!(warnings.is_empty());
    }
}
