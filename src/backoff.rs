//! Adaptive spin-then-sleep wait used by both [`crate::wfcq`] and
//! [`crate::wfs`] to ride out a producer's in-flight publication window.

use std::thread;
use std::time::Duration;

/// Spin iterations attempted before falling back to sleeping.
pub const ADAPT_ATTEMPTS: u32 = 10;

/// Sleep duration once spinning has been exhausted.
pub const ADAPT_SLEEP: Duration = Duration::from_millis(10);

/// Tunable backoff parameters. `Default` matches the hard-coded constants
/// above; embedders needing a different spin/sleep balance for their
/// platform can override via [`crate::config::WfdsConfig`] (feature
/// `config`) without forking the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub adapt_attempts: u32,
    pub adapt_sleep: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            adapt_attempts: ADAPT_ATTEMPTS,
            adapt_sleep: ADAPT_SLEEP,
        }
    }
}

/// One adaptive-wait episode: spins for `adapt_attempts` calls to
/// [`AdaptiveWait::step`], then sleeps for `adapt_sleep` and resets.
///
/// Callers re-check their awaited condition between every `step()` call;
/// this type only tracks how long to wait, not what to wait for.
pub(crate) struct AdaptiveWait {
    attempt: u32,
    config: BackoffConfig,
}

impl AdaptiveWait {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        AdaptiveWait { attempt: 0, config }
    }

    pub(crate) fn step(&mut self) {
        self.attempt += 1;
        if self.attempt >= self.config.adapt_attempts {
            tracing::trace!(
                attempts = self.attempt,
                sleep_ms = self.config.adapt_sleep.as_millis() as u64,
                "adaptive wait entering sleep phase"
            );
            thread::sleep(self.config.adapt_sleep);
            self.attempt = 0;
        } else {
            std::hint::spin_loop();
        }
    }
}
