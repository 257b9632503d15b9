use std::time::Duration;

use backon::ExponentialBuilder;
use derive_builder::Builder;

use crate::consts::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_MIN_MS, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS,
};

/// Bounds for one inference call: attempt count, per-attempt timeout and
/// exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wall-clock limit for every attempt.
    pub timeout: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Ceiling on the summed backoff sleeps.
    #[builder(setter(strip_option))]
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            min_delay: Duration::from_millis(DEFAULT_BACKOFF_MIN_MS),
            max_delay: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// Backoff between attempts: `min_delay` doubling up to `max_delay`,
    /// `max_retries` times, with the sleeps summing to at most `max_elapsed`.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_total_delay(self.max_elapsed)
    }
}
