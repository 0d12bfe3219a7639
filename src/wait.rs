//! Bounded waiting: condition polling and retry with exponential backoff.
//!
//! Two primitives live here:
//! - [`PollPolicy`] + [`poll_until`] replace fixed sleeps with "check, back off,
//!   check again" loops bounded by a deadline (page settle, form appearance,
//!   download stability).
//! - [`RetryPolicy`] decides whether a failed operation (a listing page that the
//!   renderer could not load) should be attempted again, and after how long.
//!
//! # Example
//!
//! ```
//! use harvester_core::wait::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(FailureType::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

/// Default maximum attempts for a listing page.
pub const DEFAULT_PAGE_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (16 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(16);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to retry delays (250ms).
const MAX_JITTER: Duration = Duration::from_millis(250);

/// First interval between two polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for the interval between two polls.
const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Classification of a failure for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry (renderer hiccup, timeout).
    Transient,

    /// Failure that won't succeed regardless of retries (bad input).
    Permanent,
}

/// Decision on whether to retry a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PAGE_RETRY_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` includes the initial attempt and is clamped to at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt) + jitter();
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff delay without jitter.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = f64::from(self.backoff_multiplier).powi(exponent);
        let scaled = self.base_delay.as_secs_f64() * factor;
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

fn jitter() -> Duration {
    let max_ms = u64::try_from(MAX_JITTER.as_millis()).unwrap_or(0);
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Deadline and backoff for polling a readiness condition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    timeout: Duration,
    initial_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
}

impl PollPolicy {
    /// Polls for up to `timeout`, starting at 100ms between checks and doubling up to 2s.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_interval: DEFAULT_POLL_INTERVAL,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            multiplier: 2.0,
        }
    }

    /// Overrides the interval bounds. `initial` is clamped to be at most `max`.
    #[must_use]
    pub fn with_intervals(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial.min(max);
        self.max_interval = max;
        self
    }

    /// Total time budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

/// Polls `probe` until it yields `Some`, the deadline passes, or it errors.
///
/// The probe always runs at least once, even with a zero timeout. `Ok(None)`
/// means the deadline passed without the condition holding.
///
/// # Errors
///
/// Returns the first error produced by `probe`.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut interval = policy.initial_interval;
    let mut polls = 0u32;

    loop {
        polls += 1;
        if let Some(value) = probe().await? {
            trace!(polls, "condition met");
            return Ok(Some(value));
        }

        let now = Instant::now();
        if now >= deadline {
            trace!(polls, "condition not met before deadline");
            return Ok(None);
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = policy.next_interval(interval);
    }
}
