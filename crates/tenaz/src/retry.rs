//! Retry policy and backoff scheduling for the outer retry wrapper.
//!
//! [`RetryScheduler::next_delay`] is a pure function of the attempt index
//! and the policy: no clock, no hidden state. The wrapper in the
//! orchestrator owns the sleeping; this module only decides how long.
//!
//! ```text
//! delay(i) = min(initial_delay * multiplier^(i-1), max_delay)
//!
//! EXHAUSTED when i > max_attempts
//!         or delay(1) + ... + delay(i) > max_total_wait
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_ms;
use crate::result::{TenazError, TenazResult};

/// Parameters for the outer retry wrapper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of full resolution passes (at least 1)
    pub max_attempts: u32,
    /// Delay after the first failed pass
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Growth factor per attempt (at least 1.0)
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Upper bound for the whole retry sequence
    #[serde(rename = "max_total_wait_ms", with = "duration_ms")]
    pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(4),
            max_total_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` and defaults for everything else
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// A policy that makes exactly one pass
    #[must_use]
    pub fn single_pass() -> Self {
        Self::new(1)
    }

    /// Set the initial delay
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the backoff multiplier
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the maximum single delay
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the maximum total wait
    #[must_use]
    pub const fn with_max_total_wait(mut self, wait: Duration) -> Self {
        self.max_total_wait = wait;
        self
    }

    /// Whether the policy permits more than one pass
    #[must_use]
    pub const fn allows_retry(&self) -> bool {
        self.max_attempts > 1
    }

    /// Check the policy invariants
    ///
    /// # Errors
    ///
    /// Returns error if `max_attempts < 1`, `initial_delay` is zero, the
    /// multiplier is below 1.0 or not finite, or
    /// `initial_delay <= max_delay <= max_total_wait` does not hold.
    pub fn validate(&self) -> TenazResult<()> {
        let fail = |message: &str| {
            Err(TenazError::InvalidPolicy {
                message: message.to_string(),
            })
        };
        if self.max_attempts < 1 {
            return fail("max_attempts must be at least 1");
        }
        if self.initial_delay.is_zero() {
            return fail("initial_delay must be greater than zero");
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return fail("backoff_multiplier must be a finite value >= 1.0");
        }
        if self.initial_delay > self.max_delay {
            return fail("initial_delay must not exceed max_delay");
        }
        if self.max_delay > self.max_total_wait {
            return fail("max_delay must not exceed max_total_wait");
        }
        Ok(())
    }
}

/// Scheduler decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait this long, then try again
    Wait(Duration),
    /// The retry budget is spent
    Exhausted,
}

impl Backoff {
    /// The wait duration, if any
    #[must_use]
    pub const fn delay(&self) -> Option<Duration> {
        match self {
            Self::Wait(d) => Some(*d),
            Self::Exhausted => None,
        }
    }
}

/// Pure backoff policy evaluation
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler;

impl RetryScheduler {
    /// The uncapped-by-budget delay for attempt `attempt_index` (1-based)
    #[must_use]
    pub fn raw_delay(attempt_index: u32, policy: &RetryPolicy) -> Duration {
        let exponent = attempt_index.saturating_sub(1);
        let factor = policy
            .backoff_multiplier
            .powi(i32::try_from(exponent).unwrap_or(i32::MAX));
        let scaled = policy.initial_delay.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= policy.max_delay.as_secs_f64() {
            return policy.max_delay;
        }
        Duration::from_secs_f64(scaled).min(policy.max_delay)
    }

    /// Sum of the delays for attempts `1..=attempt_index`
    #[must_use]
    pub fn cumulative_wait(attempt_index: u32, policy: &RetryPolicy) -> Duration {
        let mut total = Duration::ZERO;
        for i in 1..=attempt_index {
            total = total.saturating_add(Self::raw_delay(i, policy));
            if total > policy.max_total_wait {
                break;
            }
        }
        total
    }

    /// Delay to wait after failed attempt `attempt_index` (1-based).
    ///
    /// Returns [`Backoff::Exhausted`] when the index is past
    /// `max_attempts` or the cumulative wait would exceed `max_total_wait`.
    #[must_use]
    pub fn next_delay(attempt_index: u32, policy: &RetryPolicy) -> Backoff {
        if attempt_index == 0 || attempt_index > policy.max_attempts {
            return Backoff::Exhausted;
        }
        if Self::cumulative_wait(attempt_index, policy) > policy.max_total_wait {
            return Backoff::Exhausted;
        }
        Backoff::Wait(Self::raw_delay(attempt_index, policy))
    }

    /// Every delay the policy will hand out, in order
    #[must_use]
    pub fn schedule(policy: &RetryPolicy) -> Vec<Duration> {
        (1..=policy.max_attempts)
            .map_while(|i| Self::next_delay(i, policy).delay())
            .collect()
    }
}
