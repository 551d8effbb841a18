//! Bounded polling.
//!
//! [`Poller`] is the single place where the engine suspends while waiting
//! for the view to change. It probes immediately, then sleeps for the poll
//! interval between probes, always probing once more exactly at the
//! deadline. Cancellation is checked between probes, never during one.

use std::time::Duration;

use crate::clock::{CancellationToken, Clock};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default polling interval for structural resolution (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default per-locator timeout (5 seconds)
pub const DEFAULT_LOCATOR_TIMEOUT_MS: u64 = 5_000;

/// Default interval between the two bounding-box stability samples (50ms)
pub const DEFAULT_STABILITY_INTERVAL_MS: u64 = 50;

// =============================================================================
// POLLING
// =============================================================================

/// Result of a single probe
#[derive(Debug, Clone, PartialEq)]
pub enum WaitStep<T, P> {
    /// Stop polling with a final value
    Done(T),
    /// Not there yet; keep the observation in case the deadline hits
    Pending(P),
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<T, P> {
    /// A probe produced a final value
    Done {
        /// The final value
        value: T,
        /// Number of probes issued
        polls: u32,
    },
    /// The deadline elapsed
    TimedOut {
        /// Observation from the last probe
        last: P,
        /// Number of probes issued
        polls: u32,
    },
    /// The cancellation token fired between probes
    Cancelled {
        /// Observation from the last probe
        last: P,
        /// Number of probes issued
        polls: u32,
    },
}

impl<T, P> WaitOutcome<T, P> {
    /// Number of probes issued
    #[must_use]
    pub const fn polls(&self) -> u32 {
        match self {
            Self::Done { polls, .. } | Self::TimedOut { polls, .. } | Self::Cancelled { polls, .. } => {
                *polls
            }
        }
    }
}

/// Polls a probe until it finishes, the deadline passes, or cancellation fires
#[derive(Debug, Clone, Copy)]
pub struct Poller<'a> {
    clock: &'a dyn Clock,
    interval: Duration,
    timeout: Duration,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> Poller<'a> {
    /// Create a poller
    #[must_use]
    pub fn new(clock: &'a dyn Clock, interval: Duration, timeout: Duration) -> Self {
        Self {
            clock,
            interval,
            timeout,
            cancel: None,
        }
    }

    /// Attach a cancellation token
    #[must_use]
    pub const fn with_cancel(mut self, cancel: Option<&'a CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configured timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the probe until it returns [`WaitStep::Done`] or time runs out.
    ///
    /// The probe always runs at least once, even with a zero timeout.
    pub fn run<T, P>(&self, mut probe: impl FnMut() -> WaitStep<T, P>) -> WaitOutcome<T, P> {
        let start = self.clock.now();
        let mut polls = 0u32;
        // A zero interval would spin forever under a fake clock.
        let interval = self.interval.max(Duration::from_millis(1));

        loop {
            polls += 1;
            let last = match probe() {
                WaitStep::Done(value) => return WaitOutcome::Done { value, polls },
                WaitStep::Pending(observation) => observation,
            };

            if self.cancel.is_some_and(CancellationToken::is_cancelled) {
                return WaitOutcome::Cancelled { last, polls };
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if elapsed >= self.timeout {
                return WaitOutcome::TimedOut { last, polls };
            }
            self.clock.sleep(interval.min(self.timeout - elapsed));
        }
    }
}
