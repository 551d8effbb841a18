//! Time sources and cancellation for deterministic waiting.
//!
//! Every suspension point in the engine (structural polling, stability
//! sampling, backoff between outer attempts) goes through a [`Clock`].
//! Production code uses [`SystemClock`]; tests use [`FakeClock`], whose
//! `sleep` advances virtual time instantly so multi-second scenarios run
//! in microseconds and always produce the same schedule.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Suspend the calling thread of control for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual clock for deterministic tests.
///
/// Time only moves when someone sleeps or calls [`FakeClock::advance`].
/// Cloning shares the underlying time.
#[derive(Debug, Clone, Default)]
pub struct FakeClock {
    /// Current virtual time in nanoseconds
    now_ns: Arc<AtomicU64>,
    /// Total time spent inside `sleep`, in nanoseconds
    slept_ns: Arc<AtomicU64>,
    /// Number of `sleep` calls
    sleeps: Arc<AtomicU64>,
}

impl FakeClock {
    /// Create a fake clock at time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without counting it as a sleep
    pub fn advance(&self, duration: Duration) {
        self.now_ns
            .fetch_add(duration_to_ns(duration), Ordering::SeqCst);
    }

    /// Total virtual time spent sleeping
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        Duration::from_nanos(self.slept_ns.load(Ordering::SeqCst))
    }

    /// Number of sleep calls observed
    #[must_use]
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        let ns = duration_to_ns(duration);
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.slept_ns.fetch_add(ns, Ordering::SeqCst);
        self.now_ns.fetch_add(ns, Ordering::SeqCst);
    }
}

fn duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Cooperative cancellation signal.
///
/// Checked between polling iterations and at outer attempt boundaries,
/// never in the middle of an action. Cloning shares the signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not fired
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the token has fired
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
