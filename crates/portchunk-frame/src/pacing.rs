//! Cooperative pacing between frames.
//!
//! Chunking a very large payload can take a long time. Between frames the
//! encoder checks how long it has run since it last gave up control, and once
//! that passes [`FRAME_BUDGET`] it calls a [`YieldPoint`] before continuing.
//! There is no parallelism here, only voluntary suspension points.

use std::time::{Duration, Instant};

/// Half of one 60 fps animation frame.
pub const FRAME_BUDGET: Duration = Duration::from_micros(1_000_000 / 60 / 2);

/// A place where the encoder hands control back to its scheduler.
pub trait YieldPoint {
    /// Give other work a chance to run.
    fn yield_now(&mut self);
}

/// Yields the current OS thread's time slice.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl YieldPoint for ThreadYield {
    fn yield_now(&mut self) {
        std::thread::yield_now();
    }
}

/// Sleeps for a minimal delay.
///
/// Fallback for schedulers where a bare yield does not let other work run.
#[derive(Debug, Clone, Copy)]
pub struct SleepYield(pub Duration);

impl Default for SleepYield {
    fn default() -> Self {
        Self(Duration::from_millis(1))
    }
}

impl YieldPoint for SleepYield {
    fn yield_now(&mut self) {
        std::thread::sleep(self.0);
    }
}

/// Never yields. For encoders running on a dedicated worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoYield;

impl YieldPoint for NoYield {
    fn yield_now(&mut self) {}
}

impl<Y: YieldPoint + ?Sized> YieldPoint for &mut Y {
    fn yield_now(&mut self) {
        (**self).yield_now();
    }
}

impl<Y: YieldPoint + ?Sized> YieldPoint for Box<Y> {
    fn yield_now(&mut self) {
        (**self).yield_now();
    }
}

/// Tracks time since the last yield.
#[derive(Debug, Clone)]
pub struct Pacer {
    budget: Duration,
    last_yield: Instant,
}

impl Pacer {
    /// Start a pacer whose clock begins now.
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            last_yield: Instant::now(),
        }
    }

    /// The configured budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Whether the budget has been used up since the last yield.
    pub fn is_due(&self) -> bool {
        self.last_yield.elapsed() >= self.budget
    }

    /// Restart the clock after a yield.
    pub fn reset(&mut self) {
        self.last_yield = Instant::now();
    }

    /// Yield through `point` if the budget is used up. Returns whether it yielded.
    pub fn maybe_yield<Y: YieldPoint + ?Sized>(&mut self, point: &mut Y) -> bool {
        if !self.is_due() {
            return false;
        }
        point.yield_now();
        self.reset();
        true
    }

    /// Async counterpart of [`maybe_yield`](Self::maybe_yield), suspending
    /// the current tokio task.
    #[cfg(feature = "async")]
    pub async fn maybe_yield_async(&mut self) -> bool {
        if !self.is_due() {
            return false;
        }
        tokio::task::yield_now().await;
        self.reset();
        true
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(FRAME_BUDGET)
    }
}
