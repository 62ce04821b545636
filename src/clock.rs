// Time source for the control loop: real (tokio) or simulated
use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Monotonic time plus the one blocking operation the loop performs
pub trait Clock {
    /// Time since the clock started
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()>;
}

/// Wall-clock time via tokio
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}

/// Virtual time that jumps forward on sleep
///
/// Clones share the same time, so a test device can hold one and call
/// [`SimClock::advance`] to model a slow tick.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<Duration>>,
    slept: Rc<Cell<Duration>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }

    /// Total time spent in `sleep`
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()> {
        self.advance(duration);
        self.slept.set(self.slept.get() + duration);
        std::future::ready(())
    }
}
