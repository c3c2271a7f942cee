//! Bounded retry with a fixed backoff

use std::time::Duration;

/// Blocking wait, replaceable in tests
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Retry budget: at most `max_attempts` attempts, `backoff` after each one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedRetry {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Every attempt ran and the condition never settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
}

impl BoundedRetry {
    pub const fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `attempt` on `target`, wait out the backoff, then ask `settled`;
    /// repeat until it reports true or the budget is spent.
    ///
    /// Returns the number of attempts it took.
    pub fn run<T: ?Sized>(
        &self,
        sleeper: &dyn Sleeper,
        target: &mut T,
        mut attempt: impl FnMut(&mut T, u32),
        mut settled: impl FnMut(&mut T) -> bool,
    ) -> Result<u32, RetryExhausted> {
        for n in 1..=self.max_attempts {
            attempt(target, n);
            sleeper.sleep(self.backoff);
            if settled(target) {
                return Ok(n);
            }
        }
        Err(RetryExhausted {
            attempts: self.max_attempts,
        })
    }
}
