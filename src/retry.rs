use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::warn;

const SLEEP_SLICE: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(64);

/// Shared stop signal with an optional wall-clock deadline.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .deadline
                .map(|deadline| Instant::now() >= deadline)
                .unwrap_or(false)
    }
}

pub trait Sleeper {
    /// Blocks for `duration`, returning early once `cancel` fires.
    fn sleep(&self, duration: Duration, cancel: &CancellationToken);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) {
        let started = Instant::now();
        while !cancel.is_cancelled() {
            let remaining = duration.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Ready(T),
    NotYet(E),
    Failed(E),
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Ready { value: T, attempts: u32 },
    Failed { error: E, attempts: u32 },
    Exhausted { last_error: Option<E>, attempts: u32 },
    Cancelled { attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. }
            | Self::Failed { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: DEFAULT_MAX_DELAY.max(base_delay),
        }
    }

    /// `base_delay * 2^attempt_index`, capped at `max_delay`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt_index);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs `op` until it is ready, fails permanently, the attempt cap is
    /// reached, or `cancel` fires. Backoff is applied only between attempts.
    pub fn run<T, E, F>(
        &self,
        operation: &str,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
        mut op: F,
    ) -> RetryOutcome<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Attempt<T, E>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled { attempts: attempt };
            }

            match op(attempt) {
                Attempt::Ready(value) => {
                    return RetryOutcome::Ready {
                        value,
                        attempts: attempt + 1,
                    };
                }
                Attempt::Failed(error) => {
                    return RetryOutcome::Failed {
                        error,
                        attempts: attempt + 1,
                    };
                }
                Attempt::NotYet(error) => {
                    if attempt + 1 < self.max_attempts {
                        let delay = self.delay_for(attempt);
                        warn!(
                            operation,
                            attempt = attempt + 1,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "retrying after error"
                        );
                        sleeper.sleep(delay, cancel);
                    }
                    last_error = Some(error);
                }
            }
        }

        RetryOutcome::Exhausted {
            last_error,
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::*;

    /// Records requested sleeps instead of blocking.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub sleeps: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration, _cancel: &CancellationToken) {
            self.sleeps.borrow_mut().push(duration);
        }
    }
}
