use std::thread;
use std::time::Duration;

/// Bounded retry with linear backoff: attempt `n` that fails waits `step × n`
/// before attempt `n + 1`. No wait after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_step: Duration,
}

/// All attempts failed; carries the error from the last one.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl RetryPolicy {
    pub fn linear(attempts: u32, backoff_step: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_step,
        }
    }

    /// Delay after failed attempt `attempt` (1-based). Saturates instead of
    /// overflowing.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds or the attempts are used up. `op` receives the
    /// 1-based attempt number. Sleeping happens between calls, never inside `op`.
    pub fn run<T, E>(&self, mut op: impl FnMut(u32) -> Result<T, E>) -> Result<T, RetryExhausted<E>> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.attempts => {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last: err,
                    })
                }
                Err(_) => {
                    let delay = self.backoff(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_millis(10))
    }
}
