use std::{thread::sleep, time::Duration};

/// Upper bound on attempts for a request/response exchange, plus an optional pause between them
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 2000,
            backoff: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Option<Duration>) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Call `f` with the 1-based attempt number until it yields `Some`, or the bound is reached.
    ///
    /// Errors from `f` are returned immediately and are not retried.
    /// On exhaustion, returns `Ok(Err(attempts))` so the caller can build its own timeout error.
    pub fn run<T, E>(
        &self,
        mut f: impl FnMut(u32) -> Result<Option<T>, E>,
    ) -> Result<Result<T, u32>, E> {
        for attempt in 1..=self.max_attempts {
            if let Some(out) = f(attempt)? {
                return Ok(Ok(out));
            }

            if let Some(backoff) = self.backoff {
                if attempt < self.max_attempts {
                    sleep(backoff);
                }
            }
        }

        Ok(Err(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_first_success() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let out: Result<Result<u32, u32>, ()> = policy.run(|attempt| {
            calls += 1;
            Ok((attempt == 3).then(|| attempt))
        });
        assert_eq!(out, Ok(Ok(3)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_exactly_max_attempts() {
        let policy = RetryPolicy::new(7, None);
        let mut calls = 0;
        let out: Result<Result<(), u32>, ()> = policy.run(|_| {
            calls += 1;
            Ok(None)
        });
        assert_eq!(out, Ok(Err(7)));
        assert_eq!(calls, 7);
    }

    #[test]
    fn errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let out: Result<Result<(), u32>, &str> = policy.run(|_| {
            calls += 1;
            Err("gone")
        });
        assert_eq!(out, Err("gone"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, None).max_attempts, 1);
    }
}
