//! Retry with exponential backoff for transient persistence failures.

use crate::config::RetryPolicy;
use crate::Result;
use tracing::warn;

/// Runs `f`, retrying transient failures per the policy.
///
/// Non-transient errors and transient errors that survive all attempts are
/// returned to the caller unchanged.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted.
pub fn execute_with_retry<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let backoff = policy.backoff_for_attempt(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "transient persistence failure, retrying"
                );
                metrics::counter!("topicgraph_persistence_retries_total").increment(1);
                std::thread::sleep(backoff);
                last_err = Some(e);
            },
            Err(e) => return Err(e),
        }
    }

    // Unreachable unless every attempt failed transiently.
    Err(last_err.unwrap_or(crate::Error::Persistence {
        operation: operation.to_string(),
        cause: "retry attempts exhausted".to_string(),
        transient: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            backoff_multiplier: 1.0,
            max_backoff_ms: 1,
        }
    }

    fn transient() -> Error {
        Error::Persistence {
            operation: "commit_run".to_string(),
            cause: "locked".to_string(),
            transient: true,
        }
    }

    #[test]
    fn test_succeeds_first_try() {
        let result = execute_with_retry(&fast_policy(3), "op", || Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_retries_transient_until_success() {
        let mut calls = 0;
        let result = execute_with_retry(&fast_policy(3), "op", || {
            calls += 1;
            if calls < 3 { Err(transient()) } else { Ok("done") }
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausts_attempts() {
        let mut calls = 0;
        let result: Result<()> = execute_with_retry(&fast_policy(3), "op", || {
            calls += 1;
            Err(transient())
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_transient_not_retried() {
        let mut calls = 0;
        let result: Result<()> = execute_with_retry(&fast_policy(3), "op", || {
            calls += 1;
            Err(Error::InvalidInput("bad".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
