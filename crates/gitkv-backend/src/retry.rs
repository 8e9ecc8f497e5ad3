//! The write retry loop: exponential backoff, terminal short-circuit.

use std::time::Duration;

use crate::context::OpContext;
use crate::error::ApiError;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Run `op` until it succeeds, fails terminally, or the context ends.
///
/// Retries are unbounded; the caller's deadline is the cap. The closure
/// receives the current retry count. On success the total number of
/// failed attempts is returned alongside the value; terminal errors
/// carry it in the error's receipt.
pub fn run_with_retry<T>(
    ctx: &OpContext,
    policy: &BackoffPolicy,
    mut op: impl FnMut(u32) -> Result<T, ApiError>,
) -> Result<(T, u32), ApiError> {
    let mut retries: u32 = 0;
    let mut delay = policy.initial;

    loop {
        if let Err(e) = ctx.check() {
            return Err(e.with_retries(retries));
        }

        match op(retries) {
            Ok(value) => return Ok((value, retries)),
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    kind = ?e.kind(),
                    retries,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                retries += 1;
                if let Err(canceled) = ctx.sleep(delay) {
                    return Err(canceled.with_retries(retries));
                }
                delay = policy.next(delay);
            }
            Err(e) => return Err(e.with_retries(retries)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }
    }

    #[test]
    fn succeeds_first_try() {
        let ctx = OpContext::background();
        let (value, retries) =
            run_with_retry(&ctx, &fast_policy(), |_| Ok::<_, ApiError>(42)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(retries, 0);
    }

    #[test]
    fn retries_transient_failures() {
        let ctx = OpContext::background();
        let (value, retries) = run_with_retry(&ctx, &fast_policy(), |attempt| {
            if attempt < 2 {
                Err(ApiError::new(ErrorKind::RefNotCurrent))
            } else {
                Ok("landed")
            }
        })
        .unwrap();
        assert_eq!(value, "landed");
        assert_eq!(retries, 2);
    }

    #[test]
    fn terminal_error_short_circuits() {
        let ctx = OpContext::background();
        let mut calls = 0;
        let err = run_with_retry(&ctx, &fast_policy(), |_| {
            calls += 1;
            Err::<(), _>(ApiError::new(ErrorKind::Conflict))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(calls, 1);
        assert_eq!(err.retries(), 0);
    }

    #[test]
    fn terminal_after_retries_reports_count() {
        let ctx = OpContext::background();
        let err = run_with_retry(&ctx, &fast_policy(), |attempt| {
            if attempt < 2 {
                Err::<(), _>(ApiError::new(ErrorKind::Transport))
            } else {
                Err(ApiError::new(ErrorKind::NotFound))
            }
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.retries(), 2);
    }

    #[test]
    fn deadline_caps_retries() {
        let ctx = OpContext::with_timeout(Duration::from_millis(30));
        let err = run_with_retry(&ctx, &fast_policy(), |_| {
            Err::<(), _>(ApiError::new(ErrorKind::RefNotCurrent))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
    }

    #[test]
    fn canceled_before_first_attempt() {
        let ctx = OpContext::background();
        ctx.cancel();
        let mut calls = 0;
        let err = run_with_retry(&ctx, &fast_policy(), |_| {
            calls += 1;
            Ok::<_, ApiError>(())
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
        assert_eq!(calls, 0);
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let policy = BackoffPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        };
        let mut d = policy.initial;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(d);
            d = policy.next(d);
        }
        assert_eq!(seen[1], Duration::from_secs(1));
        assert_eq!(seen[6], Duration::from_secs(30));
        assert_eq!(seen[7], Duration::from_secs(30));
    }
}
