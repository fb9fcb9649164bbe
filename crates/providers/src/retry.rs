//! Retry with exponential backoff and jitter.
//!
//! Delay between attempts is
//! `clamp(min_delay * 2^(k-1) * (1 + U(-jitter, +jitter)), min_delay, max_delay)`
//! with `k` the 1-based attempt index.  Cancellation bypasses both the
//! retry decision and the backoff sleep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use ma_domain::error::{Error, Result};
use ma_domain::CancelToken;

/// Tuning knobs for [`retry_async`].
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Relative jitter applied to each delay, e.g. `0.25` for ±25%.
    pub jitter: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.25,
        }
    }
}

/// Compute the backoff delay before attempt `k + 1` (k is 1-based).
fn backoff_delay(opts: &RetryOptions, attempt: u32) -> Duration {
    let base = opts.min_delay.as_millis() as f64 * 2f64.powi(attempt as i32 - 1);
    let jitter = if opts.jitter > 0.0 {
        rand::thread_rng().gen_range(-opts.jitter..=opts.jitter)
    } else {
        0.0
    };
    let ms = (base * (1.0 + jitter))
        .max(opts.min_delay.as_millis() as f64)
        .min(opts.max_delay.as_millis() as f64);
    Duration::from_millis(ms as u64)
}

/// Run `op` up to `opts.attempts` times.
///
/// `should_retry(err, attempt)` can shortcut further attempts; otherwise
/// the last error is returned.  `on_attempt(attempt, delay, err)` reports
/// each scheduled retry for observability.  Cancelled errors are returned
/// immediately, and the backoff sleep races the cancel token.
pub async fn retry_async<T, F, Fut>(
    opts: &RetryOptions,
    cancel: &CancelToken,
    should_retry: impl Fn(&Error, u32) -> bool,
    on_attempt: impl Fn(u32, Duration, &Error),
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = opts.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        cancel.check()?;

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_cancelled() || cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if attempt >= attempts || !should_retry(&err, attempt) {
            return Err(err);
        }

        let delay = backoff_delay(opts, attempt);
        on_attempt(attempt, delay, &err);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }
    }
}
