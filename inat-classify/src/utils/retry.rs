//! Retry for transient transport failures
//!
//! Implements exponential backoff for network errors, throttling and gateway
//! errors. Every other failure is returned on the first attempt.

use crate::config::RetryPolicy;
use crate::error::ClassifyError;
use std::future::Future;
use std::time::Instant;

/// Retry an operation while it fails transiently.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is transient (status 0, 429, 502, 503, 504):
///    a. If attempts remain: log WARN, back off, retry
///    b. Otherwise: log ERROR, return the last error
/// 4. If other error: return it immediately (no retry)
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "upload", "taxonomy lookup")
/// * `policy` - Attempt limit and backoff schedule
/// * `operation` - Async closure performing one attempt
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ClassifyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClassifyError>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying request");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Request succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Giving up after transient failures"
                    );
                    return Err(err);
                }

                let backoff = policy.backoff_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
