//! Bounded retry with backoff for remote calls.

use std::future::Future;
use std::time::Duration;

/// Attempts used for storage calls unless a caller says otherwise.
pub const DEFAULT_ATTEMPTS: u32 = 3;

const BASE_DELAY_MS: u64 = 500;

/// Is this error a known transient error?
///
/// Errors are assumed permanent until they've been observed in the wild,
/// investigated and determined to be transient. That keeps exponential
/// backoff away from errors that will never resolve.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

impl IsKnownTransient for reqwest::Error {
    fn is_known_transient(&self) -> bool {
        if let Some(status) = self.status() {
            status.is_known_transient()
        } else {
            // Timeouts, connection resets and friends. reqwest doesn't
            // expose enough detail to pick out the permanent ones.
            true
        }
    }
}

impl IsKnownTransient for reqwest::StatusCode {
    fn is_known_transient(&self) -> bool {
        let transient_failures = [
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            reqwest::StatusCode::BAD_GATEWAY,
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            reqwest::StatusCode::GATEWAY_TIMEOUT,
        ];
        transient_failures.contains(self)
    }
}

/// Runs `op` up to `attempts` times, sleeping with exponential backoff
/// between tries. Only transient errors are retried; the final error is
/// returned as-is. Retries cover a single remote call, never a whole pass.
pub async fn with_backoff<T, E, F, Fut>(op_name: &str, attempts: u32, mut op: F) -> Result<T, E>
where
    E: IsKnownTransient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && e.is_known_transient() => {
                let delay = Duration::from_millis(BASE_DELAY_MS << (attempt - 1));
                tracing::warn!(
                    operation = op_name,
                    attempt,
                    "Transient error, retrying in {:?}: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
