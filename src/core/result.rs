//! Result type utilities shared across the services
//!
//! Provides the [`AppResult`] alias plus the timeout and retry helpers used
//! at every RPC suspension point.

use crate::core::error::AppError;

/// Application result type alias
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Utility functions for working with results
pub mod utils {
    use super::*;
    use std::future::Future;
    use tokio::time::{timeout, Duration};

    /// Execute a future with a timeout, converting elapse into `AppError::Timeout`
    pub async fn with_timeout<F, T>(
        duration: Duration,
        operation: &str,
        future: F,
    ) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match timeout(duration, future).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(
                format!("operation '{}' timed out", operation),
                operation.to_string(),
                duration.as_millis() as u64,
            )),
        }
    }

    /// Retry a transient operation with exponential backoff.
    ///
    /// Non-retryable errors return immediately; retryable ones are retried up
    /// to `max_retries` times with doubling delay.
    pub async fn retry_with_backoff<F, Fut, T>(
        mut operation: F,
        max_retries: u32,
        initial_delay: Duration,
        operation_name: &str,
    ) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !error.is_retryable() || attempt == max_retries {
                        return Err(error);
                    }

                    let delay = initial_delay * 2_u32.pow(attempt);
                    tracing::warn!(
                        "operation '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        operation_name,
                        attempt + 1,
                        max_retries + 1,
                        delay,
                        error
                    );

                    tokio::time::sleep(delay).await;
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::internal(format!("retry '{}' failed", operation_name))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test]
    async fn test_timeout_utility() {
        let slow_operation = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<(), AppError>(())
        };
        let result =
            utils::with_timeout(Duration::from_millis(20), "test_operation", slow_operation).await;

        assert!(matches!(result.unwrap_err(), AppError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let mut attempt_count = 0;
        let operation = || {
            attempt_count += 1;
            let failing = attempt_count < 3;
            async move {
                if failing {
                    Err(AppError::network("temporary failure"))
                } else {
                    Ok("success")
                }
            }
        };

        let result =
            utils::retry_with_backoff(operation, 3, Duration::from_millis(1), "test_retry").await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_permanent_errors() {
        let mut attempt_count = 0;
        let operation = || {
            attempt_count += 1;
            async { Err::<(), _>(AppError::not_found("no wallet")) }
        };

        let result =
            utils::retry_with_backoff(operation, 3, Duration::from_millis(1), "test_retry").await;

        assert!(result.is_err());
        assert_eq!(attempt_count, 1);
    }
}
