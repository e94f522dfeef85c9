//! Timeout enforcement.
//!
//! Every external call gets a deadline. Timeout errors are distinct from the
//! operation's own errors so callers can record them separately.

use std::future::Future;
use std::time::Duration;

/// Outcome of a call that may have exceeded its deadline.
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
    #[error(transparent)]
    Inner(E),
}

/// Run a fallible future with a deadline.
pub async fn with_timeout<T, E, Fut>(limit: Duration, fut: Fut) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Elapsed(limit)),
    }
}
