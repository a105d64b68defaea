//! Deadline wrapper for calls into storage and the payment processor.

use std::{future::Future, time::Duration};

use crate::{Error, Result, error::BoxError};

/// Default bound on a single upstream call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `call` for at most `limit`. A backend error is boxed through `wrap`;
/// expiry becomes [`Error::UpstreamTimeout`]. Nothing is retried: a booking
/// insert must not be replayed blindly.
pub async fn bounded<T, E, F>(
  limit: Duration,
  wrap: fn(BoxError) -> Error,
  call: F,
) -> Result<T>
where
  F: Future<Output = Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  match tokio::time::timeout(limit, call).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => Err(wrap(Box::new(e))),
    Err(_) => {
      tracing::warn!(?limit, "upstream call timed out");
      Err(Error::UpstreamTimeout)
    }
  }
}

/// [`bounded`] for store calls.
pub async fn storage<T, E, F>(limit: Duration, call: F) -> Result<T>
where
  F: Future<Output = Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  bounded(limit, Error::Storage, call).await
}
