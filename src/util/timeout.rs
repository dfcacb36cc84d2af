//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::CrmError;

/// Marker produced when a wrapped future outlives its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut(pub Duration);

impl From<TimedOut> for CrmError {
    fn from(timed_out: TimedOut) -> Self {
        CrmError::Timeout(timed_out.0.as_millis() as u64)
    }
}

/// Wrap a future with a timeout.
pub async fn with_timeout<T, E>(
    duration: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
    E: From<TimedOut>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TimedOut(duration).into()),
    }
}
