//! Database query timeout helpers

use std::time::Duration;
use tokio::time::timeout;

use crate::errors::{EngineError, EngineResult};

/// Default timeout for single-row queries
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for transactions
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a query with timeout, folding both failure modes into
/// `EngineError`.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> EngineResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(EngineError::Database(e)),
        Err(_) => Err(EngineError::Timeout(duration)),
    }
}

/// Execute a query with the default timeout
pub async fn with_default_timeout<F, T>(future: F) -> EngineResult<T>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}
