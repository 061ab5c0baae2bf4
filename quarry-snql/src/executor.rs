use async_trait::async_trait;

use crate::{CompiledQuery, QueryResult};

/// An error returned by the storage service.
///
/// Storage failures are never retried by the query engine. They propagate to
/// the caller, which may retry the whole operation at its own discretion.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The query did not complete within the storage service's deadline.
    #[error("query timed out in storage")]
    Timeout,

    /// The storage service could not be reached.
    #[error("storage service unavailable")]
    Unavailable,

    /// Any other failure reported by the storage service.
    #[error("storage query failed: {0}")]
    Other(String),
}

/// Executes compiled queries against the metrics store.
///
/// This is the seam between query compilation and the storage service.
/// Implementations submit the query over their transport of choice and
/// return the flat result rows.
#[async_trait]
pub trait StorageExecutor: Send + Sync {
    /// Runs a compiled query and returns its result rows.
    ///
    /// The `referrer` identifies the calling feature for attribution and
    /// rate accounting in the storage service.
    async fn execute(
        &self,
        query: &CompiledQuery,
        referrer: &str,
    ) -> Result<QueryResult, StorageError>;
}
