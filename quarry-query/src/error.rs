use crate::constants::MAX_QUERYABLE_TRANSACTION_THRESHOLDS;

/// An error compiling a user query into a storage query.
///
/// All variants describe a rejected query. They are never retried and map to
/// client errors at the boundary that received the query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The referenced metric has no mapping in the metrics store.
    #[error("metric {0:?} could not be resolved")]
    UnresolvableMetric(String),

    /// The requested aggregate function is not registered.
    #[error("{0:?} is not a supported metrics function")]
    UnknownFunction(String),

    /// A required function argument was not supplied.
    #[error("missing required argument {argument:?} to {function}")]
    MissingArgument {
        /// The name of the called function.
        function: String,
        /// The name of the missing argument.
        argument: &'static str,
    },

    /// A numeric function argument is outside its declared range.
    #[error("argument {argument:?} out of range: {reason}")]
    ArgumentOutOfRange {
        /// The name of the invalid argument.
        argument: &'static str,
        /// Which bound was violated.
        reason: String,
    },

    /// The requested combination cannot be computed from precomputed metrics.
    ///
    /// The cause is surfaced verbatim to the caller.
    #[error("{0}")]
    IncompatibleMetricsQuery(String),

    /// The threshold configuration fan-out exceeds the query ceiling.
    #[error(
        "exceeded {MAX_QUERYABLE_TRANSACTION_THRESHOLDS} configured transaction thresholds limit, \
         try with fewer projects"
    )]
    TooManyThresholds,

    /// The search filter is structurally invalid for any dataset.
    #[error("{0}")]
    InvalidSearchQuery(String),
}

impl QueryError {
    /// Creates an [`IncompatibleMetricsQuery`](Self::IncompatibleMetricsQuery)
    /// error with the given cause.
    pub fn incompatible(cause: impl Into<String>) -> Self {
        Self::IncompatibleMetricsQuery(cause.into())
    }

    /// Creates an [`InvalidSearchQuery`](Self::InvalidSearchQuery) error with
    /// the given cause.
    pub fn invalid_search(cause: impl Into<String>) -> Self {
        Self::InvalidSearchQuery(cause.into())
    }
}
