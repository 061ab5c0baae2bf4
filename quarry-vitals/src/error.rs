use quarry_query::QueryError;
use quarry_snql::StorageError;

/// An error reported by a vitals cache backend.
///
/// Cache implementations wrap their transport failures in this opaque type.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CacheError(String);

impl CacheError {
    /// Creates a cache error with the given cause.
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }
}

/// An error computing the vitals overview.
#[derive(Debug, thiserror::Error)]
pub enum VitalsError {
    /// The vitals query could not be compiled.
    #[error("failed to compile vitals query")]
    Query(#[from] QueryError),

    /// The storage service failed to execute a vitals query.
    #[error("vitals query failed in storage")]
    Storage(#[from] StorageError),

    /// The vitals cache backend failed.
    #[error("vitals cache unavailable")]
    Cache(#[from] CacheError),

    /// A query returned a column with no API name.
    #[error("{0:?} is not a recognized vitals column")]
    UnmappedColumn(String),

    /// A per-project row carried no project id.
    #[error("vitals row is missing the project_id column")]
    MissingProjectId,
}
