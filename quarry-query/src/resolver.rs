use quarry_base_schema::metrics::MetricUnit;
use quarry_base_schema::organization::OrganizationId;

/// Resolves strings to their numeric index in the metrics store.
///
/// The store addresses metric names and tag strings through org-scoped
/// integer indexes. Lookups are synchronous reads, typically against a local
/// cache of the indexer service.
pub trait MetricIndexer: Send + Sync {
    /// Returns the index for the given string.
    ///
    /// Returns `None` if the string has never been recorded for this
    /// organization. For tag values this is not an error, it means no stored
    /// row can possibly match.
    fn resolve(&self, organization: OrganizationId, value: &str) -> Option<i64>;
}

/// A tag value in the form the storage backend compares it.
///
/// Depending on the store generation, tag values are either indexed integers
/// or raw strings. The per-query flag
/// [`tag_values_are_strings`](crate::QueryParams::tag_values_are_strings)
/// selects the mode.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum TagValue {
    /// An indexed tag value.
    Indexed(i64),
    /// A raw string tag value.
    Raw(String),
}

impl From<TagValue> for quarry_snql::Expr {
    fn from(value: TagValue) -> Self {
        match value {
            TagValue::Indexed(index) => Self::from(index),
            TagValue::Raw(string) => Self::from(string),
        }
    }
}

/// Converts a weakly resolved tag value into an expression.
///
/// Unresolved values become the null literal, which no stored row compares
/// equal to.
pub(crate) fn tag_value_or_null(value: Option<TagValue>) -> quarry_snql::Expr {
    match value {
        Some(value) => value.into(),
        None => quarry_snql::Expr::Literal(quarry_snql::Literal::Null),
    }
}

/// A caller-supplied descriptor for an organization's custom measurement.
///
/// Custom measurements have no static name mapping. The caller looks them up
/// in its metadata store and passes the descriptors into the query.
#[derive(Clone, Debug, PartialEq)]
pub struct CustomMeasurement {
    /// The public field name, such as `measurements.custom.click_count`.
    pub name: String,
    /// The metric index, if the measurement has been recorded.
    pub metric_id: Option<i64>,
    /// The unit the measurement is recorded in.
    pub unit: MetricUnit,
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// A deterministic in-memory indexer for tests.
    #[derive(Debug, Default)]
    pub struct TestIndexer {
        entries: BTreeMap<String, i64>,
        lookups: AtomicUsize,
    }

    impl TestIndexer {
        /// Creates an indexer over the given string to index pairs.
        pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
            Self {
                entries: entries
                    .into_iter()
                    .map(|(name, index)| (name.to_owned(), index))
                    .collect(),
                lookups: AtomicUsize::new(0),
            }
        }

        /// Returns the number of lookups performed.
        pub fn lookups(&self) -> usize {
            self.lookups.load(Ordering::Relaxed)
        }
    }

    impl MetricIndexer for TestIndexer {
        fn resolve(&self, _organization: OrganizationId, value: &str) -> Option<i64> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.entries.get(value).copied()
        }
    }

    /// An indexer that panics on any lookup.
    #[derive(Debug, Default)]
    pub struct PanickingIndexer;

    impl MetricIndexer for PanickingIndexer {
        fn resolve(&self, _organization: OrganizationId, value: &str) -> Option<i64> {
            panic!("unexpected indexer lookup for {value:?}");
        }
    }
}
