use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use quarry_base_schema::metrics::{MetricType, MetricUnit};
use quarry_base_schema::organization::OrganizationId;
use quarry_base_schema::project::ProjectId;
use serde::Serialize;

use crate::{Condition, Expr};

/// The storage entity addressed by a compiled query.
///
/// The metrics store keeps one entity per metric type, and a query runs
/// against exactly one of them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EntityKey {
    /// Counter metrics, aggregated by addition.
    MetricsCounters,
    /// Distribution metrics, queried through quantile sketches.
    MetricsDistributions,
    /// Set metrics, queried through uniqueness aggregates.
    MetricsSets,
}

impl EntityKey {
    /// Returns the name of the storage entity.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKey::MetricsCounters => "metrics_counters",
            EntityKey::MetricsDistributions => "metrics_distributions",
            EntityKey::MetricsSets => "metrics_sets",
        }
    }
}

impl From<MetricType> for EntityKey {
    fn from(ty: MetricType) -> Self {
        match ty {
            MetricType::Counter => EntityKey::MetricsCounters,
            MetricType::Distribution => EntityKey::MetricsDistributions,
            MetricType::Set => EntityKey::MetricsSets,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

quarry_base_schema::impl_str_ser!(EntityKey);

/// The semantic type of an aggregate result column.
///
/// Result types drive unit formatting in consumers of the query results. They
/// are inferred per selected alias during compilation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResultType {
    /// A duration in milliseconds.
    Duration,
    /// A whole number, such as a count.
    Integer,
    /// An arbitrary floating point number.
    Number,
    /// A ratio to be formatted as a percentage.
    Percentage,
    /// A value measured in the given unit.
    Unit(MetricUnit),
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::Duration => f.write_str("duration"),
            ResultType::Integer => f.write_str("integer"),
            ResultType::Number => f.write_str("number"),
            ResultType::Percentage => f.write_str("percentage"),
            ResultType::Unit(unit) => unit.fmt(f),
        }
    }
}

quarry_base_schema::impl_str_ser!(ResultType);

/// A fully resolved, immutable query against the metrics store.
///
/// Compiled queries carry only storage-internal identifiers. All name and
/// configuration resolution has already happened, so executing one is a pure
/// storage operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompiledQuery {
    /// The organization whose data is queried.
    pub org_id: OrganizationId,
    /// The projects whose data is queried.
    pub project_ids: Vec<ProjectId>,
    /// The storage entity this query runs against.
    pub entity: EntityKey,
    /// The expressions returned by the query.
    pub select: Vec<Expr>,
    /// The expressions to group result rows by.
    pub groupby: Vec<Expr>,
    /// The predicates, combined with logical AND.
    pub conditions: Vec<Condition>,
    /// Inclusive lower bound of the query time range.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound of the query time range.
    pub end: DateTime<Utc>,
    /// The time bucketing of the query in seconds.
    pub granularity: u32,
    /// Maximum number of result rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// The inferred result type for each aliased select expression.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub result_types: BTreeMap<String, ResultType>,
}

/// A single flat result row returned by the storage service.
pub type Row = BTreeMap<String, serde_json::Value>;

/// The result of executing a [`CompiledQuery`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct QueryResult {
    /// The result rows, in storage order.
    pub data: Vec<Row>,
}
