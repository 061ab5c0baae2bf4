//! Transaction threshold configuration lookup tables.
//!
//! Projects choose which metric their satisfaction aggregates measure,
//! project-wide or per transaction name. The configuration compiles into
//! array lookup tables that storage evaluates per row, falling back to the
//! default metric where no row matches.

use std::collections::BTreeMap;

use quarry_base_schema::organization::OrganizationId;
use quarry_base_schema::project::ProjectId;
use quarry_snql::Expr;

use crate::builder::QueryBuilder;
use crate::constants::{
    DEFAULT_PROJECT_THRESHOLD_METRIC, MAX_QUERYABLE_TRANSACTION_THRESHOLDS,
    PROJECT_THRESHOLD_CONFIG_ALIAS, PROJECT_THRESHOLD_CONFIG_INDEX_ALIAS,
    PROJECT_THRESHOLD_OVERRIDE_CONFIG_INDEX_ALIAS,
};
use crate::error::QueryError;
use crate::resolver::TagValue;

/// The metric a transaction threshold applies to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ThresholdMetric {
    /// The transaction duration.
    #[default]
    Duration,
    /// The largest contentful paint measurement.
    Lcp,
}

impl ThresholdMetric {
    /// Returns the name of the metric in threshold configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Duration => "duration",
            Self::Lcp => "lcp",
        }
    }
}

/// A project-wide transaction threshold row.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProjectThreshold {
    /// The project this threshold applies to.
    pub project: ProjectId,
    /// The metric measured against the threshold.
    pub metric: ThresholdMetric,
}

/// A threshold row overriding the project-wide metric for one transaction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionThreshold {
    /// The project this threshold applies to.
    pub project: ProjectId,
    /// The transaction name the override applies to.
    pub transaction: String,
    /// The metric measured against the threshold.
    pub metric: ThresholdMetric,
}

/// Read access to transaction threshold configuration.
///
/// Implementations must return rows ordered by project identifier so that
/// compiled lookup tables are deterministic.
pub trait ThresholdStore: Send + Sync {
    /// Returns the project-wide threshold rows for the given projects.
    fn project_thresholds(
        &self,
        organization: OrganizationId,
        projects: &[ProjectId],
    ) -> Vec<ProjectThreshold>;

    /// Returns the per-transaction override rows for the given projects.
    fn transaction_thresholds(
        &self,
        organization: OrganizationId,
        projects: &[ProjectId],
    ) -> Vec<TransactionThreshold>;
}

fn uint64_key(project: ProjectId) -> Expr {
    Expr::function("toUInt64", [Expr::from(project.value())])
}

// Lookup keys need explicit casts since storage infers the narrowest type
// for array literals, which would fail the comparison against the column.
fn transaction_key(transaction: TagValue) -> Expr {
    match transaction {
        TagValue::Indexed(index) => Expr::function("toUInt64", [Expr::from(index)]),
        raw @ TagValue::Raw(_) => raw.into(),
    }
}

/// Compiles the threshold configuration into a per-row lookup expression.
///
/// The expression evaluates to the name of the configured metric for the
/// row's project and transaction. Rows that restate the default or their
/// project's configuration are elided from the lookup tables, as are
/// overrides for transaction names absent from the indexer.
pub(crate) fn resolve_project_threshold_config(
    builder: &mut QueryBuilder<'_>,
) -> Result<Expr, QueryError> {
    let organization = builder.params().organization;
    let projects = builder.params().projects.clone();

    let project_rows = builder
        .thresholds()
        .project_thresholds(organization, &projects);
    let override_rows = builder
        .thresholds()
        .transaction_thresholds(organization, &projects);

    if project_rows.len() + override_rows.len() > MAX_QUERYABLE_TRANSACTION_THRESHOLDS {
        return Err(QueryError::TooManyThresholds);
    }

    quarry_log::trace!(
        project_rows = project_rows.len(),
        override_rows = override_rows.len(),
        "compiling transaction threshold configuration"
    );

    let mut project_metrics = BTreeMap::new();
    let mut project_keys = Vec::new();
    let mut project_values = Vec::new();
    for row in &project_rows {
        // Projects on the default metric are covered by the fallback branch
        // of the lookup, their rows can be dropped from the table.
        if row.metric == ThresholdMetric::default() {
            continue;
        }

        project_metrics.insert(row.project, row.metric);
        project_keys.push(uint64_key(row.project));
        project_values.push(Expr::from(row.metric.as_str()));
    }

    let mut override_keys = Vec::new();
    let mut override_values = Vec::new();
    for row in &override_rows {
        match project_metrics.get(&row.project) {
            // The override restates the project configuration.
            Some(metric) if *metric == row.metric => continue,
            // The override restates the default.
            None if row.metric == ThresholdMetric::default() => continue,
            _ => (),
        }

        // A transaction name missing from the indexer cannot match any
        // stored row, so its override cannot apply.
        let Some(transaction) = builder.resolve_tag_value(&row.transaction) else {
            continue;
        };

        override_keys.push(Expr::tuple([
            uint64_key(row.project),
            transaction_key(transaction),
        ]));
        override_values.push(Expr::from(row.metric.as_str()));
    }

    let project_part = if project_values.is_empty() {
        Expr::function("toString", [Expr::from(DEFAULT_PROJECT_THRESHOLD_METRIC)])
    } else {
        let index = Expr::function(
            "indexOf",
            [Expr::array(project_keys), Expr::column("project_id")],
        )
        .aliased(PROJECT_THRESHOLD_CONFIG_INDEX_ALIAS);

        Expr::function(
            "if",
            [
                Expr::function("equals", [index.clone(), Expr::from(0i64)]),
                Expr::from(DEFAULT_PROJECT_THRESHOLD_METRIC),
                Expr::function("arrayElement", [Expr::array(project_values), index]),
            ],
        )
    };

    if override_values.is_empty() {
        return Ok(project_part.aliased(PROJECT_THRESHOLD_CONFIG_ALIAS));
    }

    let transaction_column = builder.tag_column("transaction")?;
    let override_index = Expr::function(
        "indexOf",
        [
            Expr::array(override_keys),
            Expr::tuple([Expr::column("project_id"), transaction_column]),
        ],
    )
    .aliased(PROJECT_THRESHOLD_OVERRIDE_CONFIG_INDEX_ALIAS);

    Ok(Expr::function(
        "if",
        [
            Expr::function("equals", [override_index.clone(), Expr::from(0i64)]),
            project_part,
            Expr::function(
                "arrayElement",
                [Expr::array(override_values), override_index],
            ),
        ],
    )
    .aliased(PROJECT_THRESHOLD_CONFIG_ALIAS))
}

/// Selects the metric measured by satisfaction aggregates.
///
/// Evaluates to the LCP metric for rows whose threshold configuration names
/// it and to the duration metric for everything else.
pub(crate) fn project_threshold_multi_if(
    builder: &mut QueryBuilder<'_>,
) -> Result<Expr, QueryError> {
    let config = builder.resolve_field_alias(PROJECT_THRESHOLD_CONFIG_ALIAS)?;
    let lcp = builder.resolve_metric("measurements.lcp")?;
    let duration = builder.resolve_metric("transaction.duration")?;

    Ok(Expr::function(
        "multiIf",
        [
            Expr::function("equals", [config, Expr::from("lcp")]),
            Expr::from(lcp),
            Expr::from(duration),
        ],
    ))
}
