//! Compilation of public metrics queries.
//!
//! The [`QueryBuilder`] resolves requested columns and filters through the
//! metric indexer and rewrites them into the value/metric_id form of the
//! metrics store. [`compile_query`] drives a whole [`QueryRequest`] through
//! the builder and seals the result.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Timelike, Utc};
use quarry_base_schema::metrics::MetricType;
use quarry_base_schema::organization::OrganizationId;
use quarry_base_schema::project::ProjectId;
use quarry_snql::{CompiledQuery, Condition, EntityKey, Expr, Op, ResultType};

use crate::constants::{
    DRY_RUN_INDEX, PROJECT_ALIAS, PROJECT_NAME_ALIAS, PROJECT_THRESHOLD_CONFIG_ALIAS,
    TEAM_KEY_TRANSACTION_ALIAS, TITLE_ALIAS, UNPARAMETERIZED_TRANSACTION,
};
use crate::error::QueryError;
use crate::filters::{self, SearchFilter};
use crate::functions::{AggregateCall, lookup_function};
use crate::resolver::{CustomMeasurement, MetricIndexer, TagValue, tag_value_or_null};
use crate::thresholds::{self, ThresholdStore};

/// The scope and environment a query is compiled in.
///
/// Everything the compiler needs besides the query itself: the data scope,
/// backend mode flags, and per-organization context such as custom
/// measurements and starred transactions.
#[derive(Clone, Debug)]
pub struct QueryParams {
    /// The organization whose data is queried.
    pub organization: OrganizationId,
    /// The projects whose data is queried.
    pub projects: Vec<ProjectId>,
    /// Inclusive lower bound of the query time range.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound of the query time range.
    pub end: DateTime<Utc>,
    /// Compile without consulting the indexer.
    ///
    /// Every resolution yields the sentinel index instead. The compiled
    /// query validates the request shape but must not be executed.
    pub dry_run: bool,
    /// The backend stores tag values as raw strings instead of indices.
    pub tag_values_are_strings: bool,
    /// Custom measurements recorded for the organization.
    pub custom_measurements: Vec<CustomMeasurement>,
    /// Maps project slugs to their ids for slug filters and aliases.
    pub project_slugs: BTreeMap<String, ProjectId>,
    /// The caller's starred transactions as `(project, transaction)` pairs.
    pub team_key_transactions: Vec<(ProjectId, String)>,
}

impl QueryParams {
    /// Creates parameters for the given scope with empty context.
    pub fn new(
        organization: OrganizationId,
        projects: Vec<ProjectId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            organization,
            projects,
            start,
            end,
            dry_run: false,
            tag_values_are_strings: false,
            custom_measurements: Vec::new(),
            project_slugs: BTreeMap::new(),
            team_key_transactions: Vec::new(),
        }
    }
}

/// A single requested result column.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SelectedColumn {
    /// A plain field, doubling as a group key for the result rows.
    Field(String),
    /// An aggregate function call.
    Aggregate(AggregateCall),
}

impl From<&str> for SelectedColumn {
    fn from(name: &str) -> Self {
        Self::Field(name.to_owned())
    }
}

impl From<AggregateCall> for SelectedColumn {
    fn from(call: AggregateCall) -> Self {
        Self::Aggregate(call)
    }
}

/// A complete query request before compilation.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    /// The columns to select.
    pub selected_columns: Vec<SelectedColumn>,
    /// The filters to apply, combined with logical AND.
    pub filters: Vec<SearchFilter>,
    /// Maximum number of result rows.
    pub limit: Option<u32>,
}

/// Compiles a query request into an executable storage query.
///
/// This is the main entry point of the crate. All name resolution runs
/// through the given indexer and threshold store; the first unresolvable
/// reference aborts the compile.
pub fn compile_query(
    params: &QueryParams,
    request: &QueryRequest,
    indexer: &dyn MetricIndexer,
    thresholds: &dyn ThresholdStore,
) -> Result<CompiledQuery, QueryError> {
    let mut builder = QueryBuilder::new(params, indexer, thresholds);

    for column in &request.selected_columns {
        builder.add_selected_column(column)?;
    }

    for filter in &request.filters {
        builder.add_filter(filter)?;
    }

    builder.limit = request.limit;
    let query = builder.finish()?;

    quarry_log::debug!(
        entity = query.entity.as_str(),
        select = query.select.len(),
        conditions = query.conditions.len(),
        granularity = query.granularity,
        "compiled metrics query"
    );

    Ok(query)
}

/// Incrementally compiles one query against the metrics store.
///
/// The builder accumulates select, groupby and filter clauses while
/// recording every referenced metric for the query scope. The storage
/// entity is fixed by the first compiled aggregate; all further aggregates
/// must translate against it.
pub struct QueryBuilder<'a> {
    params: &'a QueryParams,
    indexer: &'a dyn MetricIndexer,
    thresholds: &'a dyn ThresholdStore,

    entity: Option<MetricType>,
    metric_ids: BTreeSet<i64>,
    select: Vec<Expr>,
    groupby: Vec<Expr>,
    conditions: Vec<Condition>,
    result_types: BTreeMap<String, ResultType>,
    limit: Option<u32>,

    // Lazily compiled shared expressions.
    threshold_config: Option<Expr>,

    histogram_buckets: Option<u32>,
    histogram_zoom: Option<Expr>,
    histogram_aliases: Vec<String>,
}

impl<'a> QueryBuilder<'a> {
    /// Creates a builder for the given scope.
    pub fn new(
        params: &'a QueryParams,
        indexer: &'a dyn MetricIndexer,
        thresholds: &'a dyn ThresholdStore,
    ) -> Self {
        Self {
            params,
            indexer,
            thresholds,
            entity: None,
            metric_ids: BTreeSet::new(),
            select: Vec::new(),
            groupby: Vec::new(),
            conditions: Vec::new(),
            result_types: BTreeMap::new(),
            limit: None,
            threshold_config: None,
            histogram_buckets: None,
            histogram_zoom: None,
            histogram_aliases: Vec::new(),
        }
    }

    /// Returns the scope and environment of this query.
    pub fn params(&self) -> &QueryParams {
        self.params
    }

    pub(crate) fn thresholds(&self) -> &dyn ThresholdStore {
        self.thresholds
    }

    /// Returns the custom measurement registered under the given name.
    pub(crate) fn custom_measurement(&self, name: &str) -> Option<&CustomMeasurement> {
        self.params
            .custom_measurements
            .iter()
            .find(|measurement| measurement.name == name)
    }

    /// Resolves a string through the indexer.
    ///
    /// In dry run mode every string resolves to the sentinel index without
    /// consulting the indexer.
    fn resolve_index(&self, value: &str) -> Option<i64> {
        if self.params.dry_run {
            return Some(DRY_RUN_INDEX);
        }

        self.indexer.resolve(self.params.organization, value)
    }

    /// Resolves a public metric field to its metric index.
    ///
    /// Well-known fields resolve through their resource identifier, custom
    /// measurements through the caller-supplied descriptors. The index is
    /// recorded for the query's metric scope predicate.
    pub fn resolve_metric(&mut self, field: &str) -> Result<i64, QueryError> {
        let name = crate::constants::metric_mri(field).unwrap_or(field);
        let index = self.resolve_index(name).or_else(|| {
            self.custom_measurement(field)
                .and_then(|measurement| measurement.metric_id)
        });

        let Some(index) = index else {
            return Err(QueryError::UnresolvableMetric(field.to_owned()));
        };

        self.metric_ids.insert(index);
        Ok(index)
    }

    /// Weakly resolves a tag value.
    ///
    /// In string mode the value passes through unresolved. Otherwise `None`
    /// means the value was never recorded, so no stored row can match it.
    pub fn resolve_tag_value(&self, value: &str) -> Option<TagValue> {
        if self.params.tag_values_are_strings {
            return Some(TagValue::Raw(value.to_owned()));
        }

        self.resolve_index(value).map(TagValue::Indexed)
    }

    /// Returns the tag value stored for rows without the tag.
    pub(crate) fn missing_tag_value(&self) -> TagValue {
        if self.params.tag_values_are_strings {
            TagValue::Raw(String::new())
        } else {
            TagValue::Indexed(0)
        }
    }

    /// Resolves a tag key to its storage column.
    ///
    /// Tag keys resolve through the indexer even in string mode; only tag
    /// values stay unresolved there.
    pub fn tag_column(&self, key: &str) -> Result<Expr, QueryError> {
        match self.resolve_index(key) {
            Some(index) => Ok(Expr::column(format!("tags[{index}]"))),
            None => Err(QueryError::incompatible(format!(
                "{key} is not a queryable tag in the metrics dataset"
            ))),
        }
    }

    /// Compiles a requested column into the select clause.
    ///
    /// Plain fields double as group keys. Aggregates record their inferred
    /// result type under the call's result alias.
    pub fn add_selected_column(&mut self, column: &SelectedColumn) -> Result<(), QueryError> {
        match column {
            SelectedColumn::Field(name) => {
                let expr = self.resolve_column(name)?;
                if !self.select.contains(&expr) {
                    self.select.push(expr.clone());
                    self.groupby.push(expr);
                }
            }
            SelectedColumn::Aggregate(call) => {
                let alias = call.result_alias();
                let (expr, result_type) = self.compile_call(call, Some(&alias))?;
                if let Some(result_type) = result_type {
                    self.result_types.insert(alias, result_type);
                }
                self.select.push(expr);
            }
        }

        Ok(())
    }

    /// Compiles a search filter and adds the resulting predicate, if any.
    pub fn add_filter(&mut self, filter: &SearchFilter) -> Result<(), QueryError> {
        if let Some(condition) = filters::convert(self, filter)? {
            self.conditions.push(condition);
        }

        Ok(())
    }

    /// Resolves a public field name to a select expression.
    pub fn resolve_column(&mut self, name: &str) -> Result<Expr, QueryError> {
        match name {
            PROJECT_ALIAS
            | PROJECT_NAME_ALIAS
            | TITLE_ALIAS
            | "transaction"
            | "tags[transaction]"
            | TEAM_KEY_TRANSACTION_ALIAS
            | PROJECT_THRESHOLD_CONFIG_ALIAS => self.resolve_field_alias(name),
            _ => self.resolve_field(name),
        }
    }

    /// Resolves a plain field to a column expression.
    ///
    /// Metric-valued fields have no per-row representation in the store and
    /// cannot be selected without an aggregate.
    fn resolve_field(&mut self, name: &str) -> Result<Expr, QueryError> {
        match name {
            "project_id" | "project.id" => Ok(Expr::column("project_id")),
            "timestamp" => Ok(Expr::column("timestamp")),
            _ if crate::constants::metric_mri(name).is_some()
                || self.custom_measurement(name).is_some() =>
            {
                Err(QueryError::incompatible(format!(
                    "{name} must be aggregated to be queried from metrics"
                )))
            }
            _ => Ok(self.tag_column(name)?.aliased(name)),
        }
    }

    /// Resolves a field alias to its specific expression.
    pub(crate) fn resolve_field_alias(&mut self, alias: &str) -> Result<Expr, QueryError> {
        match alias {
            PROJECT_ALIAS | PROJECT_NAME_ALIAS => self.project_slug_alias(alias),
            TITLE_ALIAS | "transaction" | "tags[transaction]" => self.transaction_alias(alias),
            TEAM_KEY_TRANSACTION_ALIAS => self.team_key_transaction_alias(),
            PROJECT_THRESHOLD_CONFIG_ALIAS => self.project_threshold_config(),
            _ => Err(QueryError::incompatible(format!(
                "{alias} is not a field alias"
            ))),
        }
    }

    /// The placeholder for field aliases that cannot resolve in dry run.
    fn dry_run_default(&self, alias: &str) -> Expr {
        Expr::function("toUInt64", [Expr::from(0i64)]).aliased(alias)
    }

    /// Maps the project id column back to project slugs.
    fn project_slug_alias(&mut self, alias: &str) -> Result<Expr, QueryError> {
        if self.params.dry_run {
            return Ok(self.dry_run_default(alias));
        }

        let mut pairs: Vec<_> = self
            .params
            .project_slugs
            .iter()
            .map(|(slug, project)| (*project, slug.as_str()))
            .collect();
        pairs.sort_unstable();

        Ok(Expr::function(
            "transform",
            [
                Expr::column("project_id"),
                Expr::array(pairs.iter().map(|(project, _)| Expr::from(project.value()))),
                Expr::array(pairs.iter().map(|&(_, slug)| Expr::from(slug))),
                Expr::from(""),
            ],
        )
        .aliased(alias))
    }

    /// Folds unnamed transactions into the unparameterized placeholder.
    fn transaction_alias(&mut self, alias: &str) -> Result<Expr, QueryError> {
        let column = self.tag_column("transaction")?;
        let missing = self.missing_tag_value();
        let unparameterized =
            tag_value_or_null(self.resolve_tag_value(UNPARAMETERIZED_TRANSACTION));

        Ok(Expr::function(
            "transform",
            [
                column,
                Expr::array([missing.into()]),
                Expr::array([unparameterized]),
            ],
        )
        .aliased(alias))
    }

    /// Marks rows whose transaction is starred by the caller's teams.
    ///
    /// Without any starred transactions the marker is constant false.
    fn team_key_transaction_alias(&mut self) -> Result<Expr, QueryError> {
        if self.params.dry_run {
            return Ok(self.dry_run_default(TEAM_KEY_TRANSACTION_ALIAS));
        }

        if self.params.team_key_transactions.is_empty() {
            return Ok(
                Expr::function("toInt8", [Expr::from(0i64)]).aliased(TEAM_KEY_TRANSACTION_ALIAS)
            );
        }

        let mut pairs = Vec::new();
        for (project, transaction) in &self.params.team_key_transactions {
            pairs.push(Expr::tuple([
                Expr::from(project.value()),
                tag_value_or_null(self.resolve_tag_value(transaction)),
            ]));
        }

        let transaction = self.tag_column("transaction")?;
        Ok(Expr::function(
            "in",
            [
                Expr::tuple([Expr::column("project_id"), transaction]),
                Expr::array(pairs),
            ],
        )
        .aliased(TEAM_KEY_TRANSACTION_ALIAS))
    }

    /// Returns the threshold configuration expression for this query.
    ///
    /// The expression is compiled once per query; repeated references share
    /// the same lookup tables.
    pub(crate) fn project_threshold_config(&mut self) -> Result<Expr, QueryError> {
        if let Some(expr) = &self.threshold_config {
            return Ok(expr.clone());
        }

        let expr = thresholds::resolve_project_threshold_config(self)?;
        self.threshold_config = Some(expr.clone());
        Ok(expr)
    }

    /// Compiles an aggregate call against the query's storage entity.
    pub(crate) fn compile_function(
        &mut self,
        call: &AggregateCall,
        alias: Option<&str>,
    ) -> Result<Expr, QueryError> {
        let (expr, _) = self.compile_call(call, alias)?;
        Ok(expr)
    }

    fn compile_call(
        &mut self,
        call: &AggregateCall,
        alias: Option<&str>,
    ) -> Result<(Expr, Option<ResultType>), QueryError> {
        let function = lookup_function(&call.function)
            .ok_or_else(|| QueryError::UnknownFunction(call.function.clone()))?;

        // The first aggregate decides which storage entity the whole query
        // runs against.
        let entity = match self.entity {
            Some(entity) => entity,
            None => {
                let primary = function.primary_type().ok_or_else(|| {
                    QueryError::incompatible(format!(
                        "{} has no metrics translation",
                        call.function
                    ))
                })?;
                self.entity = Some(primary);
                primary
            }
        };

        let resolver = function.resolver(entity).ok_or_else(|| {
            QueryError::incompatible(format!(
                "{} is not supported by entity {}",
                call.function,
                EntityKey::from(entity)
            ))
        })?;

        let args = function.validate_arguments(self, &call.function, &call.arguments)?;
        let result_type = function.result_type(self, &args);
        let expr = resolver(self, &args, alias)?;

        Ok((expr, result_type))
    }

    /// Restricts histogram translation to a value range and bucket count.
    pub fn set_histogram_params(&mut self, buckets: u32, range: Option<(f64, f64)>) {
        self.histogram_buckets = Some(buckets);
        self.histogram_zoom = range.map(|(min, max)| {
            Expr::function(
                "and",
                [
                    Expr::function("greaterOrEquals", [Expr::column("value"), min.into()]),
                    Expr::function("less", [Expr::column("value"), max.into()]),
                ],
            )
        });
    }

    pub(crate) fn histogram_buckets(&self) -> Option<u32> {
        self.histogram_buckets
    }

    pub(crate) fn histogram_zoom(&self) -> Option<&Expr> {
        self.histogram_zoom.as_ref()
    }

    pub(crate) fn record_histogram_alias(&mut self, alias: &str) {
        if !self.histogram_aliases.iter().any(|known| known == alias) {
            self.histogram_aliases.push(alias.to_owned());
        }
    }

    /// Returns the aliases of compiled histogram columns.
    ///
    /// Result rows under these aliases carry bucketed distributions rather
    /// than scalars.
    pub fn histogram_aliases(&self) -> &[String] {
        &self.histogram_aliases
    }

    /// Derives the time bucketing from the alignment of the query range.
    fn granularity(&self) -> u32 {
        let midnight =
            |time: DateTime<Utc>| time.hour() == 0 && time.minute() == 0 && time.second() == 0;
        let hourly = |time: DateTime<Utc>| time.minute() == 0 && time.second() == 0;

        if midnight(self.params.start) && midnight(self.params.end) {
            86400
        } else if hourly(self.params.start) && hourly(self.params.end) {
            3600
        } else {
            60
        }
    }

    /// Seals the builder into an immutable compiled query.
    ///
    /// Prepends the scope predicates: organization, projects, time range,
    /// and the set of referenced metrics.
    pub fn finish(self) -> Result<CompiledQuery, QueryError> {
        let Some(entity) = self.entity else {
            return Err(QueryError::incompatible(
                "a metrics query requires at least one aggregate",
            ));
        };

        let params = self.params;
        let granularity = self.granularity();

        let mut conditions = vec![
            Condition::new(Expr::column("org_id"), Op::Eq, params.organization.value()),
            Condition::new(
                Expr::column("project_id"),
                Op::In,
                Expr::array(params.projects.iter().map(|project| project.value().into())),
            ),
            Condition::new(Expr::column("timestamp"), Op::Gte, params.start),
            Condition::new(Expr::column("timestamp"), Op::Lt, params.end),
        ];

        if !self.metric_ids.is_empty() {
            conditions.push(Condition::new(
                Expr::column("metric_id"),
                Op::In,
                Expr::array(self.metric_ids.iter().copied().map(Expr::from)),
            ));
        }

        conditions.extend(self.conditions);

        Ok(CompiledQuery {
            org_id: params.organization,
            project_ids: params.projects.clone(),
            entity: EntityKey::from(entity),
            select: self.select,
            groupby: self.groupby,
            conditions,
            start: params.start,
            end: params.end,
            granularity,
            limit: self.limit,
            result_types: self.result_types,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use quarry_base_schema::metrics::MetricUnit;
    use similar_asserts::assert_eq;

    use crate::constants::{
        DEFAULT_DURATION_CEILING_MS, EVENT_TYPE_ALIAS, MAX_QUERYABLE_TRANSACTION_THRESHOLDS,
        MISERY_ALPHA, MISERY_BETA,
    };
    use crate::resolver::testutil::{PanickingIndexer, TestIndexer};
    use crate::thresholds::{ProjectThreshold, ThresholdMetric, TransactionThreshold};

    use super::*;

    #[derive(Debug, Default)]
    struct TestThresholds {
        projects: Vec<ProjectThreshold>,
        transactions: Vec<TransactionThreshold>,
    }

    impl ThresholdStore for TestThresholds {
        fn project_thresholds(
            &self,
            _organization: OrganizationId,
            _projects: &[ProjectId],
        ) -> Vec<ProjectThreshold> {
            self.projects.clone()
        }

        fn transaction_thresholds(
            &self,
            _organization: OrganizationId,
            _projects: &[ProjectId],
        ) -> Vec<TransactionThreshold> {
            self.transactions.clone()
        }
    }

    fn indexer() -> TestIndexer {
        TestIndexer::new([
            ("d:transactions/duration@millisecond", 9),
            ("d:transactions/measurements.lcp@millisecond", 10),
            ("d:transactions/measurements.fcp@millisecond", 11),
            ("s:transactions/user@none", 12),
            ("transaction", 21),
            ("transaction.status", 22),
            ("satisfaction", 23),
            ("environment", 24),
            ("measurement_rating", 25),
            ("release", 26),
            ("satisfied", 31),
            ("tolerated", 32),
            ("frustrated", 33),
            ("ok", 41),
            ("cancelled", 42),
            ("unknown", 43),
            ("production", 51),
            ("/checkout", 61),
            ("<< unparameterized >>", 62),
            ("poor", 71),
            ("foo", 72),
        ])
    }

    fn params() -> QueryParams {
        QueryParams::new(
            OrganizationId::new(1),
            vec![ProjectId::new(13)],
            Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 5, 8, 0, 0, 0).unwrap(),
        )
    }

    fn compile_scoped(
        params: &QueryParams,
        thresholds: &TestThresholds,
        request: &QueryRequest,
    ) -> Result<CompiledQuery, QueryError> {
        compile_query(params, request, &indexer(), thresholds)
    }

    fn compile(request: &QueryRequest) -> Result<CompiledQuery, QueryError> {
        compile_scoped(&params(), &TestThresholds::default(), request)
    }

    fn aggregate_request(call: AggregateCall) -> QueryRequest {
        QueryRequest {
            selected_columns: vec![call.into()],
            ..Default::default()
        }
    }

    fn threshold_request() -> QueryRequest {
        QueryRequest {
            selected_columns: vec![
                SelectedColumn::from(PROJECT_THRESHOLD_CONFIG_ALIAS),
                AggregateCall::nullary("count").into(),
            ],
            ..Default::default()
        }
    }

    fn select_strings(query: &CompiledQuery) -> Vec<String> {
        query.select.iter().map(ToString::to_string).collect()
    }

    fn condition_strings(query: &CompiledQuery) -> Vec<String> {
        query.conditions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_count_and_scope() {
        let query = compile(&aggregate_request(AggregateCall::nullary("count"))).unwrap();

        assert_eq!(query.entity, EntityKey::MetricsDistributions);
        assert_eq!(query.granularity, 86400);
        assert_eq!(query.limit, None);
        assert_eq!(
            select_strings(&query),
            vec!["countIf(value, equals(metric_id, 9)) AS count"]
        );
        assert_eq!(
            condition_strings(&query),
            vec![
                "org_id = 1",
                "project_id IN [13]",
                "timestamp >= toDateTime('2023-05-01T00:00:00')",
                "timestamp < toDateTime('2023-05-08T00:00:00')",
                "metric_id IN [9]",
            ]
        );
        assert_eq!(
            query.result_types,
            BTreeMap::from([("count".to_owned(), ResultType::Integer)])
        );
    }

    #[test]
    fn test_granularity_from_alignment() {
        let mut params = params();
        let request = aggregate_request(AggregateCall::nullary("count"));

        let query = compile_scoped(&params, &TestThresholds::default(), &request).unwrap();
        assert_eq!(query.granularity, 86400);

        params.end = Utc.with_ymd_and_hms(2023, 5, 8, 14, 0, 0).unwrap();
        let query = compile_scoped(&params, &TestThresholds::default(), &request).unwrap();
        assert_eq!(query.granularity, 3600);

        params.end = Utc.with_ymd_and_hms(2023, 5, 8, 14, 30, 0).unwrap();
        let query = compile_scoped(&params, &TestThresholds::default(), &request).unwrap();
        assert_eq!(query.granularity, 60);
    }

    #[test]
    fn test_query_requires_aggregate() {
        let request = QueryRequest {
            selected_columns: vec![SelectedColumn::from("transaction")],
            ..Default::default()
        };

        let error = compile(&request).unwrap_err();
        assert!(matches!(error, QueryError::IncompatibleMetricsQuery(_)));
        assert!(error.to_string().contains("at least one aggregate"));
    }

    #[test]
    fn test_unknown_function() {
        let error = compile(&aggregate_request(AggregateCall::new("quantile", ["0.5"])))
            .unwrap_err();
        assert!(matches!(error, QueryError::UnknownFunction(name) if name == "quantile"));
    }

    #[test]
    fn test_mixed_entities_rejected() {
        let request = QueryRequest {
            selected_columns: vec![
                AggregateCall::new("p75", ["transaction.duration"]).into(),
                AggregateCall::new("count_unique", ["user"]).into(),
            ],
            ..Default::default()
        };

        let error = compile(&request).unwrap_err();
        assert_eq!(
            error.to_string(),
            "count_unique is not supported by entity metrics_distributions"
        );
    }

    #[test]
    fn test_percentile_quantile_set() {
        let query = compile(&aggregate_request(AggregateCall::new(
            "percentile",
            ["transaction.duration", "0.5"],
        )))
        .unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "arrayElement(quantilesIf(0.5)(value, equals(metric_id, 9)), 1) \
                 AS percentile_transaction_duration_0_5"
            ]
        );

        let error = compile(&aggregate_request(AggregateCall::new(
            "percentile",
            ["transaction.duration", "0.3"],
        )))
        .unwrap_err();
        assert!(matches!(error, QueryError::IncompatibleMetricsQuery(_)));

        let error = compile(&aggregate_request(AggregateCall::new(
            "percentile",
            ["transaction.duration", "1"],
        )))
        .unwrap_err();
        assert!(matches!(error, QueryError::ArgumentOutOfRange { .. }));
    }

    #[test]
    fn test_p100_compiles_to_max() {
        let query = compile(&aggregate_request(AggregateCall::nullary("p100"))).unwrap();
        assert_eq!(
            select_strings(&query),
            vec!["maxIf(value, equals(metric_id, 9)) AS p100"]
        );
    }

    #[test]
    fn test_satisfaction_parameter_rejected() {
        for call in [
            AggregateCall::new("apdex", ["300"]),
            AggregateCall::new("user_misery", ["300"]),
            AggregateCall::new("count_miserable", ["user", "300"]),
        ] {
            let error = compile(&aggregate_request(call)).unwrap_err();
            assert!(matches!(error, QueryError::IncompatibleMetricsQuery(_)));
            assert!(error.to_string().contains("threshold parameter"));
        }
    }

    #[test]
    fn test_apdex_uses_threshold_config() {
        let query = compile(&aggregate_request(AggregateCall::nullary("apdex"))).unwrap();

        let rendered = select_strings(&query).remove(0);
        assert!(rendered.contains(
            "multiIf(equals(toString('duration') AS project_threshold_config, 'lcp'), 10, 9)"
        ));
        assert!(rendered.contains("equals(tags[23], 31)"));
        assert!(rendered.contains("equals(tags[23], 32)"));
        assert!(rendered.ends_with("AS apdex"));

        // Apdex references both candidate metrics.
        assert!(condition_strings(&query).contains(&"metric_id IN [9, 10]".to_owned()));
    }

    #[test]
    fn test_apdex_without_satisfaction_data() {
        let indexer = TestIndexer::new([]);
        let request = aggregate_request(AggregateCall::nullary("apdex"));
        let query =
            compile_query(&params(), &request, &indexer, &TestThresholds::default()).unwrap();

        assert_eq!(select_strings(&query), vec!["toUInt64(0) AS apdex"]);
        assert_eq!(query.conditions.len(), 4);
    }

    #[test]
    fn test_threshold_config_defaults() {
        let query = compile(&threshold_request()).unwrap();
        assert_eq!(
            select_strings(&query)[0],
            "toString('duration') AS project_threshold_config"
        );
    }

    #[test]
    fn test_threshold_config_project_rows() {
        let thresholds = TestThresholds {
            projects: vec![ProjectThreshold {
                project: ProjectId::new(13),
                metric: ThresholdMetric::Lcp,
            }],
            ..Default::default()
        };

        let query = compile_scoped(&params(), &thresholds, &threshold_request()).unwrap();
        assert_eq!(
            select_strings(&query)[0],
            "if(equals(indexOf([toUInt64(13)], project_id) AS project_threshold_config_index, \
             0), 'duration', arrayElement(['lcp'], indexOf([toUInt64(13)], project_id) AS \
             project_threshold_config_index)) AS project_threshold_config"
        );
    }

    #[test]
    fn test_threshold_transaction_override() {
        let thresholds = TestThresholds {
            transactions: vec![TransactionThreshold {
                project: ProjectId::new(13),
                transaction: "/checkout".to_owned(),
                metric: ThresholdMetric::Lcp,
            }],
            ..Default::default()
        };

        let query = compile_scoped(&params(), &thresholds, &threshold_request()).unwrap();
        assert_eq!(
            select_strings(&query)[0],
            "if(equals(indexOf([(toUInt64(13), toUInt64(61))], (project_id, tags[21])) AS \
             project_threshold_override_config_index, 0), toString('duration'), \
             arrayElement(['lcp'], indexOf([(toUInt64(13), toUInt64(61))], (project_id, \
             tags[21])) AS project_threshold_override_config_index)) AS project_threshold_config"
        );
    }

    #[test]
    fn test_threshold_elision_round_trips() {
        let baseline = compile(&threshold_request()).unwrap();

        // A project row on the default metric resolves like no row at all.
        let elided = TestThresholds {
            projects: vec![ProjectThreshold {
                project: ProjectId::new(13),
                metric: ThresholdMetric::Duration,
            }],
            ..Default::default()
        };
        let query = compile_scoped(&params(), &elided, &threshold_request()).unwrap();
        assert_eq!(query, baseline);

        // An override for a never-observed transaction cannot match a row.
        let unresolved = TestThresholds {
            transactions: vec![TransactionThreshold {
                project: ProjectId::new(13),
                transaction: "/missing".to_owned(),
                metric: ThresholdMetric::Lcp,
            }],
            ..Default::default()
        };
        let query = compile_scoped(&params(), &unresolved, &threshold_request()).unwrap();
        assert_eq!(query, baseline);

        // An override that restates the project configuration is elided.
        let project = ProjectThreshold {
            project: ProjectId::new(13),
            metric: ThresholdMetric::Lcp,
        };
        let restated = TestThresholds {
            projects: vec![project.clone()],
            transactions: vec![TransactionThreshold {
                project: ProjectId::new(13),
                transaction: "/checkout".to_owned(),
                metric: ThresholdMetric::Lcp,
            }],
        };
        let without = TestThresholds {
            projects: vec![project],
            ..Default::default()
        };
        assert_eq!(
            compile_scoped(&params(), &restated, &threshold_request()).unwrap(),
            compile_scoped(&params(), &without, &threshold_request()).unwrap()
        );
    }

    #[test]
    fn test_threshold_ceiling() {
        let rows = |count: usize| TestThresholds {
            projects: (0..count)
                .map(|id| ProjectThreshold {
                    project: ProjectId::new(id as u64),
                    metric: ThresholdMetric::Duration,
                })
                .collect(),
            ..Default::default()
        };

        let request = threshold_request();
        let at_limit = rows(MAX_QUERYABLE_TRANSACTION_THRESHOLDS);
        assert!(compile_scoped(&params(), &at_limit, &request).is_ok());

        let over_limit = rows(MAX_QUERYABLE_TRANSACTION_THRESHOLDS + 1);
        let error = compile_scoped(&params(), &over_limit, &request).unwrap_err();
        assert!(matches!(error, QueryError::TooManyThresholds));
    }

    #[test]
    fn test_event_type_filter() {
        let mut request = aggregate_request(AggregateCall::nullary("count"));
        request
            .filters
            .push(SearchFilter::new(EVENT_TYPE_ALIAS, Op::Eq, "transaction"));

        let query = compile(&request).unwrap();
        assert_eq!(query.conditions.len(), 5);

        request.filters[0] = SearchFilter::new(EVENT_TYPE_ALIAS, Op::Eq, "error");
        let error = compile(&request).unwrap_err();
        assert!(matches!(error, QueryError::IncompatibleMetricsQuery(_)));
    }

    #[test]
    fn test_transaction_filter() {
        let mut request = aggregate_request(AggregateCall::nullary("count"));
        request
            .filters
            .push(SearchFilter::new("transaction", Op::Eq, "/checkout"));
        let query = compile(&request).unwrap();
        assert_eq!(condition_strings(&query)[5], "tags[21] = 61");

        request.filters[0] = SearchFilter::new("transaction", Op::Eq, "");
        let error = compile(&request).unwrap_err();
        assert!(matches!(error, QueryError::InvalidSearchQuery(_)));

        request.filters[0] = SearchFilter::new("transaction", Op::NotEq, "");
        let query = compile(&request).unwrap();
        assert_eq!(query.conditions.len(), 5);
    }

    #[test]
    fn test_unresolved_tag_value_matches_nothing() {
        let mut request = aggregate_request(AggregateCall::nullary("count"));
        request
            .filters
            .push(SearchFilter::new("transaction", Op::Eq, "/missing"));
        let query = compile(&request).unwrap();
        assert_eq!(condition_strings(&query)[5], "tags[21] = NULL");
    }

    #[test]
    fn test_environment_filter() {
        let mut request = aggregate_request(AggregateCall::nullary("count"));
        request
            .filters
            .push(SearchFilter::new("environment", Op::Eq, "production"));
        let query = compile(&request).unwrap();
        assert_eq!(condition_strings(&query)[5], "tags[24] = 51");

        // The empty environment matches rows without the tag.
        request.filters[0] = SearchFilter::new("environment", Op::Eq, "");
        let query = compile(&request).unwrap();
        assert_eq!(condition_strings(&query)[5], "tags[24] = 0");

        request.filters[0] = SearchFilter::new(
            "environment",
            Op::In,
            vec!["production".to_owned(), String::new()],
        );
        let query = compile(&request).unwrap();
        assert_eq!(condition_strings(&query)[5], "tags[24] IN [0, 51]");

        // Unobserved environments drop out of the predicate.
        request.filters[0] = SearchFilter::new(
            "environment",
            Op::In,
            vec!["production".to_owned(), "staging".to_owned()],
        );
        let query = compile(&request).unwrap();
        assert_eq!(condition_strings(&query)[5], "tags[24] = 51");
    }

    #[test]
    fn test_duration_filter_scopes_to_metric() {
        let mut request = aggregate_request(AggregateCall::nullary("count"));
        request
            .filters
            .push(SearchFilter::new("transaction.duration", Op::Lt, 900_000.0));
        let query = compile(&request).unwrap();
        assert_eq!(
            condition_strings(&query)[5],
            "or(notEquals(metric_id, 9), less(value, 900000)) = 1"
        );
    }

    #[test]
    fn test_dry_run_skips_resolution() {
        let mut params = params();
        params.dry_run = true;

        let request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from(PROJECT_ALIAS),
                SelectedColumn::from(TEAM_KEY_TRANSACTION_ALIAS),
                AggregateCall::new("p75", ["measurements.lcp"]).into(),
                AggregateCall::nullary("failure_count").into(),
            ],
            filters: vec![
                SearchFilter::new("transaction.duration", Op::Lt, DEFAULT_DURATION_CEILING_MS),
                SearchFilter::new("transaction", Op::Eq, "/checkout"),
            ],
            limit: None,
        };

        let query = compile_query(
            &params,
            &request,
            &PanickingIndexer,
            &TestThresholds::default(),
        )
        .unwrap();

        let select = select_strings(&query);
        assert_eq!(select[0], "toUInt64(0) AS project");
        assert_eq!(select[1], "toUInt64(0) AS team_key_transaction");

        let conditions = condition_strings(&query);
        assert!(conditions.contains(&"metric_id IN [-1]".to_owned()));
        assert_eq!(conditions[conditions.len() - 1], "tags[-1] = -1");
    }

    #[test]
    fn test_count_if_render() {
        let query = compile(&aggregate_request(AggregateCall::new(
            "count_if",
            ["measurements.lcp", "greaterOrEquals", "0"],
        )))
        .unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "countIf(value, and(equals(metric_id, 10), greaterOrEquals(value, 0))) \
                 AS count_if_measurements_lcp_greaterOrEquals_0"
            ]
        );
    }

    #[test]
    fn test_team_key_transaction_alias() {
        let mut params = params();
        params.team_key_transactions = vec![(ProjectId::new(13), "/checkout".to_owned())];

        let request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from(TEAM_KEY_TRANSACTION_ALIAS),
                AggregateCall::nullary("count").into(),
            ],
            filters: vec![SearchFilter::new(TEAM_KEY_TRANSACTION_ALIAS, Op::Eq, "1")],
            limit: None,
        };

        let query = compile_scoped(&params, &TestThresholds::default(), &request).unwrap();
        assert_eq!(
            select_strings(&query)[0],
            "in((project_id, tags[21]), [(13, 61)]) AS team_key_transaction"
        );
        assert_eq!(
            condition_strings(&query)[5],
            "in((project_id, tags[21]), [(13, 61)]) AS team_key_transaction = 1"
        );

        params.team_key_transactions.clear();
        let query = compile_scoped(&params, &TestThresholds::default(), &request).unwrap();
        assert_eq!(
            select_strings(&query)[0],
            "toInt8(0) AS team_key_transaction"
        );
    }

    #[test]
    fn test_project_slug_alias_and_filter() {
        let mut params = params();
        params.project_slugs = BTreeMap::from([("backend".to_owned(), ProjectId::new(13))]);

        let mut request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from(PROJECT_ALIAS),
                AggregateCall::nullary("count").into(),
            ],
            filters: vec![SearchFilter::new(PROJECT_ALIAS, Op::Eq, "backend")],
            limit: None,
        };

        let query = compile_scoped(&params, &TestThresholds::default(), &request).unwrap();
        assert_eq!(
            select_strings(&query)[0],
            "transform(project_id, [13], ['backend'], '') AS project"
        );
        assert_eq!(condition_strings(&query)[5], "project_id = 13");

        request.filters[0] = SearchFilter::new(PROJECT_ALIAS, Op::Eq, "unknown");
        let error = compile_scoped(&params, &TestThresholds::default(), &request).unwrap_err();
        assert!(matches!(error, QueryError::InvalidSearchQuery(_)));
    }

    #[test]
    fn test_custom_measurement_aggregate() {
        let mut params = params();
        params.custom_measurements = vec![CustomMeasurement {
            name: "measurements.custom.click_count".to_owned(),
            metric_id: Some(77),
            unit: MetricUnit::None,
        }];

        let indexer = indexer();
        let query = compile_query(
            &params,
            &aggregate_request(AggregateCall::new("avg", ["measurements.custom.click_count"])),
            &indexer,
            &TestThresholds::default(),
        )
        .unwrap();

        // The indexer is consulted first, the descriptor only on a miss.
        assert_eq!(indexer.lookups(), 1);

        assert_eq!(
            select_strings(&query),
            vec!["avgIf(value, equals(metric_id, 77)) AS avg_measurements_custom_click_count"]
        );
        assert_eq!(
            query.result_types,
            BTreeMap::from([(
                "avg_measurements_custom_click_count".to_owned(),
                ResultType::Integer
            )])
        );
        assert!(condition_strings(&query).contains(&"metric_id IN [77]".to_owned()));
    }

    #[test]
    fn test_user_misery_formula() {
        let query = compile(&aggregate_request(AggregateCall::nullary("user_misery"))).unwrap();

        assert_eq!(query.entity, EntityKey::MetricsSets);
        let expected = format!(
            "divide(plus(uniqIf(value, and(equals(metric_id, 12), equals(tags[23], 33))), {}), \
             plus(nullIf(uniqIf(value, equals(metric_id, 12)), 0), {})) AS user_misery",
            MISERY_ALPHA,
            MISERY_ALPHA + MISERY_BETA
        );
        assert_eq!(select_strings(&query), vec![expected]);
    }

    #[test]
    fn test_failure_count_excludes_non_failures() {
        let query = compile(&aggregate_request(AggregateCall::nullary("failure_count"))).unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "countIf(value, and(equals(metric_id, 9), notIn(tags[22], [41, 42, 43]))) \
                 AS failure_count"
            ]
        );
    }

    #[test]
    fn test_failure_rate() {
        let query = compile(&aggregate_request(AggregateCall::nullary("failure_rate"))).unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "divide(countIf(value, and(equals(metric_id, 9), notIn(tags[22], \
                 [41, 42, 43]))), countIf(value, equals(metric_id, 9))) AS failure_rate"
            ]
        );
        assert_eq!(
            query.result_types,
            BTreeMap::from([("failure_rate".to_owned(), ResultType::Percentage)])
        );
    }

    #[test]
    fn test_rate_functions_use_query_interval() {
        let query = compile(&aggregate_request(AggregateCall::nullary("epm"))).unwrap();
        assert_eq!(
            select_strings(&query),
            vec!["divide(countIf(value, equals(metric_id, 9)), divide(604800, 60)) AS epm"]
        );

        let query = compile(&aggregate_request(AggregateCall::nullary("tpm"))).unwrap();
        assert_eq!(
            select_strings(&query),
            vec!["divide(countIf(value, equals(metric_id, 9)), divide(604800, 60)) AS tpm"]
        );

        let query = compile(&aggregate_request(AggregateCall::new("eps", ["60"]))).unwrap();
        assert_eq!(
            select_strings(&query),
            vec!["divide(countIf(value, equals(metric_id, 9)), 60) AS eps_60"]
        );
    }

    #[test]
    fn test_count_web_vitals() {
        let query = compile(&aggregate_request(AggregateCall::new(
            "count_web_vitals",
            ["measurements.lcp", "poor"],
        )))
        .unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "countIf(value, and(equals(tags[25], 71), equals(metric_id, 10))) \
                 AS count_web_vitals_measurements_lcp_poor"
            ]
        );

        let query = compile(&aggregate_request(AggregateCall::new(
            "count_web_vitals",
            ["measurements.lcp", "any"],
        )))
        .unwrap();
        assert_eq!(
            select_strings(&query),
            vec!["countIf(value, equals(metric_id, 10)) AS count_web_vitals_measurements_lcp_any"]
        );

        // A quality level never recorded counts nothing.
        let query = compile(&aggregate_request(AggregateCall::new(
            "count_web_vitals",
            ["measurements.lcp", "good"],
        )))
        .unwrap();
        assert_eq!(
            select_strings(&query),
            vec!["toUInt64(0) AS count_web_vitals_measurements_lcp_good"]
        );
    }

    #[test]
    fn test_conditional_aggregates_over_tags() {
        let query =
            compile(&aggregate_request(AggregateCall::new("sumIf", ["release", "foo"]))).unwrap();
        assert_eq!(query.entity, EntityKey::MetricsCounters);
        assert_eq!(
            select_strings(&query),
            vec!["sumIf(value, equals(tags[26], 72)) AS sumIf_release_foo"]
        );

        let query =
            compile(&aggregate_request(AggregateCall::new("uniqIf", ["release", "foo"]))).unwrap();
        assert_eq!(query.entity, EntityKey::MetricsSets);
        assert_eq!(
            select_strings(&query),
            vec!["uniqIf(value, equals(tags[26], 72)) AS uniqIf_release_foo"]
        );
    }

    #[test]
    fn test_fields_group_results() {
        let request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from("transaction"),
                SelectedColumn::from("transaction"),
                AggregateCall::nullary("count").into(),
            ],
            ..Default::default()
        };

        let query = compile(&request).unwrap();
        assert_eq!(query.select.len(), 2);
        assert_eq!(query.groupby.len(), 1);
        assert_eq!(
            query.groupby[0].to_string(),
            "transform(tags[21], [0], [62]) AS transaction"
        );
    }

    #[test]
    fn test_plain_tag_field() {
        let request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from("release"),
                AggregateCall::nullary("count").into(),
            ],
            ..Default::default()
        };
        let query = compile(&request).unwrap();
        assert_eq!(select_strings(&query)[0], "tags[26] AS release");

        let request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from("bogus_tag"),
                AggregateCall::nullary("count").into(),
            ],
            ..Default::default()
        };
        let error = compile(&request).unwrap_err();
        assert!(error.to_string().contains("bogus_tag"));
    }

    #[test]
    fn test_metric_field_requires_aggregate() {
        let request = QueryRequest {
            selected_columns: vec![
                SelectedColumn::from("transaction.duration"),
                AggregateCall::nullary("count").into(),
            ],
            ..Default::default()
        };
        let error = compile(&request).unwrap_err();
        assert!(matches!(error, QueryError::IncompatibleMetricsQuery(_)));
        assert!(error.to_string().contains("aggregated"));
    }

    #[test]
    fn test_limit_carries_through() {
        let mut request = aggregate_request(AggregateCall::nullary("count"));
        request.limit = Some(50);
        let query = compile(&request).unwrap();
        assert_eq!(query.limit, Some(50));
    }

    #[test]
    fn test_histogram_translation() {
        let query = compile(&aggregate_request(AggregateCall::new(
            "histogram",
            ["transaction.duration"],
        )))
        .unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "histogramIf(250)(value, equals(metric_id, 9)) AS histogram_transaction_duration"
            ]
        );
    }

    #[test]
    fn test_histogram_zoom() {
        let params = params();
        let indexer = indexer();
        let thresholds = TestThresholds::default();
        let mut builder = QueryBuilder::new(&params, &indexer, &thresholds);
        builder.set_histogram_params(10, Some((0.0, 1000.0)));

        let column = SelectedColumn::from(AggregateCall::new("histogram", ["transaction.duration"]));
        builder.add_selected_column(&column).unwrap();
        assert_eq!(builder.histogram_aliases(), ["histogram_transaction_duration"]);

        let query = builder.finish().unwrap();
        assert_eq!(
            select_strings(&query),
            vec![
                "histogramIf(10)(value, and(and(greaterOrEquals(value, 0), less(value, 1000)), \
                 equals(metric_id, 9))) AS histogram_transaction_duration"
            ]
        );
    }
}
