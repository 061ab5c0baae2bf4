//! The registry of aggregate functions queryable against the metrics store.
//!
//! Every function declares its typed arguments and one translation per
//! storage metric type. Translations are plain function pointers receiving
//! the per-query [`QueryBuilder`] context, so the registry itself is fully
//! static and shared across queries.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use quarry_base_schema::metrics::MetricType;
use quarry_snql::{Expr, Literal, ResultType};

use crate::builder::QueryBuilder;
use crate::constants::{
    DEFAULT_HISTOGRAM_BUCKETS, FUNCTION_ALIASES, METRIC_FRUSTRATED_TAG_VALUE, METRIC_PERCENTILES,
    METRIC_SATISFACTION_TAG_KEY, METRIC_SATISFIED_TAG_VALUE, METRIC_TOLERATED_TAG_VALUE,
    MISERY_ALPHA, MISERY_BETA, NON_FAILURE_STATUS, is_custom_measurement,
};
use crate::error::QueryError;
use crate::resolver::{TagValue, tag_value_or_null};

/// Translates a validated function call into a storage expression.
pub type SnqlResolver =
    fn(&mut QueryBuilder<'_>, &Arguments, Option<&str>) -> Result<Expr, QueryError>;

/// Infers the result type of a function call from its arguments.
pub type ResultTypeResolver = fn(&QueryBuilder<'_>, &Arguments) -> Option<ResultType>;

/// Derives an argument value from previously validated arguments.
type CalculatedResolver = fn(&mut QueryBuilder<'_>, &Arguments) -> Result<ArgValue, QueryError>;

/// A requested aggregate column, by function name and raw arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AggregateCall {
    /// The name of the function as requested by the caller.
    pub function: String,
    /// The raw, unparsed argument strings.
    pub arguments: Vec<String>,
    /// An explicit result alias. Generated from the call when absent.
    pub alias: Option<String>,
}

impl AggregateCall {
    /// Creates an aggregate call with the given raw arguments.
    pub fn new<S>(function: impl Into<String>, arguments: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        Self {
            function: function.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            alias: None,
        }
    }

    /// Creates an aggregate call without arguments.
    pub fn nullary(function: impl Into<String>) -> Self {
        Self::new::<String>(function, [])
    }

    /// Sets an explicit result alias.
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns the result alias of this call.
    ///
    /// Defaults to the generated alias if none was set explicitly.
    pub fn result_alias(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => function_alias(&self.function, &self.arguments),
        }
    }
}

/// Returns the generated result alias for a function call.
///
/// The alias is the function name joined with its arguments, with all
/// non-word characters replaced by underscores:
/// `count_if(measurements.lcp,greaterOrEquals,0)` becomes
/// `count_if_measurements_lcp_greaterOrEquals_0`.
pub fn function_alias(function: &str, arguments: &[String]) -> String {
    let joined = arguments.join("_");
    let sanitized: String = joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{function}_{sanitized}")
        .trim_end_matches('_')
        .to_owned()
}

/// A validated or derived argument value.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// An omitted nullable argument.
    Null,
    /// A raw or validated string.
    String(String),
    /// A validated number.
    Number(f64),
    /// A resolved metric or tag index.
    Id(i64),
    /// A resolved column expression.
    Expr(Expr),
    /// A weakly resolved tag value.
    Tag(TagValue),
}

/// The validated arguments of a single function call.
///
/// Accessors return [`QueryError::MissingArgument`] when an argument is
/// absent or has an unexpected kind, which indicates a mismatch between a
/// declaration and its translation.
#[derive(Clone, Debug)]
pub struct Arguments {
    function: String,
    values: BTreeMap<&'static str, ArgValue>,
}

impl Arguments {
    fn new(function: &str) -> Self {
        Self {
            function: function.to_owned(),
            values: BTreeMap::new(),
        }
    }

    fn insert(&mut self, name: &'static str, value: ArgValue) {
        self.values.insert(name, value);
    }

    fn missing(&self, name: &'static str) -> QueryError {
        QueryError::MissingArgument {
            function: self.function.clone(),
            argument: name,
        }
    }

    /// Returns `true` if the argument was omitted.
    pub fn is_null(&self, name: &'static str) -> bool {
        matches!(self.values.get(name), Some(ArgValue::Null) | None)
    }

    /// Returns a string argument.
    pub fn string(&self, name: &'static str) -> Result<&str, QueryError> {
        match self.values.get(name) {
            Some(ArgValue::String(value)) => Ok(value),
            _ => Err(self.missing(name)),
        }
    }

    /// Returns a numeric argument.
    pub fn number(&self, name: &'static str) -> Result<f64, QueryError> {
        match self.values.get(name) {
            Some(ArgValue::Number(value)) => Ok(*value),
            _ => Err(self.missing(name)),
        }
    }

    /// Returns a resolved metric or tag index argument.
    pub fn id(&self, name: &'static str) -> Result<i64, QueryError> {
        match self.values.get(name) {
            Some(ArgValue::Id(value)) => Ok(*value),
            _ => Err(self.missing(name)),
        }
    }

    /// Returns a resolved column expression argument.
    pub fn expr(&self, name: &'static str) -> Result<&Expr, QueryError> {
        match self.values.get(name) {
            Some(ArgValue::Expr(value)) => Ok(value),
            _ => Err(self.missing(name)),
        }
    }

    /// Returns a weakly resolved tag value argument as an expression.
    ///
    /// Unresolved tag values compile to the null literal.
    pub fn tag_expr(&self, name: &'static str) -> Result<Expr, QueryError> {
        match self.values.get(name) {
            Some(ArgValue::Tag(value)) => Ok(value.clone().into()),
            Some(ArgValue::Null) => Ok(Expr::Literal(Literal::Null)),
            _ => Err(self.missing(name)),
        }
    }
}

/// The semantic kind of a declared function argument.
#[derive(Clone, Debug)]
enum ArgKind {
    /// A metric column name checked against an allow-list.
    Metric {
        allowed: &'static [&'static str],
        allow_custom: bool,
    },
    /// A number within `[min, max)`.
    NumberRange { min: Option<f64>, max: Option<f64> },
    /// A number within `[min, max)` that may be omitted entirely.
    NullableNumberRange { min: Option<f64>, max: Option<f64> },
    /// A string checked against an allow-list.
    StringEnum { allowed: &'static [&'static str] },
    /// A tag key, resolved to its storage column.
    TagColumn,
    /// A raw string passed through unvalidated.
    Raw,
    /// A duration in seconds, defaulting to the query time range.
    Interval { min: f64 },
}

/// Declares a single function argument and how to validate it.
#[derive(Clone, Debug)]
pub struct FunctionArg {
    name: &'static str,
    kind: ArgKind,
    default: Option<ArgValue>,
}

impl FunctionArg {
    fn new(name: &'static str, kind: ArgKind) -> Self {
        Self {
            name,
            kind,
            default: None,
        }
    }

    /// A metric column argument restricted to the given public names.
    ///
    /// An empty allow-list permits any metric.
    pub fn metric(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::new(
            name,
            ArgKind::Metric {
                allowed,
                allow_custom: true,
            },
        )
    }

    /// A metric column argument that rejects custom measurements.
    pub fn metric_no_custom(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::new(
            name,
            ArgKind::Metric {
                allowed,
                allow_custom: false,
            },
        )
    }

    /// A numeric argument bounded by `min` inclusive and `max` exclusive.
    pub fn number_range(name: &'static str, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(name, ArgKind::NumberRange { min, max })
    }

    /// A numeric argument that defaults to null when omitted.
    pub fn nullable_number_range(name: &'static str, min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(name, ArgKind::NullableNumberRange { min, max })
    }

    /// A string argument restricted to the given values.
    pub fn string_enum(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self::new(name, ArgKind::StringEnum { allowed })
    }

    /// A tag key argument resolved to its storage column.
    pub fn tag_column(name: &'static str) -> Self {
        Self::new(name, ArgKind::TagColumn)
    }

    /// A raw string argument without validation.
    pub fn raw(name: &'static str) -> Self {
        Self::new(name, ArgKind::Raw)
    }

    /// An interval argument defaulting to the query range in seconds.
    pub fn interval(name: &'static str, min: f64) -> Self {
        Self::new(name, ArgKind::Interval { min })
    }

    /// Attaches a default, making the argument optional at its position.
    pub fn with_default(mut self, value: ArgValue) -> Self {
        self.default = Some(value);
        self
    }

    fn default_value(&self, builder: &QueryBuilder<'_>) -> Option<ArgValue> {
        if let Some(default) = &self.default {
            return Some(default.clone());
        }

        match self.kind {
            ArgKind::NullableNumberRange { .. } => Some(ArgValue::Null),
            ArgKind::Interval { .. } => {
                let range = builder.params().end - builder.params().start;
                Some(ArgValue::Number(range.num_seconds() as f64))
            }
            _ => None,
        }
    }

    fn normalize(
        &self,
        builder: &mut QueryBuilder<'_>,
        value: &str,
    ) -> Result<ArgValue, QueryError> {
        match &self.kind {
            ArgKind::Metric {
                allowed,
                allow_custom,
            } => {
                if !allowed.is_empty()
                    && !allowed.contains(&value)
                    && !(*allow_custom && is_custom_measurement(value))
                {
                    return Err(QueryError::incompatible(format!(
                        "{value} is not an allowed column"
                    )));
                }
                Ok(ArgValue::String(value.to_owned()))
            }
            ArgKind::NumberRange { min, max } | ArgKind::NullableNumberRange { min, max } => {
                let number = parse_number(self.name, value)?;
                check_range(self.name, number, *min, *max)?;
                Ok(ArgValue::Number(number))
            }
            ArgKind::StringEnum { allowed } => {
                if !allowed.contains(&value) {
                    return Err(QueryError::invalid_search(format!(
                        "{value} is not a valid value for {}",
                        self.name
                    )));
                }
                Ok(ArgValue::String(value.to_owned()))
            }
            ArgKind::TagColumn => Ok(ArgValue::Expr(builder.tag_column(value)?)),
            ArgKind::Raw => Ok(ArgValue::String(value.to_owned())),
            ArgKind::Interval { min } => {
                let number = parse_number(self.name, value)?;
                check_range(self.name, number, Some(*min), None)?;
                Ok(ArgValue::Number(number))
            }
        }
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<f64, QueryError> {
    value
        .parse()
        .map_err(|_| QueryError::invalid_search(format!("{value} is not a number for {name}")))
}

fn check_range(
    name: &'static str,
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<(), QueryError> {
    if let Some(min) = min
        && value < min
    {
        return Err(QueryError::ArgumentOutOfRange {
            argument: name,
            reason: format!("{value} must be greater than or equal to {min}"),
        });
    }

    if let Some(max) = max
        && value >= max
    {
        return Err(QueryError::ArgumentOutOfRange {
            argument: name,
            reason: format!("{value} must be less than {max}"),
        });
    }

    Ok(())
}

/// A derived argument computed from previously validated arguments.
#[derive(Clone, Debug)]
struct CalculatedArg {
    name: &'static str,
    resolve: CalculatedResolver,
}

/// An aggregate function declaration in the registry.
///
/// Declarations are immutable and shared. All per-query state flows through
/// the [`QueryBuilder`] passed into the translation.
#[derive(Clone, Debug)]
pub struct MetricsFunction {
    name: &'static str,
    required_args: Vec<FunctionArg>,
    optional_args: Vec<FunctionArg>,
    calculated_args: Vec<CalculatedArg>,
    snql_distribution: Option<SnqlResolver>,
    snql_set: Option<SnqlResolver>,
    snql_counter: Option<SnqlResolver>,
    result_type_fn: Option<ResultTypeResolver>,
    default_result_type: Option<ResultType>,
}

impl MetricsFunction {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            required_args: Vec::new(),
            optional_args: Vec::new(),
            calculated_args: Vec::new(),
            snql_distribution: None,
            snql_set: None,
            snql_counter: None,
            result_type_fn: None,
            default_result_type: None,
        }
    }

    fn required_args(mut self, args: impl IntoIterator<Item = FunctionArg>) -> Self {
        self.required_args = args.into_iter().collect();
        self
    }

    fn optional_args(mut self, args: impl IntoIterator<Item = FunctionArg>) -> Self {
        self.optional_args = args.into_iter().collect();
        self
    }

    fn resolve_metric_id(mut self) -> Self {
        self.calculated_args.push(CalculatedArg {
            name: "metric_id",
            resolve: |builder, args| {
                let column = args.string("column")?;
                Ok(ArgValue::Id(builder.resolve_metric(column)?))
            },
        });
        self
    }

    fn resolve_if_val(mut self) -> Self {
        self.calculated_args.push(CalculatedArg {
            name: "resolved_val",
            resolve: |builder, args| {
                let value = args.string("if_val")?;
                Ok(match builder.resolve_tag_value(value) {
                    Some(tag) => ArgValue::Tag(tag),
                    None => ArgValue::Null,
                })
            },
        });
        self
    }

    fn distribution(mut self, resolver: SnqlResolver) -> Self {
        self.snql_distribution = Some(resolver);
        self
    }

    fn set(mut self, resolver: SnqlResolver) -> Self {
        self.snql_set = Some(resolver);
        self
    }

    fn counter(mut self, resolver: SnqlResolver) -> Self {
        self.snql_counter = Some(resolver);
        self
    }

    fn result_type_fn(mut self, resolver: ResultTypeResolver) -> Self {
        self.result_type_fn = Some(resolver);
        self
    }

    fn default_result_type(mut self, ty: ResultType) -> Self {
        self.default_result_type = Some(ty);
        self
    }

    /// Returns the name this function is registered under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the storage type this function prefers.
    ///
    /// Distributions take precedence over sets over counters, matching how
    /// queries are bucketed into storage entities.
    pub fn primary_type(&self) -> Option<MetricType> {
        if self.snql_distribution.is_some() {
            Some(MetricType::Distribution)
        } else if self.snql_set.is_some() {
            Some(MetricType::Set)
        } else if self.snql_counter.is_some() {
            Some(MetricType::Counter)
        } else {
            None
        }
    }

    /// Returns the translation for the given storage type, if declared.
    pub fn resolver(&self, ty: MetricType) -> Option<SnqlResolver> {
        match ty {
            MetricType::Distribution => self.snql_distribution,
            MetricType::Set => self.snql_set,
            MetricType::Counter => self.snql_counter,
        }
    }

    /// Validates raw arguments and computes derived values.
    ///
    /// Positional arguments fill declared slots in order. Missing trailing
    /// arguments fall back to their defaults; required arguments without a
    /// default fail with [`QueryError::MissingArgument`].
    pub fn validate_arguments(
        &self,
        builder: &mut QueryBuilder<'_>,
        function: &str,
        raw: &[String],
    ) -> Result<Arguments, QueryError> {
        let total = self.required_args.len() + self.optional_args.len();
        if raw.len() > total {
            return Err(QueryError::invalid_search(format!(
                "{function}: expected at most {total} argument(s)"
            )));
        }

        let mut args = Arguments::new(function);
        let specs = self.required_args.iter().chain(&self.optional_args);
        for (index, spec) in specs.enumerate() {
            let value = match raw.get(index) {
                Some(value) => spec.normalize(builder, value)?,
                None => match spec.default_value(builder) {
                    Some(value) => value,
                    None => {
                        return Err(QueryError::MissingArgument {
                            function: function.to_owned(),
                            argument: spec.name,
                        });
                    }
                },
            };
            args.insert(spec.name, value);
        }

        for calculated in &self.calculated_args {
            let value = (calculated.resolve)(builder, &args)?;
            args.insert(calculated.name, value);
        }

        Ok(args)
    }

    /// Infers the result type, preferring the dynamic rule over the default.
    pub fn result_type(
        &self,
        builder: &QueryBuilder<'_>,
        args: &Arguments,
    ) -> Option<ResultType> {
        if let Some(resolver) = self.result_type_fn
            && let Some(ty) = resolver(builder, args)
        {
            return Some(ty);
        }

        self.default_result_type
    }
}

/// Looks up a function declaration by its registered name.
pub fn lookup_function(name: &str) -> Option<&'static MetricsFunction> {
    registry().get(name)
}

fn registry() -> &'static BTreeMap<&'static str, MetricsFunction> {
    static REGISTRY: OnceLock<BTreeMap<&'static str, MetricsFunction>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

const METRIC_DURATION_COLUMNS: &[&str] = &[
    "measurements.app_start_cold",
    "measurements.app_start_warm",
    "measurements.fcp",
    "measurements.fid",
    "measurements.fp",
    "measurements.lcp",
    "measurements.stall_longest_time",
    "measurements.stall_total_time",
    "measurements.ttfb",
    "measurements.ttfb.requesttime",
    "spans.browser",
    "spans.db",
    "spans.http",
    "spans.resource",
    "spans.ui",
    "transaction.duration",
];

const WEB_VITAL_COLUMNS: &[&str] = &[
    "measurements.fp",
    "measurements.fcp",
    "measurements.lcp",
    "measurements.fid",
    "measurements.cls",
];

const COUNT_IF_CONDITIONS: &[&str] = &[
    "equals",
    "notEquals",
    "less",
    "greater",
    "lessOrEquals",
    "greaterOrEquals",
];

fn build_registry() -> BTreeMap<&'static str, MetricsFunction> {
    let functions = [
        // Apdex and misery are tag based in the metrics store, so they reject
        // the satisfaction parameter the event dataset versions accept.
        MetricsFunction::new("apdex")
            .optional_args([FunctionArg::nullable_number_range(
                "satisfaction",
                Some(0.0),
                None,
            )])
            .distribution(resolve_apdex)
            .default_result_type(ResultType::Number),
        MetricsFunction::new("avg")
            .required_args([FunctionArg::metric("column", METRIC_DURATION_COLUMNS)])
            .resolve_metric_id()
            .distribution(resolve_avg)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("count_miserable")
            .required_args([FunctionArg::metric_no_custom("column", &["user"])])
            .optional_args([FunctionArg::nullable_number_range(
                "satisfaction",
                Some(0.0),
                None,
            )])
            .resolve_metric_id()
            .set(resolve_count_miserable)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("count_unparameterized_transactions")
            .distribution(resolve_count_unparameterized)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("count_null_transactions").distribution(resolve_count_null),
        MetricsFunction::new("count_has_transaction_name")
            .distribution(resolve_count_has_transaction_name)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("user_misery")
            .optional_args([
                FunctionArg::nullable_number_range("satisfaction", Some(0.0), None),
                FunctionArg::number_range("alpha", Some(0.0), None)
                    .with_default(ArgValue::Number(MISERY_ALPHA)),
                FunctionArg::number_range("beta", Some(0.0), None)
                    .with_default(ArgValue::Number(MISERY_BETA)),
            ])
            .set(resolve_user_misery)
            .default_result_type(ResultType::Number),
        MetricsFunction::new("p50")
            .optional_args([duration_column_with_default()])
            .resolve_metric_id()
            .distribution(resolve_p50)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("p75")
            .optional_args([duration_column_with_default()])
            .resolve_metric_id()
            .distribution(resolve_p75)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("p90")
            .optional_args([duration_column_with_default()])
            .resolve_metric_id()
            .distribution(resolve_p90)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("p95")
            .optional_args([duration_column_with_default()])
            .resolve_metric_id()
            .distribution(resolve_p95)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("p99")
            .optional_args([duration_column_with_default()])
            .resolve_metric_id()
            .distribution(resolve_p99)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("p100")
            .optional_args([duration_column_with_default()])
            .resolve_metric_id()
            .distribution(resolve_p100)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("max")
            .required_args([FunctionArg::metric("column", &[])])
            .resolve_metric_id()
            .distribution(resolve_max)
            .result_type_fn(reflective_result_type),
        MetricsFunction::new("min")
            .required_args([FunctionArg::metric("column", &[])])
            .resolve_metric_id()
            .distribution(resolve_min)
            .result_type_fn(reflective_result_type),
        MetricsFunction::new("sum")
            .required_args([FunctionArg::metric("column", &[])])
            .resolve_metric_id()
            .distribution(resolve_sum)
            .result_type_fn(reflective_result_type),
        MetricsFunction::new("sumIf")
            .required_args([FunctionArg::tag_column("if_col"), FunctionArg::raw("if_val")])
            .resolve_if_val()
            .counter(resolve_sum_if)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("percentile")
            .required_args([
                duration_column_with_default(),
                FunctionArg::number_range("percentile", Some(0.0), Some(1.0)),
            ])
            .resolve_metric_id()
            .distribution(resolve_percentile)
            .result_type_fn(reflective_result_type)
            .default_result_type(ResultType::Duration),
        MetricsFunction::new("count_unique")
            .required_args([FunctionArg::metric_no_custom("column", &["user"])])
            .resolve_metric_id()
            .set(resolve_count_unique)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("uniq").set(resolve_uniq),
        MetricsFunction::new("uniqIf")
            .required_args([FunctionArg::tag_column("if_col"), FunctionArg::raw("if_val")])
            .resolve_if_val()
            .set(resolve_uniq_if)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("count")
            .distribution(resolve_count)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("count_if")
            .required_args([
                FunctionArg::metric("column", &[]),
                FunctionArg::string_enum("condition", COUNT_IF_CONDITIONS),
                FunctionArg::number_range("threshold", None, None),
            ])
            .resolve_metric_id()
            .distribution(resolve_count_if)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("count_web_vitals")
            .required_args([
                FunctionArg::metric_no_custom("column", WEB_VITAL_COLUMNS),
                FunctionArg::string_enum("quality", &["good", "meh", "poor", "any"]),
            ])
            .resolve_metric_id()
            .distribution(resolve_count_web_vitals)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("epm")
            .optional_args([FunctionArg::interval("interval", 1.0)])
            .distribution(resolve_epm)
            .default_result_type(ResultType::Number),
        MetricsFunction::new("eps")
            .optional_args([FunctionArg::interval("interval", 1.0)])
            .distribution(resolve_eps)
            .default_result_type(ResultType::Number),
        MetricsFunction::new("failure_count")
            .distribution(resolve_failure_count)
            .default_result_type(ResultType::Integer),
        MetricsFunction::new("failure_rate")
            .distribution(resolve_failure_rate)
            .default_result_type(ResultType::Percentage),
        MetricsFunction::new("histogram")
            .required_args([FunctionArg::metric("column", &[])])
            .resolve_metric_id()
            .distribution(resolve_histogram)
            .default_result_type(ResultType::Number),
    ];

    let mut registry = BTreeMap::new();
    for function in functions {
        assert!(
            function.primary_type().is_some(),
            "function {} must declare at least one translation",
            function.name
        );
        registry.insert(function.name, function);
    }

    for (alias, target) in FUNCTION_ALIASES {
        if let Some(function) = registry.get(target).cloned() {
            registry.insert(alias, function);
        }
    }

    registry
}

fn duration_column_with_default() -> FunctionArg {
    FunctionArg::metric("column", METRIC_DURATION_COLUMNS)
        .with_default(ArgValue::String("transaction.duration".to_owned()))
}

/// Infers the result type from the metric in the `column` argument.
///
/// Duration metrics and span breakdowns report durations. Custom
/// measurements report by unit class, everything else is a plain number.
fn reflective_result_type(builder: &QueryBuilder<'_>, args: &Arguments) -> Option<ResultType> {
    let column = args.string("column").ok()?;

    if crate::constants::is_duration_metric(column) {
        return Some(ResultType::Duration);
    }

    if let Some(measurement) = builder.custom_measurement(column) {
        let unit = measurement.unit;
        return Some(if unit.is_duration() || unit.is_size() {
            ResultType::Unit(unit)
        } else if unit.is_none() {
            ResultType::Integer
        } else if unit.is_fraction() {
            ResultType::Percentage
        } else {
            ResultType::Number
        });
    }

    Some(ResultType::Number)
}

fn apply_alias(expr: Expr, alias: Option<&str>) -> Expr {
    match alias {
        Some(alias) => expr.aliased(alias),
        None => expr,
    }
}

/// The constant zero in the type count aggregates produce.
fn zero_count(alias: Option<&str>) -> Expr {
    apply_alias(Expr::function("toUInt64", [Expr::from(0i64)]), alias)
}

fn metric_condition(metric_id: i64) -> Expr {
    Expr::function("equals", [Expr::column("metric_id"), Expr::from(metric_id)])
}

fn count_if_expr(metric_condition: Expr, condition: Expr, alias: Option<&str>) -> Expr {
    apply_alias(
        Expr::function(
            "countIf",
            [
                Expr::column("value"),
                Expr::function("and", [metric_condition, condition]),
            ],
        ),
        alias,
    )
}

fn resolve_avg(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    Ok(apply_alias(
        Expr::function(
            "avgIf",
            [Expr::column("value"), metric_condition(args.id("metric_id")?)],
        ),
        alias,
    ))
}

fn resolve_apdex(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    if !args.is_null("satisfaction") {
        return Err(QueryError::incompatible(
            "cannot query apdex with a threshold parameter on the metrics dataset",
        ));
    }

    let satisfied = builder.resolve_tag_value(METRIC_SATISFIED_TAG_VALUE);
    let tolerated = builder.resolve_tag_value(METRIC_TOLERATED_TAG_VALUE);

    // Nothing is satisfied or tolerated, the score must be 0.
    if satisfied.is_none() && tolerated.is_none() {
        return Ok(zero_count(alias));
    }

    let satisfaction = builder.tag_column(METRIC_SATISFACTION_TAG_KEY)?;
    let satisfied_cond =
        Expr::function("equals", [satisfaction.clone(), tag_value_or_null(satisfied)]);
    let tolerable_cond = Expr::function("equals", [satisfaction, tag_value_or_null(tolerated)]);
    let metric_cond = Expr::function(
        "equals",
        [
            Expr::column("metric_id"),
            crate::thresholds::project_threshold_multi_if(builder)?,
        ],
    );

    Ok(apply_alias(
        Expr::function(
            "divide",
            [
                Expr::function(
                    "plus",
                    [
                        count_if_expr(metric_cond.clone(), satisfied_cond, None),
                        Expr::function(
                            "divide",
                            [
                                count_if_expr(metric_cond.clone(), tolerable_cond, None),
                                Expr::from(2i64),
                            ],
                        ),
                    ],
                ),
                Expr::function("countIf", [Expr::column("value"), metric_cond]),
            ],
        ),
        alias,
    ))
}

fn resolve_count_miserable(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    if !args.is_null("satisfaction") {
        return Err(QueryError::incompatible(
            "cannot query misery with a threshold parameter on the metrics dataset",
        ));
    }

    let frustrated = match builder.resolve_tag_value(METRIC_FRUSTRATED_TAG_VALUE) {
        Some(frustrated) => frustrated,
        // Nobody is miserable, we can return 0.
        None => return Ok(zero_count(alias)),
    };

    let satisfaction = builder.tag_column(METRIC_SATISFACTION_TAG_KEY)?;
    Ok(apply_alias(
        Expr::function(
            "uniqIf",
            [
                Expr::column("value"),
                Expr::function(
                    "and",
                    [
                        metric_condition(args.id("metric_id")?),
                        Expr::function("equals", [satisfaction, frustrated.into()]),
                    ],
                ),
            ],
        ),
        alias,
    ))
}

fn resolve_user_misery(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    if !args.is_null("satisfaction") {
        return Err(QueryError::incompatible(
            "cannot query user_misery with a threshold parameter on the metrics dataset",
        ));
    }

    let alpha = args.number("alpha")?;
    let beta = args.number("beta")?;

    let count_miserable =
        builder.compile_function(&AggregateCall::new("count_miserable", ["user"]), None)?;
    let count_unique =
        builder.compile_function(&AggregateCall::new("count_unique", ["user"]), None)?;

    Ok(apply_alias(
        Expr::function(
            "divide",
            [
                Expr::function("plus", [count_miserable, Expr::from(alpha)]),
                Expr::function(
                    "plus",
                    [
                        Expr::function("nullIf", [count_unique, Expr::from(0i64)]),
                        Expr::from(alpha + beta),
                    ],
                ),
            ],
        ),
        alias,
    ))
}

fn resolve_count_unparameterized(
    builder: &mut QueryBuilder<'_>,
    _args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let duration = builder.resolve_metric("transaction.duration")?;
    let transaction = builder.tag_column("transaction")?;
    let unparameterized = builder.resolve_tag_value(crate::constants::UNPARAMETERIZED_TRANSACTION);
    Ok(count_if_expr(
        metric_condition(duration),
        Expr::function("equals", [transaction, tag_value_or_null(unparameterized)]),
        alias,
    ))
}

fn resolve_count_null(
    builder: &mut QueryBuilder<'_>,
    _args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let duration = builder.resolve_metric("transaction.duration")?;
    let transaction = builder.tag_column("transaction")?;
    Ok(count_if_expr(
        metric_condition(duration),
        Expr::function("equals", [transaction, builder.missing_tag_value().into()]),
        alias,
    ))
}

fn resolve_count_has_transaction_name(
    builder: &mut QueryBuilder<'_>,
    _args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let duration = builder.resolve_metric("transaction.duration")?;
    let transaction = builder.tag_column("transaction")?;
    let unparameterized = builder.resolve_tag_value(crate::constants::UNPARAMETERIZED_TRANSACTION);
    Ok(count_if_expr(
        metric_condition(duration),
        Expr::function(
            "and",
            [
                Expr::function(
                    "notEquals",
                    [transaction.clone(), builder.missing_tag_value().into()],
                ),
                Expr::function("notEquals", [transaction, tag_value_or_null(unparameterized)]),
            ],
        ),
        alias,
    ))
}

fn resolve_percentile_fixed(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
    quantile: f64,
) -> Result<Expr, QueryError> {
    if !METRIC_PERCENTILES.contains(&quantile) {
        return Err(QueryError::incompatible(
            "custom quantile incompatible with metrics",
        ));
    }

    let metric_id = args.id("metric_id")?;

    // The sketch does not carry the true maximum, so the maximum quantile
    // must translate to a max aggregate.
    if quantile == 1.0 {
        return Ok(apply_alias(
            Expr::function(
                "maxIf",
                [Expr::column("value"), metric_condition(metric_id)],
            ),
            alias,
        ));
    }

    Ok(apply_alias(
        Expr::function(
            "arrayElement",
            [
                Expr::function(
                    format!("quantilesIf({quantile})"),
                    [Expr::column("value"), metric_condition(metric_id)],
                ),
                Expr::from(1i64),
            ],
        ),
        alias,
    ))
}

fn resolve_percentile(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let quantile = args.number("percentile")?;
    resolve_percentile_fixed(builder, args, alias, quantile)
}

fn resolve_p50(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    resolve_percentile_fixed(builder, args, alias, 0.5)
}

fn resolve_p75(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    resolve_percentile_fixed(builder, args, alias, 0.75)
}

fn resolve_p90(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    resolve_percentile_fixed(builder, args, alias, 0.9)
}

fn resolve_p95(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    resolve_percentile_fixed(builder, args, alias, 0.95)
}

fn resolve_p99(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    resolve_percentile_fixed(builder, args, alias, 0.99)
}

fn resolve_p100(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    resolve_percentile_fixed(builder, args, alias, 1.0)
}

fn simple_if_aggregate(
    function: &'static str,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    Ok(apply_alias(
        Expr::function(
            function,
            [Expr::column("value"), metric_condition(args.id("metric_id")?)],
        ),
        alias,
    ))
}

fn resolve_max(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    simple_if_aggregate("maxIf", args, alias)
}

fn resolve_min(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    simple_if_aggregate("minIf", args, alias)
}

fn resolve_sum(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    simple_if_aggregate("sumIf", args, alias)
}

fn resolve_sum_if(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    Ok(apply_alias(
        Expr::function(
            "sumIf",
            [
                Expr::column("value"),
                Expr::function(
                    "equals",
                    [args.expr("if_col")?.clone(), args.tag_expr("resolved_val")?],
                ),
            ],
        ),
        alias,
    ))
}

fn resolve_count_unique(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    Ok(apply_alias(
        Expr::function(
            "uniqIf",
            [Expr::column("value"), metric_condition(args.id("metric_id")?)],
        ),
        alias,
    ))
}

fn resolve_uniq(
    _builder: &mut QueryBuilder<'_>,
    _args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    Ok(apply_alias(
        Expr::function("uniq", [Expr::column("value")]),
        alias,
    ))
}

fn resolve_uniq_if(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    Ok(apply_alias(
        Expr::function(
            "uniqIf",
            [
                Expr::column("value"),
                Expr::function(
                    "equals",
                    [args.expr("if_col")?.clone(), args.tag_expr("resolved_val")?],
                ),
            ],
        ),
        alias,
    ))
}

fn resolve_count(
    builder: &mut QueryBuilder<'_>,
    _args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let duration = builder.resolve_metric("transaction.duration")?;
    Ok(apply_alias(
        Expr::function(
            "countIf",
            [Expr::column("value"), metric_condition(duration)],
        ),
        alias,
    ))
}

fn resolve_count_if(
    _builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let condition = args.string("condition")?.to_owned();
    let threshold = args.number("threshold")?;
    Ok(count_if_expr(
        metric_condition(args.id("metric_id")?),
        Expr::function(condition, [Expr::column("value"), Expr::from(threshold)]),
        alias,
    ))
}

fn resolve_count_web_vitals(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let metric_id = args.id("metric_id")?;
    let quality = args.string("quality")?.to_lowercase();

    if quality == "any" {
        return Ok(apply_alias(
            Expr::function(
                "countIf",
                [Expr::column("value"), metric_condition(metric_id)],
            ),
            alias,
        ));
    }

    let measurement_rating = builder.tag_column("measurement_rating")?;

    let quality_id = match builder.resolve_tag_value(&quality) {
        Some(quality_id) => quality_id,
        // This matches the type count aggregates produce in storage.
        None => return Ok(zero_count(alias)),
    };

    Ok(apply_alias(
        Expr::function(
            "countIf",
            [
                Expr::column("value"),
                Expr::function(
                    "and",
                    [
                        Expr::function("equals", [measurement_rating, quality_id.into()]),
                        metric_condition(metric_id),
                    ],
                ),
            ],
        ),
        alias,
    ))
}

fn resolve_epm(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let duration = builder.resolve_metric("transaction.duration")?;
    let interval = args.number("interval")?;
    Ok(apply_alias(
        Expr::function(
            "divide",
            [
                Expr::function(
                    "countIf",
                    [Expr::column("value"), metric_condition(duration)],
                ),
                Expr::function("divide", [Expr::from(interval), Expr::from(60i64)]),
            ],
        ),
        alias,
    ))
}

fn resolve_eps(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let duration = builder.resolve_metric("transaction.duration")?;
    let interval = args.number("interval")?;
    Ok(apply_alias(
        Expr::function(
            "divide",
            [
                Expr::function(
                    "countIf",
                    [Expr::column("value"), metric_condition(duration)],
                ),
                Expr::from(interval),
            ],
        ),
        alias,
    ))
}

fn resolve_failure_count(
    builder: &mut QueryBuilder<'_>,
    _args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let statuses: Vec<Expr> = NON_FAILURE_STATUS
        .iter()
        .filter_map(|status| builder.resolve_tag_value(status))
        .map(Into::into)
        .collect();

    let duration = builder.resolve_metric("transaction.duration")?;
    let status_column = builder.tag_column("transaction.status")?;

    Ok(count_if_expr(
        metric_condition(duration),
        Expr::function("notIn", [status_column, Expr::array(statuses)]),
        alias,
    ))
}

fn resolve_failure_rate(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let failure_count = resolve_failure_count(builder, args, None)?;
    let duration = builder.resolve_metric("transaction.duration")?;
    Ok(apply_alias(
        Expr::function(
            "divide",
            [
                failure_count,
                Expr::function(
                    "countIf",
                    [Expr::column("value"), metric_condition(duration)],
                ),
            ],
        ),
        alias,
    ))
}

fn resolve_histogram(
    builder: &mut QueryBuilder<'_>,
    args: &Arguments,
    alias: Option<&str>,
) -> Result<Expr, QueryError> {
    let metric_cond = metric_condition(args.id("metric_id")?);
    let condition = match builder.histogram_zoom().cloned() {
        Some(zoom) => Expr::function("and", [zoom, metric_cond]),
        None => metric_cond,
    };

    let buckets = builder
        .histogram_buckets()
        .unwrap_or(DEFAULT_HISTOGRAM_BUCKETS);

    if let Some(alias) = alias {
        builder.record_histogram_alias(alias);
    }

    Ok(apply_alias(
        Expr::function(
            format!("histogramIf({buckets})"),
            [Expr::column("value"), condition],
        ),
        alias,
    ))
}
