//! Conversion of search filters into storage predicates.
//!
//! Recognized filter keys carry their own validation and rewrites, most
//! notably the always-true and never-true special cases around empty
//! transaction names. Unregistered keys fall through to the generic tag
//! converter.

use itertools::Itertools;
use quarry_snql::{Condition, Expr, Op};

use crate::builder::QueryBuilder;
use crate::constants::{
    DEFAULT_DURATION_CEILING_MS, EVENT_TYPE_ALIAS, PROJECT_ALIAS, PROJECT_NAME_ALIAS,
    TEAM_KEY_TRANSACTION_ALIAS, TITLE_ALIAS,
};
use crate::error::QueryError;
use crate::resolver::tag_value_or_null;

/// The value side of a search filter.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    /// A single string value.
    String(String),
    /// A numeric value.
    Number(f64),
    /// A list of string values for `IN` style filters.
    StringList(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        Self::StringList(values)
    }
}

impl FilterValue {
    fn strings(&self) -> Option<Vec<&str>> {
        match self {
            Self::String(value) => Some(vec![value.as_str()]),
            Self::StringList(values) => Some(values.iter().map(String::as_str).collect()),
            Self::Number(_) => None,
        }
    }
}

/// A single parsed search filter, such as `event.type:transaction`.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchFilter {
    /// The filter key.
    pub key: String,
    /// The comparison operator.
    pub op: Op,
    /// The value to compare against.
    pub value: FilterValue,
}

impl SearchFilter {
    /// Creates a search filter.
    pub fn new(key: impl Into<String>, op: Op, value: impl Into<FilterValue>) -> Self {
        Self {
            key: key.into(),
            op,
            value: value.into(),
        }
    }
}

/// Converts a search filter into a predicate, if one is needed.
///
/// Filters that are statically known to match every row convert to `None`
/// rather than a predicate.
pub(crate) fn convert(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    match filter.key.as_str() {
        PROJECT_ALIAS | PROJECT_NAME_ALIAS => project_slug(builder, filter),
        EVENT_TYPE_ALIAS => event_type(filter),
        TEAM_KEY_TRANSACTION_ALIAS => team_key_transaction(builder, filter),
        "transaction.duration" => duration(builder, filter),
        "environment" => environment(builder, filter),
        "transaction" | "tags[transaction]" | TITLE_ALIAS => transaction(builder, filter),
        _ => generic(builder, filter),
    }
}

/// Only transaction events exist in this dataset, so the filter is a no-op
/// for that value and unsatisfiable for every other.
fn event_type(filter: &SearchFilter) -> Result<Option<Condition>, QueryError> {
    match &filter.value {
        FilterValue::String(value) if value == "transaction" => Ok(None),
        _ => Err(QueryError::incompatible(
            "can only filter event.type:transaction",
        )),
    }
}

fn transaction(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    if let FilterValue::String(value) = &filter.value
        && value.is_empty()
    {
        match filter.op {
            // Unnamed transactions are normalized into a placeholder name, so
            // every row has a transaction.
            Op::Eq => {
                return Err(QueryError::invalid_search(
                    "all events have a transaction so this query wouldn't return anything",
                ));
            }
            Op::NotEq => return Ok(None),
            _ => (),
        }
    }

    let column = builder.tag_column("transaction")?;
    let rhs = match &filter.value {
        FilterValue::String(value) => tag_value_or_null(builder.resolve_tag_value(value)),
        FilterValue::StringList(values) => Expr::array(
            values
                .iter()
                .map(|value| tag_value_or_null(builder.resolve_tag_value(value)))
                .collect::<Vec<_>>(),
        ),
        FilterValue::Number(_) => {
            return Err(QueryError::invalid_search(
                "transaction filters expect a string value",
            ));
        }
    };

    Ok(Some(Condition::new(column, filter.op, rhs)))
}

fn environment(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    let raw = filter.value.strings().ok_or_else(|| {
        QueryError::invalid_search("environment filters expect a string value")
    })?;

    let mut values = Vec::new();
    for value in raw.iter().unique() {
        if value.is_empty() {
            // No recorded environment is stored as the missing tag.
            values.push(builder.missing_tag_value());
        } else if let Some(resolved) = builder.resolve_tag_value(value) {
            values.push(resolved);
        }
    }

    let values: Vec<_> = values.into_iter().sorted().dedup().collect();

    let environment = builder.tag_column("environment")?;
    let positive = matches!(filter.op, Op::Eq | Op::In);
    Ok(match values.len() {
        0 => None,
        1 => {
            let op = if positive { Op::Eq } else { Op::NotEq };
            let value = values.into_iter().next().map(Expr::from);
            value.map(|value| Condition::new(environment, op, value))
        }
        _ => {
            let op = if positive { Op::In } else { Op::NotIn };
            let values = values.into_iter().map(Expr::from).collect::<Vec<_>>();
            Some(Condition::new(environment, op, Expr::array(values)))
        }
    })
}

fn duration(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    // Callers attach a default 15 minute duration cutoff to validation-only
    // queries. It must not constrain the validation itself.
    if builder.params().dry_run
        && filter.op == Op::Lt
        && filter.value == FilterValue::Number(DEFAULT_DURATION_CEILING_MS)
    {
        return Ok(None);
    }

    metric_value(builder, filter)
}

/// Filters on metric values scope the comparison to rows of that metric.
///
/// Rows of other metrics pass the predicate unconditionally, since a metric
/// filter must not exclude data the query aggregates separately.
fn metric_value(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    let FilterValue::Number(bound) = filter.value else {
        return Err(QueryError::invalid_search(format!(
            "{} filters expect a numeric value",
            filter.key
        )));
    };

    let Some(function) = filter.op.function_name() else {
        return Err(QueryError::invalid_search(format!(
            "invalid operator for a {} filter",
            filter.key
        )));
    };

    let metric_id = builder.resolve_metric(&filter.key)?;
    Ok(Some(Condition::boolean(Expr::function(
        "or",
        [
            Expr::function("notEquals", [Expr::column("metric_id"), Expr::from(metric_id)]),
            Expr::function(function, [Expr::column("value"), Expr::from(bound)]),
        ],
    ))))
}

fn team_key_transaction(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    let FilterValue::String(value) = &filter.value else {
        return Err(invalid_team_key());
    };

    let expr = builder.resolve_field_alias(TEAM_KEY_TRANSACTION_ALIAS)?;
    Ok(Some(match (value.as_str(), filter.op) {
        ("", Op::NotEq) => Condition::new(expr, Op::NotEq, 0i64),
        ("", _) => Condition::new(expr, Op::Eq, 0i64),
        ("1", _) => Condition::new(expr, Op::Eq, 1i64),
        ("0", _) => Condition::new(expr, Op::Eq, 0i64),
        _ => return Err(invalid_team_key()),
    }))
}

fn invalid_team_key() -> QueryError {
    QueryError::invalid_search(
        "invalid value for team_key_transaction condition, accepted values are 1, 0",
    )
}

fn project_slug(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    let slugs = filter.value.strings().ok_or_else(|| {
        QueryError::invalid_search("project filters expect a string value")
    })?;

    if filter.op == Op::Eq && slugs.iter().any(|slug| slug.is_empty()) {
        return Err(QueryError::invalid_search(
            "cannot query for has:project or project:\"\" as every event will have a project",
        ));
    }

    let positive = matches!(filter.op, Op::Eq | Op::In);
    let mut ids = Vec::new();
    let mut missing = Vec::new();
    for slug in &slugs {
        match builder.params().project_slugs.get(*slug) {
            Some(project) => ids.push(project.value()),
            None => missing.push(*slug),
        }
    }

    if positive && !missing.is_empty() {
        return Err(QueryError::invalid_search(format!(
            "invalid query, project(s) {} do not exist or are not actively selected",
            missing.join(", ")
        )));
    }

    ids.sort_unstable();
    let Some(&first) = ids.first() else {
        return Ok(None);
    };

    Ok(Some(match &filter.value {
        FilterValue::String(_) => Condition::new(Expr::column("project_id"), filter.op, first),
        _ => {
            let op = if positive { Op::In } else { Op::NotIn };
            let ids = ids.into_iter().map(Expr::from).collect::<Vec<_>>();
            Condition::new(Expr::column("project_id"), op, Expr::array(ids))
        }
    }))
}

fn generic(
    builder: &mut QueryBuilder<'_>,
    filter: &SearchFilter,
) -> Result<Option<Condition>, QueryError> {
    // Filters on metric-valued fields compare the value column, anything
    // else is a tag comparison.
    if crate::constants::metric_mri(&filter.key).is_some()
        || builder.custom_measurement(&filter.key).is_some()
    {
        return metric_value(builder, filter);
    }

    let column = builder.tag_column(&filter.key)?;
    let rhs = match &filter.value {
        FilterValue::String(value) => tag_value_or_null(builder.resolve_tag_value(value)),
        FilterValue::Number(value) => {
            tag_value_or_null(builder.resolve_tag_value(&format_number(*value)))
        }
        FilterValue::StringList(values) => Expr::array(
            values
                .iter()
                .map(|value| tag_value_or_null(builder.resolve_tag_value(value)))
                .collect::<Vec<_>>(),
        ),
    };

    Ok(Some(Condition::new(column, filter.op, rhs)))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
