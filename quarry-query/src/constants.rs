//! Static mappings and limits of the metrics dataset.

/// The sentinel index assigned by dry-run resolution.
///
/// Dry runs validate query shape without consulting the indexer, so every
/// resolution yields this value and the compiled query must never execute.
pub const DRY_RUN_INDEX: i64 = -1;

/// Maximum combined number of project and transaction threshold rows.
///
/// Threshold configuration translates into fixed-size lookup arrays inside
/// the query, so the fan-out is a resource concern and queries over the
/// ceiling are rejected rather than truncated.
pub const MAX_QUERYABLE_TRANSACTION_THRESHOLDS: usize = 500;

/// The quantiles precomputed by the distribution sketch.
///
/// The maximum is listed here but translates to a max-aggregate, since the
/// sketch does not carry the true maximum.
pub const METRIC_PERCENTILES: &[f64] = &[0.5, 0.75, 0.9, 0.95, 0.99, 1.0];

/// Alpha constant of the user misery formula.
pub const MISERY_ALPHA: f64 = 5.8875;

/// Beta constant of the user misery formula.
pub const MISERY_BETA: f64 = 111.8625;

/// Transaction statuses that do not count as failures.
pub const NON_FAILURE_STATUS: &[&str] = &["ok", "cancelled", "unknown"];

/// The tag key holding the satisfaction rating of a transaction.
pub const METRIC_SATISFACTION_TAG_KEY: &str = "satisfaction";

/// Satisfaction tag value for satisfied transactions.
pub const METRIC_SATISFIED_TAG_VALUE: &str = "satisfied";

/// Satisfaction tag value for tolerated transactions.
pub const METRIC_TOLERATED_TAG_VALUE: &str = "tolerated";

/// Satisfaction tag value for frustrated transactions.
pub const METRIC_FRUSTRATED_TAG_VALUE: &str = "frustrated";

/// The normalized name of transactions without a usable name.
pub const UNPARAMETERIZED_TRANSACTION: &str = "<< unparameterized >>";

/// The duration bound of the caller-side default filter, in milliseconds.
///
/// Dry runs treat a `transaction.duration < 900000` filter as the default
/// 15 minute cutoff and skip it rather than constraining validation.
pub const DEFAULT_DURATION_CEILING_MS: f64 = 900_000.0;

/// Number of buckets of the default metrics histogram.
pub const DEFAULT_HISTOGRAM_BUCKETS: u32 = 250;

/// The field alias selecting the project slug.
pub const PROJECT_ALIAS: &str = "project";

/// The alternate field alias selecting the project slug.
pub const PROJECT_NAME_ALIAS: &str = "project.name";

/// The field alias for transaction names in issue-style queries.
pub const TITLE_ALIAS: &str = "title";

/// The filter key restricting the queried event type.
pub const EVENT_TYPE_ALIAS: &str = "event.type";

/// The field alias marking transactions starred by the caller's teams.
pub const TEAM_KEY_TRANSACTION_ALIAS: &str = "team_key_transaction";

/// The alias of the resolved threshold configuration expression.
pub const PROJECT_THRESHOLD_CONFIG_ALIAS: &str = "project_threshold_config";

/// The threshold metric assumed for projects without configuration.
pub const DEFAULT_PROJECT_THRESHOLD_METRIC: &str = "duration";

pub(crate) const PROJECT_THRESHOLD_CONFIG_INDEX_ALIAS: &str = "project_threshold_config_index";

pub(crate) const PROJECT_THRESHOLD_OVERRIDE_CONFIG_INDEX_ALIAS: &str =
    "project_threshold_override_config_index";

/// Aggregate function names that are aliases for another registered function.
pub const FUNCTION_ALIASES: &[(&str, &str)] = &[("tpm", "epm"), ("tps", "eps")];

/// Returns the resource identifier for a public metric field name.
///
/// Only transaction metrics are queryable. Custom measurements resolve
/// through the caller-supplied measurement descriptors instead.
pub fn metric_mri(name: &str) -> Option<&'static str> {
    Some(match name {
        "measurements.app_start_cold" => "d:transactions/measurements.app_start_cold@millisecond",
        "measurements.app_start_warm" => "d:transactions/measurements.app_start_warm@millisecond",
        "measurements.cls" => "d:transactions/measurements.cls@none",
        "measurements.fcp" => "d:transactions/measurements.fcp@millisecond",
        "measurements.fid" => "d:transactions/measurements.fid@millisecond",
        "measurements.fp" => "d:transactions/measurements.fp@millisecond",
        "measurements.frames_frozen" => "d:transactions/measurements.frames_frozen@none",
        "measurements.frames_frozen_rate" => {
            "d:transactions/measurements.frames_frozen_rate@ratio"
        }
        "measurements.frames_slow" => "d:transactions/measurements.frames_slow@none",
        "measurements.frames_slow_rate" => "d:transactions/measurements.frames_slow_rate@ratio",
        "measurements.frames_total" => "d:transactions/measurements.frames_total@none",
        "measurements.lcp" => "d:transactions/measurements.lcp@millisecond",
        "measurements.stall_count" => "d:transactions/measurements.stall_count@none",
        "measurements.stall_longest_time" => {
            "d:transactions/measurements.stall_longest_time@millisecond"
        }
        "measurements.stall_percentage" => "d:transactions/measurements.stall_percentage@ratio",
        "measurements.stall_total_time" => {
            "d:transactions/measurements.stall_total_time@millisecond"
        }
        "measurements.ttfb" => "d:transactions/measurements.ttfb@millisecond",
        "measurements.ttfb.requesttime" => {
            "d:transactions/measurements.ttfb.requesttime@millisecond"
        }
        "spans.browser" => "d:transactions/breakdowns.span_ops.ops.browser@millisecond",
        "spans.db" => "d:transactions/breakdowns.span_ops.ops.db@millisecond",
        "spans.http" => "d:transactions/breakdowns.span_ops.ops.http@millisecond",
        "spans.resource" => "d:transactions/breakdowns.span_ops.ops.resource@millisecond",
        "spans.ui" => "d:transactions/breakdowns.span_ops.ops.ui@millisecond",
        "transaction.duration" => "d:transactions/duration@millisecond",
        "user" => "s:transactions/user@none",
        _ => return None,
    })
}

/// Returns `true` if the public field name maps to a duration-valued metric.
pub fn is_duration_metric(name: &str) -> bool {
    metric_mri(name).is_some_and(|mri| mri.ends_with("@millisecond"))
}

/// Returns `true` if the name matches the custom measurement pattern.
///
/// Custom measurements share the `measurements.` prefix with the well-known
/// ones but have no static mapping.
pub fn is_custom_measurement(name: &str) -> bool {
    name.starts_with("measurements.") && metric_mri(name).is_none()
}
