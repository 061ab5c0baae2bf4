use quarry_snql::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VitalsError;

/// Maps vitals query result columns to their API field names.
///
/// The table is exact in both directions: every overview column appears
/// here, and a result column outside this table (other than `project_id`,
/// which maps to `projectId`) fails the overview instead of being dropped.
pub const NAME_MAPPING: &[(&str, &str)] = &[
    ("p75_measurements_fcp", "FCP"),
    ("p75_measurements_lcp", "LCP"),
    ("p75_measurements_app_start_warm", "appStartWarm"),
    ("p75_measurements_app_start_cold", "appStartCold"),
    ("count_if_measurements_fcp_greaterOrEquals_0", "fcpCount"),
    ("count_if_measurements_lcp_greaterOrEquals_0", "lcpCount"),
    ("count_if_measurements_app_start_warm_greaterOrEquals_0", "appWarmStartCount"),
    ("count_if_measurements_app_start_cold_greaterOrEquals_0", "appColdStartCount"),
];

/// The aggregated vitals of one scope.
///
/// Web vitals cover the paint measurements, mobile vitals the application
/// start times. Percentiles are `None` where the scope recorded no data;
/// counts are zero there.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSet {
    /// The 75th percentile of the first contentful paint, in milliseconds.
    #[serde(rename = "FCP")]
    pub fcp: Option<f64>,
    /// The 75th percentile of the largest contentful paint, in milliseconds.
    #[serde(rename = "LCP")]
    pub lcp: Option<f64>,
    /// The 75th percentile of the warm application start, in milliseconds.
    pub app_start_warm: Option<f64>,
    /// The 75th percentile of the cold application start, in milliseconds.
    pub app_start_cold: Option<f64>,
    /// Number of transactions carrying a first contentful paint.
    pub fcp_count: u64,
    /// Number of transactions carrying a largest contentful paint.
    pub lcp_count: u64,
    /// Number of transactions carrying a warm application start.
    pub app_warm_start_count: u64,
    /// Number of transactions carrying a cold application start.
    pub app_cold_start_count: u64,
}

impl VitalSet {
    /// Parses a vitals result row.
    pub(crate) fn from_row(row: &Row) -> Result<Self, VitalsError> {
        let mut vitals = Self::default();
        for (column, value) in row {
            vitals.apply(column, value)?;
        }
        Ok(vitals)
    }

    fn apply(&mut self, column: &str, value: &Value) -> Result<(), VitalsError> {
        match column {
            "p75_measurements_fcp" => self.fcp = value.as_f64(),
            "p75_measurements_lcp" => self.lcp = value.as_f64(),
            "p75_measurements_app_start_warm" => self.app_start_warm = value.as_f64(),
            "p75_measurements_app_start_cold" => self.app_start_cold = value.as_f64(),
            "count_if_measurements_fcp_greaterOrEquals_0" => {
                self.fcp_count = value.as_u64().unwrap_or_default();
            }
            "count_if_measurements_lcp_greaterOrEquals_0" => {
                self.lcp_count = value.as_u64().unwrap_or_default();
            }
            "count_if_measurements_app_start_warm_greaterOrEquals_0" => {
                self.app_warm_start_count = value.as_u64().unwrap_or_default();
            }
            "count_if_measurements_app_start_cold_greaterOrEquals_0" => {
                self.app_cold_start_count = value.as_u64().unwrap_or_default();
            }
            _ => return Err(VitalsError::UnmappedColumn(column.to_owned())),
        }

        Ok(())
    }
}

/// The vitals of a single project.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVitals {
    /// The project the vitals belong to.
    pub project_id: u64,
    /// The project's aggregated vitals.
    #[serde(flatten)]
    pub vitals: VitalSet,
}

impl ProjectVitals {
    /// Parses a per-project vitals result row.
    pub(crate) fn from_row(row: &Row) -> Result<Self, VitalsError> {
        let mut project_id = None;
        let mut vitals = VitalSet::default();

        for (column, value) in row {
            if column.as_str() == "project_id" {
                project_id = value.as_u64();
            } else {
                vitals.apply(column, value)?;
            }
        }

        match project_id {
            Some(project_id) => Ok(Self { project_id, vitals }),
            None => Err(VitalsError::MissingProjectId),
        }
    }
}

/// The complete vitals overview of an organization.
///
/// The default value is the canonical empty snapshot: all percentiles null,
/// all counts zero, no per-project data. It is returned whenever the
/// overview cannot produce a meaningful aggregate.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsSnapshot {
    /// The organization-wide vitals.
    #[serde(flatten)]
    pub vitals: VitalSet,
    /// Per-project vitals for the projects the caller can access.
    pub project_data: Vec<ProjectVitals>,
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_name_mapping_bijective() {
        let columns: BTreeSet<_> = NAME_MAPPING.iter().map(|(column, _)| column).collect();
        let names: BTreeSet<_> = NAME_MAPPING.iter().map(|(_, name)| name).collect();

        assert_eq!(columns.len(), NAME_MAPPING.len());
        assert_eq!(names.len(), NAME_MAPPING.len());
    }

    #[test]
    fn test_all_mapped_columns_parse() {
        let mut vitals = VitalSet::default();
        for (column, _) in NAME_MAPPING {
            vitals.apply(column, &Value::from(1.0)).unwrap();
        }
    }

    #[test]
    fn test_api_names_match_mapping() {
        let rendered = serde_json::to_value(VitalSet::default()).unwrap();
        let object = rendered.as_object().unwrap();

        assert_eq!(object.len(), NAME_MAPPING.len());
        for (_, name) in NAME_MAPPING {
            assert!(object.contains_key(*name), "{name} missing");
        }
    }

    #[test]
    fn test_unmapped_column_fails() {
        let mut row = Row::new();
        row.insert("p99_measurements_lcp".to_owned(), Value::from(1.0));

        let error = VitalSet::from_row(&row).unwrap_err();
        assert!(
            matches!(error, VitalsError::UnmappedColumn(column) if column == "p99_measurements_lcp")
        );
    }

    #[test]
    fn test_project_row_requires_project_id() {
        let mut row = Row::new();
        row.insert("p75_measurements_lcp".to_owned(), Value::from(1.0));

        let error = ProjectVitals::from_row(&row).unwrap_err();
        assert!(matches!(error, VitalsError::MissingProjectId));
    }

    #[test]
    fn test_canonical_empty_snapshot() {
        insta::assert_json_snapshot!(VitalsSnapshot::default(), @r###"
        {
          "FCP": null,
          "LCP": null,
          "appStartWarm": null,
          "appStartCold": null,
          "fcpCount": 0,
          "lcpCount": 0,
          "appWarmStartCount": 0,
          "appColdStartCount": 0,
          "projectData": []
        }
        "###);
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut row = Row::new();
        row.insert("p75_measurements_lcp".to_owned(), Value::from(2506.5));
        row.insert("p75_measurements_fcp".to_owned(), Value::from(1204.0));
        row.insert("p75_measurements_app_start_cold".to_owned(), Value::Null);
        row.insert("p75_measurements_app_start_warm".to_owned(), Value::Null);
        row.insert(
            "count_if_measurements_lcp_greaterOrEquals_0".to_owned(),
            Value::from(42u64),
        );
        row.insert(
            "count_if_measurements_fcp_greaterOrEquals_0".to_owned(),
            Value::from(40u64),
        );

        let mut project_row = row.clone();
        project_row.insert("project_id".to_owned(), Value::from(13u64));

        let snapshot = VitalsSnapshot {
            vitals: VitalSet::from_row(&row).unwrap(),
            project_data: vec![ProjectVitals::from_row(&project_row).unwrap()],
        };

        insta::assert_json_snapshot!(snapshot, @r###"
        {
          "FCP": 1204.0,
          "LCP": 2506.5,
          "appStartWarm": null,
          "appStartCold": null,
          "fcpCount": 40,
          "lcpCount": 42,
          "appWarmStartCount": 0,
          "appColdStartCount": 0,
          "projectData": [
            {
              "projectId": 13,
              "FCP": 1204.0,
              "LCP": 2506.5,
              "appStartWarm": null,
              "appStartCold": null,
              "fcpCount": 40,
              "lcpCount": 42,
              "appWarmStartCount": 0,
              "appColdStartCount": 0
            }
          ]
        }
        "###);
    }
}
