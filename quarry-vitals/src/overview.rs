use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quarry_base_schema::organization::OrganizationId;
use quarry_base_schema::project::ProjectId;
use quarry_query::constants::{DEFAULT_DURATION_CEILING_MS, EVENT_TYPE_ALIAS};
use quarry_query::{
    AggregateCall, MetricIndexer, QueryParams, QueryRequest, SearchFilter, SelectedColumn,
    ThresholdStore, compile_query,
};
use quarry_snql::{Op, Row, StorageExecutor};
use serde::{Deserialize, Serialize};

use crate::cache::VitalsCache;
use crate::error::VitalsError;
use crate::snapshot::{ProjectVitals, VitalSet, VitalsSnapshot};

/// Maximum number of projects a vitals overview may aggregate.
///
/// At or above this count the project list is likely truncated, and an
/// aggregate over a partial project set would be misleading. The overview
/// returns the canonical empty snapshot instead.
pub const VITALS_PROJECT_LIMIT: usize = 300;

/// Vitals are recomputed at most once per this interval per organization.
const CACHE_TTL: Duration = Duration::from_secs(4 * 3600);

/// The measurements aggregated by the overview.
///
/// Web vitals first, mobile start times second.
const VITAL_COLUMNS: &[&str] = &[
    "measurements.lcp",
    "measurements.fcp",
    "measurements.app_start_cold",
    "measurements.app_start_warm",
];

const ORG_REFERRER: &str = "api.organization-vitals";
const PROJECT_REFERRER: &str = "api.organization-vitals-per-project";

/// The scope of one vitals overview request.
#[derive(Clone, Debug)]
pub struct VitalsRequest {
    /// The organization to aggregate vitals for.
    pub organization: OrganizationId,
    /// All active projects of the organization.
    pub projects: Vec<ProjectId>,
    /// The projects the caller may see per-project data for.
    ///
    /// Organization-wide aggregates cover all projects. The per-project
    /// breakdown is filtered to this set after cache retrieval, since
    /// access differs per caller while the cached data does not.
    pub accessible_projects: BTreeSet<ProjectId>,
}

/// Raw query results cached per organization.
#[derive(Debug, Deserialize, Serialize)]
struct VitalsData {
    org: Vec<Row>,
    projects: Vec<Row>,
}

/// Computes organization-wide web and mobile vitals.
///
/// The overview issues two queries over the trailing seven days, one
/// aggregated across the organization and one broken down by project, and
/// renders them into a [`VitalsSnapshot`]. Raw results are cached per
/// organization, so repeated requests within the cache lifetime hit storage
/// only once regardless of the caller.
pub struct VitalsOverview<'a> {
    executor: &'a dyn StorageExecutor,
    cache: &'a dyn VitalsCache,
    indexer: &'a dyn MetricIndexer,
    thresholds: &'a dyn ThresholdStore,
}

impl<'a> VitalsOverview<'a> {
    /// Creates an overview service on the given collaborators.
    pub fn new(
        executor: &'a dyn StorageExecutor,
        cache: &'a dyn VitalsCache,
        indexer: &'a dyn MetricIndexer,
        thresholds: &'a dyn ThresholdStore,
    ) -> Self {
        Self {
            executor,
            cache,
            indexer,
            thresholds,
        }
    }

    /// Computes the vitals snapshot for the requested scope.
    ///
    /// The query range covers the seven days up to `now`. Returns the
    /// canonical empty snapshot when the project count is at the limit or
    /// no data was recorded for any vital.
    pub async fn compute(
        &self,
        request: &VitalsRequest,
        now: DateTime<Utc>,
    ) -> Result<VitalsSnapshot, VitalsError> {
        if request.projects.len() >= VITALS_PROJECT_LIMIT {
            quarry_log::debug!(
                organization = request.organization.value(),
                projects = request.projects.len(),
                "too many projects for a vitals overview"
            );
            return Ok(VitalsSnapshot::default());
        }

        let data = self.vital_data(request, now).await?;
        build_snapshot(request, &data)
    }

    /// Returns the raw vitals data, querying storage on a cache miss.
    async fn vital_data(
        &self,
        request: &VitalsRequest,
        now: DateTime<Utc>,
    ) -> Result<VitalsData, VitalsError> {
        let key = format!(
            "organization-vitals-overview:{}",
            request.organization.value()
        );

        if let Some(raw) = self.cache.get(&key).await? {
            match serde_json::from_str(&raw) {
                Ok(data) => return Ok(data),
                Err(error) => quarry_log::warn!(
                    error = %error,
                    organization = request.organization.value(),
                    "discarding malformed cached vitals data"
                ),
            }
        }

        let data = self.query_vitals(request, now).await?;

        match serde_json::to_string(&data) {
            Ok(raw) => self.cache.set(&key, raw, CACHE_TTL).await?,
            Err(error) => quarry_log::error!(
                "failed to serialize vitals data for caching: {}",
                quarry_log::LogError(&error)
            ),
        }

        Ok(data)
    }

    /// Compiles and runs the organization and per-project queries.
    async fn query_vitals(
        &self,
        request: &VitalsRequest,
        now: DateTime<Utc>,
    ) -> Result<VitalsData, VitalsError> {
        let params = QueryParams::new(
            request.organization,
            request.projects.clone(),
            now - chrono::Duration::days(7),
            now,
        );

        let organization = QueryRequest {
            selected_columns: vital_columns(),
            filters: vec![
                SearchFilter::new(EVENT_TYPE_ALIAS, Op::Eq, "transaction"),
                SearchFilter::new("transaction.duration", Op::Lt, DEFAULT_DURATION_CEILING_MS),
            ],
            limit: Some(VITALS_PROJECT_LIMIT as u32),
        };

        let mut per_project = organization.clone();
        per_project
            .selected_columns
            .insert(0, SelectedColumn::from("project_id"));

        let organization = compile_query(&params, &organization, self.indexer, self.thresholds)?;
        let per_project = compile_query(&params, &per_project, self.indexer, self.thresholds)?;

        // The two queries share no state and are merged only afterwards.
        let (org, projects) = futures::try_join!(
            self.executor.execute(&organization, ORG_REFERRER),
            self.executor.execute(&per_project, PROJECT_REFERRER),
        )?;

        quarry_log::debug!(
            organization = request.organization.value(),
            org_rows = org.data.len(),
            project_rows = projects.data.len(),
            "fetched vitals data"
        );

        Ok(VitalsData {
            org: org.data,
            projects: projects.data,
        })
    }
}

/// Renders raw vitals data into the response snapshot.
fn build_snapshot(
    request: &VitalsRequest,
    data: &VitalsData,
) -> Result<VitalsSnapshot, VitalsError> {
    let Some(org_row) = data.org.first() else {
        quarry_log::debug!(
            organization = request.organization.value(),
            "no vitals data for organization"
        );
        return Ok(VitalsSnapshot::default());
    };

    let mut snapshot = VitalsSnapshot {
        vitals: VitalSet::from_row(org_row)?,
        project_data: Vec::new(),
    };

    for row in &data.projects {
        let project = ProjectVitals::from_row(row)?;
        if request
            .accessible_projects
            .contains(&ProjectId::new(project.project_id))
        {
            snapshot.project_data.push(project);
        }
    }

    Ok(snapshot)
}

/// The aggregates of both overview queries, in result column order.
fn vital_columns() -> Vec<SelectedColumn> {
    let percentiles = VITAL_COLUMNS
        .iter()
        .map(|column| AggregateCall::new("p75", [*column]).into());
    let counts = VITAL_COLUMNS
        .iter()
        .map(|column| AggregateCall::new("count_if", [*column, "greaterOrEquals", "0"]).into());

    percentiles.chain(counts).collect()
}
