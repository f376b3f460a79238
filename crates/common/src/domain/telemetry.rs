use crate::domain::result::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One heartbeat reported by a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Every service ever reported by this deployment (read path only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(skip)]
    pub ip_address: String,
    #[serde(skip)]
    pub mac_address: String,
    #[serde(skip)]
    pub deployment_id: Option<String>,
    #[serde(rename = "magistrala_version", default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Client-side instant, stored in the `service_time` column
    pub last_seen: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,
    /// Receipt instant, the primary ordering column `time`
    pub timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Identity used to collapse heartbeats into deployments.
    pub fn deployment_key(&self) -> &str {
        match self.deployment_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.ip_address,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPage {
    #[serde(flatten)]
    pub page: PageMetadata,
    pub telemetry: Vec<TelemetryRecord>,
}

/// Query predicate over heartbeats. `None` leaves that dimension unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TelemetryFilters {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub version: Option<String>,
    pub service: Option<String>,
}

impl TelemetryFilters {
    pub fn is_empty(&self) -> bool {
        self == &TelemetryFilters::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountrySummary {
    pub country: String,
    #[serde(rename = "number_of_deployments")]
    pub deployments: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<CountrySummary>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub cities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub services: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub versions: BTreeSet<String>,
    #[serde(default)]
    pub total_deployments: u64,
}

/// Repository trait for the telemetry time-series table
/// Infrastructure layer (e.g., postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Persist one heartbeat inside a single transaction
    async fn save(&self, record: TelemetryRecord) -> DomainResult<()>;

    /// Latest heartbeat per deployment, newest first, paginated
    async fn retrieve_all(
        &self,
        page: PageMetadata,
        filters: TelemetryFilters,
    ) -> DomainResult<TelemetryPage>;

    /// Per-country deployment counts plus distinct cities, services and versions
    async fn retrieve_summary(&self, filters: TelemetryFilters) -> DomainResult<TelemetrySummary>;
}
