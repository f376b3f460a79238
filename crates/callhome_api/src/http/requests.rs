use crate::http::ApiError;
use chrono::{DateTime, Duration, DurationRound, Utc};
use common::domain::{PageMetadata, TelemetryFilters, TelemetryRecord};
use garde::Validate;
use serde::Deserialize;

pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;
/// Window used when `from` is omitted
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Heartbeat body posted by reporting clients
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveTelemetryRequest {
    #[serde(default)]
    #[garde(length(min = 1))]
    pub service: String,
    #[serde(default)]
    #[garde(length(min = 1))]
    pub ip_address: String,
    #[serde(default)]
    #[garde(skip)]
    pub mac_address: String,
    #[serde(default)]
    #[garde(skip)]
    pub deployment_id: Option<String>,
    #[serde(rename = "magistrala_version", default)]
    #[garde(length(min = 1))]
    pub version: String,
    #[serde(default)]
    #[garde(skip)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<SaveTelemetryRequest> for TelemetryRecord {
    fn from(req: SaveTelemetryRequest) -> Self {
        let last_seen = req.last_seen.unwrap_or_else(Utc::now);
        TelemetryRecord {
            service: req.service,
            ip_address: req.ip_address,
            mac_address: req.mac_address,
            deployment_id: req.deployment_id.filter(|id| !id.is_empty()),
            version: req.version,
            last_seen,
            timestamp: last_seen,
            ..Default::default()
        }
    }
}

/// Raw query string shared by the list, summary and dashboard endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveQuery {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub version: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveRequest {
    pub page: PageMetadata,
    pub filters: TelemetryFilters,
}

impl RetrieveQuery {
    /// Applies defaults relative to `now` and validates the result.
    ///
    /// Default bounds are rounded to the minute so that repeated dashboard
    /// loads land on the same cache key.
    pub fn into_request(self, now: DateTime<Utc>) -> Result<RetrieveRequest, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(ApiError::LimitSize(limit));
        }

        let from = match non_empty(self.from) {
            Some(raw) => parse_time("from", &raw)?,
            None => round_to_minute(now - Duration::days(DEFAULT_WINDOW_DAYS)),
        };
        let to = match non_empty(self.to) {
            Some(raw) => parse_time("to", &raw)?,
            None => round_to_minute(now),
        };
        if to < from {
            return Err(ApiError::InvalidDateRange);
        }

        Ok(RetrieveRequest {
            page: PageMetadata {
                total: 0,
                offset: self.offset.unwrap_or(0),
                limit,
            },
            filters: TelemetryFilters {
                from: Some(from),
                to: Some(to),
                country: non_empty(self.country),
                city: non_empty(self.city),
                version: non_empty(self.version),
                service: non_empty(self.service),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::InvalidQuery(format!("{}: {}", field, e)))
}

fn round_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_round(Duration::minutes(1)).unwrap_or(at)
}
