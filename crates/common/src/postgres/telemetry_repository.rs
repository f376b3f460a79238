use crate::domain::{
    aggregate, DomainError, DomainResult, InvalidEventError, PageMetadata, SummaryRow,
    TelemetryFilters, TelemetryPage, TelemetryRecord, TelemetryRepository, TelemetrySummary,
    TransactionRollbackError,
};
use crate::postgres::{CancelOnDrop, FilterQuery, PostgresClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, info, instrument, warn};

/// invalid_text_representation
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
/// character_not_in_repertoire
const CHARACTER_NOT_IN_REPERTOIRE: &str = "22021";

const INSERT_TELEMETRY: &str = "INSERT INTO telemetry
     (ip_address, mac_address, deployment_id, longitude, latitude,
     mg_version, service, time, country, city, service_time)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

/// Telemetry row as read back from PostgreSQL
#[derive(Debug, Clone)]
pub struct TelemetryRow {
    pub ip_address: String,
    pub deployment_id: Option<String>,
    pub time: DateTime<Utc>,
    pub service_time: Option<DateTime<Utc>>,
    pub longitude: f64,
    pub latitude: f64,
    pub mg_version: Option<String>,
    pub service: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub services: Option<Vec<Option<String>>>,
}

impl TelemetryRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            ip_address: row.try_get("ip_address")?,
            deployment_id: row.try_get("deployment_id")?,
            time: row.try_get("time")?,
            service_time: row.try_get("service_time")?,
            longitude: row.try_get("longitude")?,
            latitude: row.try_get("latitude")?,
            mg_version: row.try_get("mg_version")?,
            service: row.try_get("service")?,
            country: row.try_get("country")?,
            city: row.try_get("city")?,
            services: row.try_get("services")?,
        })
    }
}

/// Convert database TelemetryRow to domain TelemetryRecord
impl From<TelemetryRow> for TelemetryRecord {
    fn from(row: TelemetryRow) -> Self {
        let mut services: Vec<String> = row
            .services
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        services.sort();

        TelemetryRecord {
            services,
            service: row.service.unwrap_or_default(),
            longitude: row.longitude,
            latitude: row.latitude,
            ip_address: row.ip_address,
            mac_address: String::new(),
            deployment_id: row.deployment_id,
            version: row.mg_version.unwrap_or_default(),
            last_seen: row.service_time.unwrap_or(row.time),
            country: row.country.unwrap_or_default(),
            city: row.city.unwrap_or_default(),
            timestamp: row.time,
        }
    }
}

fn summary_row(row: &Row) -> Result<SummaryRow, tokio_postgres::Error> {
    let deployments: i64 = row.try_get("number_of_deployments")?;
    let cities: Option<Vec<String>> = row.try_get("cities")?;
    let services: Option<Vec<String>> = row.try_get("services")?;
    let versions: Option<Vec<String>> = row.try_get("versions")?;
    let country: Option<String> = row.try_get("country")?;

    Ok(SummaryRow {
        country: country.unwrap_or_default(),
        deployments: deployments.max(0) as u64,
        cities: cities.unwrap_or_default(),
        services: services.unwrap_or_default(),
        versions: versions.unwrap_or_default(),
    })
}

/// Maps a failed insert to the cause reported under `SaveError`.
fn insert_failure(e: tokio_postgres::Error) -> anyhow::Error {
    if let Some(db_err) = e.as_db_error() {
        let code = db_err.code().code();
        if code == INVALID_TEXT_REPRESENTATION || code == CHARACTER_NOT_IN_REPERTOIRE {
            return InvalidEventError(db_err.message().to_string()).into();
        }
    }
    e.into()
}

/// Storage reader and writer for the `telemetry` time-series table
#[derive(Clone)]
pub struct PostgresTelemetryRepository {
    client: PostgresClient,
    query_timeout: Duration,
    max_limit: u64,
}

impl PostgresTelemetryRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self {
            client,
            query_timeout: Duration::from_secs(30),
            max_limit: 1000,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn with_max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = max_limit;
        self
    }

    /// Runs a read under the configured timeout. If the timeout elapses or the
    /// caller stops polling, the statement is cancelled on the server.
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DomainResult<Vec<Row>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::ReadError)?;

        let in_flight = CancelOnDrop::new(conn);
        let outcome = tokio::time::timeout(self.query_timeout, in_flight.query(sql, params)).await;
        match outcome {
            Ok(result) => {
                in_flight.release();
                result.map_err(DomainError::ReadError)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "telemetry query timed out"
                );
                in_flight.cancel().await;
                Err(DomainError::Cancelled(format!(
                    "query exceeded {:?}",
                    self.query_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl TelemetryRepository for PostgresTelemetryRepository {
    #[instrument(
        skip(self, record),
        fields(service = %record.service, deployment = %record.deployment_key())
    )]
    async fn save(&self, record: TelemetryRecord) -> DomainResult<()> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::SaveError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::SaveError(e.into()))?;

        let result = tx
            .execute(
                INSERT_TELEMETRY,
                &[
                    &record.ip_address,
                    &record.mac_address,
                    &record.deployment_id,
                    &record.longitude,
                    &record.latitude,
                    &record.version,
                    &record.service,
                    &record.timestamp,
                    &record.country,
                    &record.city,
                    &record.last_seen,
                ],
            )
            .await;

        if let Err(e) = result {
            let cause = insert_failure(e);
            if let Err(rollback) = tx.rollback().await {
                return Err(DomainError::SaveError(
                    TransactionRollbackError {
                        rollback: rollback.to_string(),
                        cause,
                    }
                    .into(),
                ));
            }
            return Err(DomainError::SaveError(cause));
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::SaveError(e.into()))?;

        info!("telemetry event saved");
        Ok(())
    }

    #[instrument(skip(self, filters), fields(offset = page.offset, limit = page.limit))]
    async fn retrieve_all(
        &self,
        page: PageMetadata,
        filters: TelemetryFilters,
    ) -> DomainResult<TelemetryPage> {
        if page.limit == 0 || page.limit > self.max_limit {
            return Err(DomainError::ValidationError(format!(
                "limit must be between 1 and {}, got {}",
                self.max_limit, page.limit
            )));
        }

        let limit = page.limit as i64;
        let offset = i64::try_from(page.offset)
            .map_err(|_| DomainError::ValidationError("offset is too large".to_string()))?;

        let mut query = FilterQuery::new(&filters);
        let limit_idx = query.push(&limit);
        let offset_idx = query.push(&offset);

        let sql = format!(
            "WITH latest_per_deployment AS (
                SELECT DISTINCT ON (COALESCE(deployment_id, ip_address))
                    ip_address, deployment_id, time, service_time, longitude, latitude,
                    mg_version, service, country, city
                FROM telemetry
                {}
                ORDER BY COALESCE(deployment_id, ip_address), time DESC
            ),
            limited AS (
                SELECT * FROM latest_per_deployment
                ORDER BY time DESC
                LIMIT ${} OFFSET ${}
            ),
            services_per_deployment AS (
                SELECT COALESCE(t.deployment_id, t.ip_address) AS id,
                       ARRAY_AGG(DISTINCT t.service) AS services
                FROM limited l
                INNER JOIN telemetry t
                    ON COALESCE(t.deployment_id, t.ip_address)
                     = COALESCE(l.deployment_id, l.ip_address)
                GROUP BY COALESCE(t.deployment_id, t.ip_address)
            )
            SELECT l.ip_address, l.deployment_id, l.time, l.service_time, l.longitude, l.latitude,
                   l.mg_version, l.service, l.country, l.city, s.services
            FROM limited l
            LEFT JOIN services_per_deployment s
                ON COALESCE(l.deployment_id, l.ip_address) = s.id
            ORDER BY l.time DESC",
            query.where_clause(),
            limit_idx,
            offset_idx
        );

        let rows = self.query(&sql, query.params()).await?;

        let telemetry = rows
            .iter()
            .map(|row| TelemetryRow::from_row(row).map(TelemetryRecord::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::ReadError(e.into()))?;

        debug!(count = telemetry.len(), "retrieved telemetry page");

        Ok(TelemetryPage {
            page: PageMetadata {
                total: telemetry.len() as u64,
                offset: page.offset,
                limit: page.limit,
            },
            telemetry,
        })
    }

    #[instrument(skip(self, filters))]
    async fn retrieve_summary(&self, filters: TelemetryFilters) -> DomainResult<TelemetrySummary> {
        let query = FilterQuery::new(&filters);

        let sql = format!(
            "SELECT
                country,
                COUNT(DISTINCT COALESCE(deployment_id, ip_address)) AS number_of_deployments,
                ARRAY_AGG(DISTINCT city) FILTER (WHERE city IS NOT NULL) AS cities,
                ARRAY_AGG(DISTINCT service) FILTER (WHERE service IS NOT NULL) AS services,
                ARRAY_AGG(DISTINCT mg_version) FILTER (WHERE mg_version IS NOT NULL) AS versions
            FROM telemetry
            {}
            GROUP BY country",
            query.where_clause()
        );

        let rows = self.query(&sql, query.params()).await?;

        let summary_rows = rows
            .iter()
            .map(summary_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DomainError::ReadError(e.into()))?;

        let summary = aggregate(summary_rows);
        debug!(
            countries = summary.countries.len(),
            total_deployments = summary.total_deployments,
            "retrieved telemetry summary"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_collects_services() {
        let now = Utc::now();
        let row = TelemetryRow {
            ip_address: "41.90.185.50".to_string(),
            deployment_id: Some("dep-1".to_string()),
            time: now,
            service_time: None,
            longitude: 36.8,
            latitude: -1.3,
            mg_version: Some("0.14.0".to_string()),
            service: Some("users".to_string()),
            country: Some("Kenya".to_string()),
            city: None,
            services: Some(vec![
                Some("users".to_string()),
                None,
                Some("things".to_string()),
            ]),
        };

        let record = TelemetryRecord::from(row);
        assert_eq!(record.services, vec!["things".to_string(), "users".to_string()]);
        assert_eq!(record.last_seen, now);
        assert_eq!(record.timestamp, now);
        assert_eq!(record.city, "");
        assert_eq!(record.version, "0.14.0");
        assert_eq!(record.deployment_key(), "dep-1");
    }
}
