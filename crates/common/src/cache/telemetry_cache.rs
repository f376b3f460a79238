use crate::cache::config::CacheConfig;
use crate::cache::cost_cache::{CacheStatsSnapshot, CostCache};
use crate::cache::key::{canonical_key, CacheKind};
use crate::domain::{
    DomainError, DomainResult, TelemetryFilters, TelemetryPage, TelemetryRecord, TelemetrySummary,
};
use anyhow::anyhow;
use std::future::Future;
use std::mem::size_of;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
enum CachedPayload {
    Summary(Arc<TelemetrySummary>),
    Page(Arc<TelemetryPage>),
}

/// Read-through cache for summaries and pages.
///
/// Both kinds share one cost budget and are told apart by key prefix. There is
/// no invalidation on write; entries go stale for at most the configured TTL.
#[derive(Clone)]
pub struct TelemetryCache {
    store: CostCache<CachedPayload>,
    ttl: Duration,
}

impl TelemetryCache {
    pub fn new(config: &CacheConfig) -> DomainResult<Self> {
        Ok(Self {
            store: CostCache::new(config)?,
            ttl: config.ttl,
        })
    }

    pub async fn summary<F, Fut>(
        &self,
        filters: &TelemetryFilters,
        compute: F,
    ) -> DomainResult<Arc<TelemetrySummary>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<TelemetrySummary>>,
    {
        let key = canonical_key(filters, CacheKind::Summary);
        let payload = self
            .store
            .get_or_compute(&key, self.ttl, payload_cost, move || async move {
                compute().await.map(|summary| CachedPayload::Summary(Arc::new(summary)))
            })
            .await?;

        match payload {
            CachedPayload::Summary(summary) => Ok(summary),
            CachedPayload::Page(_) => {
                warn!(key = %key, "unexpected payload under summary key");
                Err(DomainError::ReadError(anyhow!(
                    "unexpected cached payload under {}",
                    key
                )))
            }
        }
    }

    pub async fn page<F, Fut>(
        &self,
        filters: &TelemetryFilters,
        compute: F,
    ) -> DomainResult<Arc<TelemetryPage>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<TelemetryPage>>,
    {
        let key = canonical_key(filters, CacheKind::Page);
        let payload = self
            .store
            .get_or_compute(&key, self.ttl, payload_cost, move || async move {
                compute().await.map(|page| CachedPayload::Page(Arc::new(page)))
            })
            .await?;

        match payload {
            CachedPayload::Page(page) => Ok(page),
            CachedPayload::Summary(_) => {
                warn!(key = %key, "unexpected payload under page key");
                Err(DomainError::ReadError(anyhow!(
                    "unexpected cached payload under {}",
                    key
                )))
            }
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.store.stats()
    }
}

fn payload_cost(payload: &CachedPayload) -> u64 {
    let bytes = match payload {
        CachedPayload::Summary(summary) => summary_cost(summary),
        CachedPayload::Page(page) => page_cost(page),
    };
    bytes as u64
}

fn summary_cost(summary: &TelemetrySummary) -> usize {
    let countries: usize = summary
        .countries
        .iter()
        .map(|c| size_of::<crate::domain::CountrySummary>() + c.country.len())
        .sum();
    let names: usize = summary
        .cities
        .iter()
        .chain(summary.services.iter())
        .chain(summary.versions.iter())
        .map(|name| size_of::<String>() + name.len())
        .sum();

    size_of::<TelemetrySummary>() + countries + names
}

fn page_cost(page: &TelemetryPage) -> usize {
    size_of::<TelemetryPage>() + page.telemetry.iter().map(record_cost).sum::<usize>()
}

fn record_cost(record: &TelemetryRecord) -> usize {
    let services: usize = record
        .services
        .iter()
        .map(|s| size_of::<String>() + s.len())
        .sum();

    size_of::<TelemetryRecord>()
        + services
        + record.service.len()
        + record.ip_address.len()
        + record.mac_address.len()
        + record.deployment_id.as_ref().map_or(0, |id| id.len())
        + record.version.len()
        + record.country.len()
        + record.city.len()
}
