use crate::domain::dashboard::DashboardView;
use crate::domain::template::{render, TemplateSource};
use chrono::Utc;
use common::cache::TelemetryCache;
use common::domain::{
    DomainResult, LocationService, PageMetadata, TelemetryFilters, TelemetryPage,
    TelemetryRecord, TelemetryRepository, TelemetrySummary,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Rows fetched for the dashboard map regardless of caller pagination
pub const PAGE_LIMIT: u64 = 1000;

pub const DASHBOARD_TEMPLATE: &str = "index.html";

/// Service for heartbeat ingestion, retrieval and the operator dashboard
pub struct TelemetryService {
    repository: Arc<dyn TelemetryRepository>,
    location_service: Arc<dyn LocationService>,
    templates: Arc<dyn TemplateSource>,
    cache: TelemetryCache,
}

impl TelemetryService {
    pub fn new(
        repository: Arc<dyn TelemetryRepository>,
        location_service: Arc<dyn LocationService>,
        templates: Arc<dyn TemplateSource>,
        cache: TelemetryCache,
    ) -> Self {
        Self {
            repository,
            location_service,
            templates,
            cache,
        }
    }

    /// Enrich a heartbeat with its location and persist it
    #[instrument(
        skip(self, record),
        fields(service = %record.service, deployment = %record.deployment_key())
    )]
    pub async fn save(&self, mut record: TelemetryRecord) -> DomainResult<()> {
        let location = self
            .location_service
            .get_location(&record.ip_address)
            .await?;

        let now = Utc::now();
        record.country = location.country;
        record.city = location.city;
        record.latitude = location.latitude;
        record.longitude = location.longitude;
        record.last_seen = now;
        record.timestamp = now;

        self.repository.save(record).await?;

        info!("Heartbeat saved");
        Ok(())
    }

    /// Heartbeats are append-only; updates are accepted and ignored
    pub async fn update(&self, _record: TelemetryRecord) -> DomainResult<()> {
        Ok(())
    }

    #[instrument(skip(self, filters), fields(offset = page.offset, limit = page.limit))]
    pub async fn retrieve(
        &self,
        page: PageMetadata,
        filters: TelemetryFilters,
    ) -> DomainResult<TelemetryPage> {
        self.repository.retrieve_all(page, filters).await
    }

    #[instrument(skip(self, filters))]
    pub async fn retrieve_summary(
        &self,
        filters: TelemetryFilters,
    ) -> DomainResult<TelemetrySummary> {
        self.repository.retrieve_summary(filters).await
    }

    /// Render the dashboard HTML for a filter set.
    ///
    /// Summaries and the map page are read through the cache; any failed
    /// lookup fails the whole render.
    #[instrument(skip(self, filters))]
    pub async fn serve_ui(&self, filters: TelemetryFilters) -> DomainResult<String> {
        let summary = self.cached_summary(&filters).await?;
        let unfiltered = self.cached_summary(&TelemetryFilters::default()).await?;
        let page = self.cached_page(&filters).await?;

        let view = DashboardView::build(&filters, &summary, &unfiltered, &page)?;
        let template = self.templates.load(DASHBOARD_TEMPLATE).await?;
        let html = render(&template, &view.to_context())?;

        debug!(
            deployments = view.no_deployments,
            countries = view.no_countries,
            bytes = html.len(),
            "Dashboard rendered"
        );
        Ok(html)
    }

    async fn cached_summary(
        &self,
        filters: &TelemetryFilters,
    ) -> DomainResult<Arc<TelemetrySummary>> {
        let repository = self.repository.clone();
        let owned = filters.clone();
        self.cache
            .summary(filters, move || async move {
                repository.retrieve_summary(owned).await
            })
            .await
    }

    async fn cached_page(&self, filters: &TelemetryFilters) -> DomainResult<Arc<TelemetryPage>> {
        let repository = self.repository.clone();
        let owned = filters.clone();
        let page = PageMetadata {
            total: 0,
            offset: 0,
            limit: PAGE_LIMIT,
        };
        self.cache
            .page(filters, move || async move {
                repository.retrieve_all(page, owned).await
            })
            .await
    }
}
