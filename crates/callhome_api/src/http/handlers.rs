use crate::domain::TelemetryService;
use crate::http::{ApiError, RetrieveQuery, SaveTelemetryRequest};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::Utc;
use common::domain::TelemetryRecord;
use common::garde::validate_struct;
use std::sync::Arc;
use tracing::debug;

pub const SERVICE_NAME: &str = "callhome";

/// POST /telemetry
pub async fn save_telemetry(
    State(service): State<Arc<TelemetryService>>,
    payload: Result<Json<SaveTelemetryRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|rejection| match rejection {
        JsonRejection::MissingJsonContentType(_) => ApiError::UnsupportedContentType,
        other => ApiError::MalformedEntity(other.body_text()),
    })?;
    validate_struct(&req)?;

    service.save(TelemetryRecord::from(req)).await?;
    Ok(StatusCode::CREATED)
}

/// GET /telemetry
pub async fn retrieve_telemetry(
    State(service): State<Arc<TelemetryService>>,
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = decode_query(query)?;
    let page = service.retrieve(req.page, req.filters).await?;
    debug!(count = page.telemetry.len(), "retrieved telemetry");
    Ok(Json(page))
}

/// GET /telemetry/summary
pub async fn retrieve_summary(
    State(service): State<Arc<TelemetryService>>,
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = decode_query(query)?;
    let summary = service.retrieve_summary(req.filters).await?;
    Ok(Json(summary))
}

/// GET /
pub async fn serve_dashboard(
    State(service): State<Arc<TelemetryService>>,
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let req = decode_query(query)?;
    let html = service.serve_ui(req.filters).await?;
    Ok(Html(html))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "pass",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn decode_query(
    query: Result<Query<RetrieveQuery>, QueryRejection>,
) -> Result<crate::http::RetrieveRequest, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::InvalidQuery(rejection.body_text()))?;
    query.into_request(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockTemplateSource;
    use crate::http::build_router;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::Router;
    use common::cache::{CacheConfig, TelemetryCache};
    use common::domain::{
        DomainError, InvalidEventError, Location, MockLocationService, MockTelemetryRepository,
        TelemetryPage, TelemetrySummary,
    };
    use tower::ServiceExt;

    const HEARTBEAT: &str = r#"{"service":"users","ip_address":"41.90.185.50","deployment_id":"dep-1","magistrala_version":"0.14.0","last_seen":"2024-03-01T10:00:00Z"}"#;

    fn router_with(
        repository: MockTelemetryRepository,
        location: MockLocationService,
        templates: MockTemplateSource,
        static_dir: &std::path::Path,
    ) -> Router {
        let cache = TelemetryCache::new(&CacheConfig::default()).unwrap();
        let service = TelemetryService::new(
            Arc::new(repository),
            Arc::new(location),
            Arc::new(templates),
            cache,
        );
        build_router(Arc::new(service), static_dir)
    }

    fn router(repository: MockTelemetryRepository) -> Router {
        router_with(
            repository,
            MockLocationService::new(),
            MockTemplateSource::new(),
            std::path::Path::new("."),
        )
    }

    fn kenya_location() -> MockLocationService {
        let mut location = MockLocationService::new();
        location.expect_get_location().returning(|_| {
            Ok(Location {
                country: "Kenya".to_string(),
                city: "Nairobi".to_string(),
                latitude: -1.28,
                longitude: 36.82,
            })
        });
        location
    }

    fn post(body: &'static str, content_type: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/telemetry");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_save_returns_created() {
        let mut repository = MockTelemetryRepository::new();
        repository
            .expect_save()
            .withf(|record| record.deployment_key() == "dep-1" && record.country == "Kenya")
            .times(1)
            .return_once(|_| Ok(()));

        let app = router_with(
            repository,
            kenya_location(),
            MockTemplateSource::new(),
            std::path::Path::new("."),
        );
        let response = app
            .oneshot(post(HEARTBEAT, Some("application/json")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_save_without_json_content_type() {
        for content_type in [None, Some("text/plain")] {
            let mut repository = MockTelemetryRepository::new();
            repository.expect_save().times(0);

            let response = router(repository)
                .oneshot(post(HEARTBEAT, content_type))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        }
    }

    #[tokio::test]
    async fn test_save_rejects_bad_bodies() {
        for body in [
            r#"{"service":"users","ip_address":"41.90.185.50"}"#,
            r#"{"service":"users","#,
        ] {
            let response = router(MockTelemetryRepository::new())
                .oneshot(post(body, Some("application/json")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_save_invalid_event_is_forbidden() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_save().times(1).return_once(|_| {
            Err(DomainError::SaveError(
                InvalidEventError("invalid byte sequence".to_string()).into(),
            ))
        });

        let app = router_with(
            repository,
            kenya_location(),
            MockTemplateSource::new(),
            std::path::Path::new("."),
        );
        let response = app
            .oneshot(post(HEARTBEAT, Some("application/json")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_retrieve_returns_page() {
        let mut repository = MockTelemetryRepository::new();
        repository
            .expect_retrieve_all()
            .withf(|page, filters| {
                page.limit == 5
                    && page.offset == 10
                    && filters.country.as_deref() == Some("Kenya")
                    && filters.from.is_some()
                    && filters.to.is_some()
            })
            .times(1)
            .return_once(|page, _| {
                Ok(TelemetryPage {
                    page: common::domain::PageMetadata { total: 0, ..page },
                    telemetry: vec![],
                })
            });

        let response = router(repository)
            .oneshot(get("/telemetry?limit=5&offset=10&country=Kenya"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["limit"], 5);
        assert_eq!(body["offset"], 10);
        assert_eq!(body["total"], 0);
        assert!(body["telemetry"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_rejects_invalid_queries() {
        for uri in [
            "/telemetry?limit=0",
            "/telemetry?limit=101",
            "/telemetry?limit=abc",
            "/telemetry?from=yesterday",
            "/telemetry?from=2024-02-01T00:00:00Z&to=2024-01-01T00:00:00Z",
            "/telemetry/summary?limit=1000",
        ] {
            let mut repository = MockTelemetryRepository::new();
            repository.expect_retrieve_all().times(0);
            repository.expect_retrieve_summary().times(0);

            let response = router(repository).oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_summary_storage_failure_is_sanitized() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_retrieve_summary().times(1).return_once(|_| {
            Err(DomainError::ReadError(anyhow::anyhow!(
                "password authentication failed for user callhome"
            )))
        });

        let response = router(repository)
            .oneshot(get("/telemetry/summary"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn test_summary_returns_json() {
        let mut repository = MockTelemetryRepository::new();
        repository.expect_retrieve_summary().times(1).return_once(|_| {
            Ok(TelemetrySummary {
                countries: vec![common::domain::CountrySummary {
                    country: "Kenya".to_string(),
                    deployments: 3,
                }],
                total_deployments: 3,
                ..Default::default()
            })
        });

        let response = router(repository)
            .oneshot(get("/telemetry/summary"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["total_deployments"], 3);
        assert_eq!(body["countries"][0]["number_of_deployments"], 3);
    }

    #[tokio::test]
    async fn test_dashboard_renders_html() {
        let mut repository = MockTelemetryRepository::new();
        let mut templates = MockTemplateSource::new();
        repository
            .expect_retrieve_summary()
            .returning(|_| Ok(TelemetrySummary::default()));
        repository.expect_retrieve_all().returning(|page, _| {
            Ok(TelemetryPage {
                page,
                telemetry: vec![],
            })
        });
        templates
            .expect_load()
            .returning(|_| Ok("<html>{{ NoDeployments }}</html>".to_string()));

        let app = router_with(
            repository,
            MockLocationService::new(),
            templates,
            std::path::Path::new("."),
        );
        let response = app.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<html>0</html>");
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(MockTelemetryRepository::new())
            .oneshot(get("/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "pass");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn test_static_assets_are_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('callhome');").unwrap();

        let app = router_with(
            MockTelemetryRepository::new(),
            MockLocationService::new(),
            MockTemplateSource::new(),
            dir.path(),
        );
        let response = app.oneshot(get("/static/app.js")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"console.log('callhome');");
    }
}
