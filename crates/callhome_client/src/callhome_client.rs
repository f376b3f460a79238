use crate::config::ClientConfig;
use crate::deployment::resolve_deployment_id;
use crate::error::ClientError;
use crate::heartbeat::Heartbeat;
use crate::network::{discover_public_ip, first_mac_address};
use anyhow::Context;
use chrono::Utc;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const API_KEY_HEADER: &str = "apikey";

/// Periodically reports this installation to a collector
pub struct CallhomeClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl CallhomeClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build http client")?;

        debug!(home_url = %config.home_url, "Initializing callhome client");
        Ok(Self { config, http })
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| Box::pin(async move { self.run(ctx).await })
    }

    /// Reports every `interval`, retrying after `back_off` on failure, until
    /// `ctx` is cancelled.
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let deployment_id = resolve_deployment_id(
            self.config.deployment_id.as_deref(),
            &self.config.deployment_id_file,
        )
        .await
        .unwrap_or_default();

        info!(
            service = %self.config.service_name,
            interval_secs = self.config.interval.as_secs(),
            "Callhome client started"
        );

        loop {
            let pause = match self.report_once(&deployment_id).await {
                Ok(()) => self.config.interval,
                Err(e) => {
                    warn!(error = %e, "failed to send telemetry, backing off");
                    self.config.back_off
                }
            };

            if !sleep_unless_cancelled(&ctx, pause).await {
                break;
            }
        }

        info!("Callhome client stopped");
        Ok(())
    }

    /// Sends one heartbeat.
    #[instrument(skip(self))]
    pub async fn report_once(&self, deployment_id: &str) -> Result<(), ClientError> {
        let ip = discover_public_ip(&self.http, &self.config.ip_endpoints).await?;
        let mac_address = first_mac_address(&self.config.net_class_dir)
            .await
            .unwrap_or_default();

        let heartbeat = Heartbeat {
            service: self.config.service_name.clone(),
            ip_address: ip.to_string(),
            mac_address,
            deployment_id: deployment_id.to_string(),
            version: self.config.version.clone(),
            last_seen: Utc::now(),
        };

        self.send(&heartbeat).await
    }

    async fn send(&self, heartbeat: &Heartbeat) -> Result<(), ClientError> {
        let mut request = self.http.post(&self.config.home_url).json(heartbeat);
        if let Some(key) = &self.config.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        if response.status() != StatusCode::CREATED {
            return Err(ClientError::UnexpectedStatus(response.status().as_u16()));
        }

        debug!("telemetry sent");
        Ok(())
    }
}

/// False when cancelled before `pause` elapsed.
async fn sleep_unless_cancelled(ctx: &CancellationToken, pause: Duration) -> bool {
    tokio::select! {
        _ = ctx.cancelled() => false,
        _ = tokio::time::sleep(pause) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn collector() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("41.90.185.50\n"))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer, dir: &std::path::Path) -> ClientConfig {
        ClientConfig {
            home_url: format!("{}/telemetry", server.uri()),
            service_name: "users".to_string(),
            version: "0.14.0".to_string(),
            interval: Duration::from_secs(3600),
            back_off: Duration::from_millis(20),
            request_timeout: Duration::from_secs(2),
            ip_endpoints: vec![format!("{}/ip", server.uri())],
            deployment_id: Some("dep-1".to_string()),
            deployment_id_file: dir.join("deployment_id"),
            api_key: Some("secret".to_string()),
            net_class_dir: dir.join("net"),
        }
    }

    async fn posted_heartbeats(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.as_str() == "POST")
            .count()
    }

    #[tokio::test]
    async fn test_report_once_posts_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let server = collector().await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .and(header("apikey", "secret"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({
                "service": "users",
                "ip_address": "41.90.185.50",
                "deployment_id": "dep-1",
                "magistrala_version": "0.14.0",
                "mac_address": ""
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = CallhomeClient::new(config(&server, dir.path())).unwrap();
        client.report_once("dep-1").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let post = requests
            .iter()
            .find(|request| request.method.as_str() == "POST")
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
        assert!(body["last_seen"].is_string());
    }

    #[tokio::test]
    async fn test_report_once_requires_created() {
        let dir = tempfile::tempdir().unwrap();
        let server = collector().await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .respond_with(ResponseTemplate::new(400).set_body_string("malformed entity"))
            .mount(&server)
            .await;

        let client = CallhomeClient::new(config(&server, dir.path())).unwrap();
        let result = client.report_once("dep-1").await;

        assert!(matches!(result, Err(ClientError::UnexpectedStatus(400))));
    }

    #[tokio::test]
    async fn test_run_backs_off_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let server = collector().await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let client = CallhomeClient::new(config(&server, dir.path())).unwrap();
        let ctx = CancellationToken::new();
        let handle = tokio::spawn(client.run(ctx.clone()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while posted_heartbeats(&server).await < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // the success starts the long interval, so no fourth attempt
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(posted_heartbeats(&server).await, 3);

        ctx.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_promptly_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let server = collector().await;
        Mock::given(method("POST"))
            .and(path("/telemetry"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let client = CallhomeClient::new(config(&server, dir.path())).unwrap();
        let ctx = CancellationToken::new();
        let handle = tokio::spawn(client.into_runner_process()(ctx.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let started = Instant::now();
        ctx.cancel();
        handle.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(posted_heartbeats(&server).await, 1);
    }
}
