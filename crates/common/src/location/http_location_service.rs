use crate::domain::{DomainError, DomainResult, Location, LocationService};
use crate::location::LocationConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

/// Resolves IP addresses through an HTTP geolocation API
#[derive(Clone)]
pub struct HttpLocationService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLocationService {
    pub fn new(config: &LocationConfig) -> DomainResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                DomainError::LocationLookupError(format!("failed to build client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LocationService for HttpLocationService {
    #[instrument(skip(self))]
    async fn get_location(&self, ip_address: &str) -> DomainResult<Location> {
        if ip_address.is_empty() {
            return Err(DomainError::LocationLookupError(
                "ip address is empty".to_string(),
            ));
        }

        let ip: IpAddr = ip_address.parse().map_err(|_| {
            DomainError::LocationLookupError(format!("invalid ip address: {}", ip_address))
        })?;

        let url = format!("{}/{}", self.base_url, ip);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DomainError::LocationLookupError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DomainError::LocationLookupError(format!(
                "lookup returned status {}",
                response.status()
            )));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| {
                DomainError::LocationLookupError(format!("invalid lookup response: {}", e))
            })?;

        if body.status.as_deref() == Some("fail") {
            return Err(DomainError::LocationLookupError(
                body.message.unwrap_or_else(|| "lookup failed".to_string()),
            ));
        }

        debug!(country = %body.country, city = %body.city, "resolved location");

        Ok(Location {
            country: body.country,
            city: body.city,
            latitude: body.lat,
            longitude: body.lon,
        })
    }
}
