use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Geolocation lookup endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Lookups are issued as `GET {base_url}/{ip}`
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ip-api.com/json".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}
