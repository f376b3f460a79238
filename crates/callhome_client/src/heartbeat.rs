use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body posted to the collector's `/telemetry` endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    pub service: String,
    pub ip_address: String,
    /// Tells apart services sharing one host, e.g. a compose deployment
    pub mac_address: String,
    pub deployment_id: String,
    #[serde(rename = "magistrala_version")]
    pub version: String,
    pub last_seen: DateTime<Utc>,
}
