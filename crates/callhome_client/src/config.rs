use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOME_URL: &str = "https://deployments.absmach.eu/telemetry";

pub fn default_ip_endpoints() -> Vec<String> {
    vec![
        "https://checkip.amazonaws.com/".to_string(),
        "https://ipinfo.io/ip".to_string(),
        "https://api.ipify.org/".to_string(),
    ]
}

/// Configuration for the reporting client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Collector endpoint heartbeats are posted to
    pub home_url: String,
    pub service_name: String,
    pub version: String,
    /// Pause between successful reports
    pub interval: Duration,
    /// Pause before retrying a failed report
    pub back_off: Duration,
    pub request_timeout: Duration,
    /// Tried in order; the first parseable answer wins
    pub ip_endpoints: Vec<String>,
    /// Takes precedence over the id file when set
    pub deployment_id: Option<String>,
    pub deployment_id_file: PathBuf,
    /// Sent as the `apikey` header when set
    pub api_key: Option<String>,
    /// Directory scanned for interface MAC addresses
    pub net_class_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            home_url: DEFAULT_HOME_URL.to_string(),
            service_name: "callhome".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            interval: Duration::from_secs(30 * 60),
            back_off: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            ip_endpoints: default_ip_endpoints(),
            deployment_id: None,
            deployment_id_file: PathBuf::from("/var/lib/callhome/deployment_id"),
            api_key: None,
            net_class_dir: PathBuf::from("/sys/class/net"),
        }
    }
}
