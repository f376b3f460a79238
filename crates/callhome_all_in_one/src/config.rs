use callhome_api::HttpServerConfig;
use callhome_client::ClientConfig;
use common::cache::CacheConfig;
use common::location::LocationConfig;
use common::postgres::PostgresConfig;
use common::telemetry::TelemetryConfig;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // OpenTelemetry configuration
    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    /// Export spans over OTLP
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    /// Service name reported to the collector
    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    // HTTP configuration
    /// HTTP server host
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Directory holding the dashboard template
    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    /// Directory served under /static
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    // PostgreSQL configuration
    /// PostgreSQL host
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// PostgreSQL port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// PostgreSQL database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// PostgreSQL username
    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    /// PostgreSQL password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Maximum pooled connections
    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    /// Reads running longer than this are cancelled
    #[serde(default = "default_postgres_query_timeout_secs")]
    pub postgres_query_timeout_secs: u64,

    /// Path to PostgreSQL migrations directory
    #[serde(default = "default_postgres_migrations_dir")]
    pub postgres_migrations_dir: String,

    /// Path to goose binary
    #[serde(default = "default_postgres_goose_binary_path")]
    pub postgres_goose_binary_path: String,

    /// Largest page the repository serves
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,

    // Cache configuration
    /// Keys tracked by the admission sketch
    #[serde(default = "default_cache_num_counters")]
    pub cache_num_counters: usize,

    /// Total cache cost budget in bytes
    #[serde(default = "default_cache_max_cost")]
    pub cache_max_cost: u64,

    /// Pending cache write buffer size
    #[serde(default = "default_cache_buffer_items")]
    pub cache_buffer_items: usize,

    /// Seconds a cached summary or page is served
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    // Location resolver configuration
    /// Geolocation endpoint, queried as {url}/{ip}
    #[serde(default = "default_location_base_url")]
    pub location_base_url: String,

    /// Geolocation request timeout in seconds
    #[serde(default = "default_location_timeout_secs")]
    pub location_timeout_secs: u64,

    // Reporting client configuration
    /// Run the reporting client alongside the collector
    #[serde(default = "default_client_enabled")]
    pub client_enabled: bool,

    /// Collector URL the client reports to
    #[serde(default = "default_client_home_url")]
    pub client_home_url: String,

    /// Seconds between reports
    #[serde(default = "default_client_interval_secs")]
    pub client_interval_secs: u64,

    /// Seconds to wait before retrying a failed report
    #[serde(default = "default_client_back_off_secs")]
    pub client_back_off_secs: u64,

    /// Fixed deployment id, overrides the id file
    #[serde(default)]
    pub client_deployment_id: Option<String>,

    /// File the generated deployment id is kept in
    #[serde(default = "default_client_deployment_id_file")]
    pub client_deployment_id_file: String,

    /// Sent as the apikey header
    #[serde(default)]
    pub client_api_key: Option<String>,

    /// Seconds closers get to finish on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_service_name() -> String {
    "callhome".to_string()
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8855
}

fn default_template_dir() -> String {
    "crates/callhome_all_in_one/web/template".to_string()
}

fn default_static_dir() -> String {
    "crates/callhome_all_in_one/web/static".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "callhome".to_string()
}

fn default_postgres_username() -> String {
    "callhome".to_string()
}

fn default_postgres_password() -> String {
    "callhome".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    10
}

fn default_postgres_query_timeout_secs() -> u64 {
    30
}

fn default_postgres_migrations_dir() -> String {
    "crates/callhome_all_in_one/migrations/postgres".to_string()
}

fn default_postgres_goose_binary_path() -> String {
    "goose".to_string()
}

fn default_page_limit() -> u64 {
    1000
}

fn default_cache_num_counters() -> usize {
    1000
}

fn default_cache_max_cost() -> u64 {
    500 << 20
}

fn default_cache_buffer_items() -> usize {
    64
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_location_base_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_location_timeout_secs() -> u64 {
    5
}

fn default_client_enabled() -> bool {
    false
}

fn default_client_home_url() -> String {
    callhome_client::DEFAULT_HOME_URL.to_string()
}

fn default_client_interval_secs() -> u64 {
    30 * 60
}

fn default_client_back_off_secs() -> u64 {
    10
}

fn default_client_deployment_id_file() -> String {
    "/var/lib/callhome/deployment_id".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("CALLHOME"))
            .build()?
            .try_deserialize()
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: self.otel_service_name.clone(),
            otel_endpoint: self.otel_endpoint.clone(),
            otel_enabled: self.otel_enabled,
            log_level: self.log_level.clone(),
        }
    }

    pub fn postgres_config(&self) -> PostgresConfig {
        PostgresConfig {
            host: self.postgres_host.clone(),
            port: self.postgres_port,
            database: self.postgres_database.clone(),
            username: self.postgres_username.clone(),
            password: self.postgres_password.clone(),
            max_pool_size: self.postgres_max_pool_size,
            query_timeout: Duration::from_secs(self.postgres_query_timeout_secs),
            max_page_limit: self.page_limit,
            migrations_dir: self.postgres_migrations_dir.clone(),
            goose_binary_path: self.postgres_goose_binary_path.clone(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            num_counters: self.cache_num_counters,
            max_cost: self.cache_max_cost,
            buffer_items: self.cache_buffer_items,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    pub fn location_config(&self) -> LocationConfig {
        LocationConfig {
            base_url: self.location_base_url.clone(),
            timeout: Duration::from_secs(self.location_timeout_secs),
        }
    }

    pub fn http_server_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.http_host.clone(),
            port: self.http_port,
            static_dir: PathBuf::from(&self.static_dir),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            home_url: self.client_home_url.clone(),
            service_name: self.otel_service_name.clone(),
            interval: Duration::from_secs(self.client_interval_secs),
            back_off: Duration::from_secs(self.client_back_off_secs),
            deployment_id: self.client_deployment_id.clone(),
            deployment_id_file: PathBuf::from(&self.client_deployment_id_file),
            api_key: self.client_api_key.clone(),
            ..Default::default()
        }
    }
}
