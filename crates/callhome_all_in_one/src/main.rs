mod config;

use callhome_api::{CallhomeApi, FileTemplateSource, TelemetryService};
use callhome_client::CallhomeClient;
use callhome_runner::Runner;
use common::cache::TelemetryCache;
use common::location::HttpLocationService;
use common::postgres::{PostgresClient, PostgresTelemetryRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use goose::MigrationRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting callhome service"
    );
    debug!("Configuration: {:?}", config);

    let repository = match initialize_repository(&config).await {
        Ok(repo) => repo,
        Err(e) => {
            error!("Failed to initialize storage: {:#}", e);
            std::process::exit(1);
        }
    };

    let location_service = match HttpLocationService::new(&config.location_config()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to initialize location resolver: {}", e);
            std::process::exit(1);
        }
    };

    // Created once and shared by every request
    let cache = match TelemetryCache::new(&config.cache_config()) {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to initialize cache: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_service = Arc::new(TelemetryService::new(
        repository,
        location_service,
        Arc::new(FileTemplateSource::new(&config.template_dir)),
        cache,
    ));

    let callhome_api = CallhomeApi::new(telemetry_service, config.http_server_config());

    let mut runner = Runner::new()
        .with_named_process("callhome_api", callhome_api.into_runner_process());

    if config.client_enabled {
        match CallhomeClient::new(config.client_config()) {
            Ok(client) => {
                runner = runner.with_named_process("callhome_client", client.into_runner_process());
            }
            Err(e) => {
                error!("Failed to initialize callhome client: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Shutdown telemetry and flush pending spans
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;
}

async fn initialize_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<PostgresTelemetryRepository>> {
    info!("Running PostgreSQL migrations...");
    run_postgres_migrations(config).await?;
    info!("PostgreSQL migrations completed");

    let postgres_config = config.postgres_config();
    let client = PostgresClient::from_config(&postgres_config)?;
    client.ping().await?;
    info!("Connected to PostgreSQL");

    Ok(Arc::new(
        PostgresTelemetryRepository::new(client)
            .with_query_timeout(postgres_config.query_timeout)
            .with_max_limit(postgres_config.max_page_limit),
    ))
}

async fn run_postgres_migrations(config: &ServiceConfig) -> anyhow::Result<()> {
    let postgres_config = config.postgres_config();
    let runner = MigrationRunner::new(
        postgres_config.goose_binary_path.clone(),
        postgres_config.migrations_dir.clone(),
        "postgres".to_string(),
        postgres_config.dsn(),
    );
    runner.run_migrations().await
}
