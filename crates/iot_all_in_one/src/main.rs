mod config;

use common::domain::DeviceRepository;
use common::memory::InMemoryDeviceRepository;
use common::nats::{NatsClient, RequestTransport};
use common::postgres::{MigrationRunner, PostgresClient, PostgresDeviceRepository};
use common::rpc::ConductorClient;
use common::telemetry::init_telemetry;
use conductor::{Conductor, LoggingDeviceDriver};
use config::{ConductorTransport, ServiceConfig, StorageBackend};
use iot_api::IotApi;
use iot_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.telemetry_config()) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        storage = ?config.storage_backend,
        transport = ?config.conductor_transport,
        "starting iot-all-in-one service"
    );
    debug!("configuration: {:?}", config);

    let (repository, postgres_client) = match initialize_storage(&config).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let conductor = Conductor::new(
        repository.clone(),
        Arc::new(LoggingDeviceDriver),
        config.conductor_config(),
    );

    let mut runner = Runner::new();

    let (transport, nats_client): (Arc<dyn RequestTransport>, Option<NatsClient>) =
        match config.conductor_transport {
            ConductorTransport::Local => (conductor.local_transport(), None),
            ConductorTransport::Nats => {
                let nats_client = match NatsClient::connect(
                    &config.nats_url,
                    Duration::from_secs(config.startup_timeout_secs),
                    config.conductor_config().rpc_timeout(),
                )
                .await
                {
                    Ok(client) => client,
                    Err(e) => {
                        error!("failed to connect to NATS: {}", e);
                        std::process::exit(1);
                    }
                };
                let transport = nats_client.create_request_transport();
                runner = runner
                    .with_boxed_app_process(conductor.into_runner_process(nats_client.client()));
                (transport, Some(nats_client))
            }
        };

    let conductor_client = Arc::new(ConductorClient::new(
        transport,
        repository.clone(),
        config.conductor_config(),
    ));
    let iot_api = IotApi::new(conductor_client, repository, config.api_config());

    let result = runner
        .with_app_process(iot_api.into_runner_process())
        .with_closer(move || async move {
            info!("running cleanup tasks");
            if let Some(client) = nats_client {
                if let Err(e) = client.close().await {
                    error!("failed to close NATS connection: {}", e);
                }
            }
            if let Some(client) = postgres_client {
                client.close();
            }
            info!("cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;

    if let Err(e) = result {
        error!("service stopped with error: {}", e);
        std::process::exit(1);
    }
}

async fn initialize_storage(
    config: &ServiceConfig,
) -> anyhow::Result<(Arc<dyn DeviceRepository>, Option<PostgresClient>)> {
    match config.storage_backend {
        StorageBackend::Memory => {
            info!("using in-memory device storage");
            Ok((Arc::new(InMemoryDeviceRepository::new()), None))
        }
        StorageBackend::Postgres => {
            info!("initializing PostgreSQL");
            let postgres_config = config.postgres_config();
            MigrationRunner::new(
                postgres_config.goose_binary_path.clone(),
                postgres_config.migrations_dir.clone(),
                postgres_config.dsn(),
            )
            .run_migrations()
            .await?;

            let client = PostgresClient::new(&postgres_config)?;
            tokio::time::timeout(
                Duration::from_secs(config.startup_timeout_secs),
                client.ping(),
            )
            .await
            .map_err(|_| anyhow::anyhow!("timed out connecting to PostgreSQL"))??;

            Ok((
                Arc::new(PostgresDeviceRepository::new(client.clone())),
                Some(client),
            ))
        }
    }
}
