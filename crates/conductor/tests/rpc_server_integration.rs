#![cfg(feature = "integration-tests")]

use common::auth::RequestContext;
use common::domain::{DeviceChanges, DomainError};
use common::memory::InMemoryDeviceRepository;
use common::nats::NatsClient;
use common::objects::DeviceObject;
use common::rpc::{ConductorApi, ConductorClient, ConductorConfig};
use conductor::{Conductor, LoggingDeviceDriver};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use tokio_util::sync::CancellationToken;

struct TestEnvironment {
    _nats_container: ContainerAsync<GenericImage>,
    client: ConductorClient,
    cancel: CancellationToken,
}

async fn setup_test_env() -> TestEnvironment {
    let nats_container = GenericImage::new("nats", "latest")
        .with_exposed_port(4222.into())
        .start()
        .await
        .unwrap();

    let host = nats_container.get_host().await.unwrap();
    let port = nats_container.get_host_port_ipv4(4222).await.unwrap();
    let nats = NatsClient::connect(
        &format!("nats://{}:{}", host, port),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    let repo = Arc::new(InMemoryDeviceRepository::new());
    let config = ConductorConfig {
        rpc_timeout_secs: 5,
        ..Default::default()
    };
    let conductor = Conductor::new(repo.clone(), Arc::new(LoggingDeviceDriver), config.clone());

    let cancel = CancellationToken::new();
    let process = conductor.into_runner_process(nats.client());
    tokio::spawn(process(cancel.clone()));
    // let the queue subscription register before the first request
    tokio::time::sleep(Duration::from_millis(300)).await;

    TestEnvironment {
        _nats_container: nats_container,
        client: ConductorClient::new(nats.create_request_transport(), repo, config),
        cancel,
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_device_lifecycle_over_nats() {
    let env = setup_test_env().await;
    let ctx = RequestContext::default();

    let mut device = DeviceObject::new();
    device.set_name("sensor1");
    let created = env
        .client
        .device_create(&ctx, "sensor1".to_string(), String::new(), device)
        .await
        .unwrap();
    let uuid = created.uuid.clone().unwrap();

    let updated = env
        .client
        .device_update(
            &ctx,
            uuid.clone(),
            DeviceChanges {
                desc: Some("on the roof".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.desc.as_deref(), Some("on the roof"));

    env.client.device_delete(&ctx, uuid.clone()).await.unwrap();
    let missing = env.client.device_show(&ctx, uuid).await;
    assert!(matches!(missing, Err(DomainError::DeviceNotFound(_))));

    env.cancel.cancel();
}
