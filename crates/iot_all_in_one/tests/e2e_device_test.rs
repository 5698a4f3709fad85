#![cfg(feature = "integration-tests")]

use axum::body::Body;
use axum::Router;
use common::nats::NatsClient;
use common::postgres::{MigrationRunner, PostgresClient, PostgresConfig, PostgresDeviceRepository};
use common::rpc::{ConductorClient, ConductorConfig};
use conductor::{Conductor, LoggingDeviceDriver};
use http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use iot_api::{ApiConfig, IotApi};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use testcontainers_modules::postgres::Postgres;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestEnvironment {
    _postgres: ContainerAsync<Postgres>,
    _nats: ContainerAsync<GenericImage>,
    router: Router,
    cancel: CancellationToken,
}

async fn setup_test_env() -> TestEnvironment {
    let postgres = Postgres::default().start().await.unwrap();
    let pg_host = postgres.get_host().await.unwrap();
    let pg_port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let goose_path = which::which("goose").expect("goose binary not found");
    let pg_config = PostgresConfig {
        host: pg_host.to_string(),
        port: pg_port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        max_pool_size: 5,
        migrations_dir: format!("{}/../common/migrations", env!("CARGO_MANIFEST_DIR")),
        goose_binary_path: goose_path.to_string_lossy().to_string(),
    };
    MigrationRunner::new(
        pg_config.goose_binary_path.clone(),
        pg_config.migrations_dir.clone(),
        pg_config.dsn(),
    )
    .run_migrations()
    .await
    .expect("Migrations failed");
    let repository = Arc::new(PostgresDeviceRepository::new(
        PostgresClient::new(&pg_config).unwrap(),
    ));

    let nats_container = GenericImage::new("nats", "latest")
        .with_exposed_port(4222.into())
        .start()
        .await
        .unwrap();
    let nats_host = nats_container.get_host().await.unwrap();
    let nats_port = nats_container.get_host_port_ipv4(4222).await.unwrap();
    let nats = NatsClient::connect(
        &format!("nats://{}:{}", nats_host, nats_port),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    let config = ConductorConfig {
        rpc_timeout_secs: 5,
        ..Default::default()
    };
    let conductor = Conductor::new(
        repository.clone(),
        Arc::new(LoggingDeviceDriver),
        config.clone(),
    );
    let cancel = CancellationToken::new();
    tokio::spawn(conductor.into_runner_process(nats.client())(cancel.clone()));
    // let the queue subscription register before the first request
    tokio::time::sleep(Duration::from_millis(300)).await;

    let client = ConductorClient::new(nats.create_request_transport(), repository.clone(), config);
    let router = IotApi::new(Arc::new(client), repository, ApiConfig::default()).router();

    TestEnvironment {
        _postgres: postgres,
        _nats: nats_container,
        router,
        cancel,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "iot.test");
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_device_lifecycle_through_postgres_and_nats() {
    let env = setup_test_env().await;

    let (status, created) = send(
        &env.router,
        Method::POST,
        "/v1/devices",
        Some(json!({"name": "sensor1", "desc": "temp sensor"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let uuid = created["uuid"].as_str().unwrap().to_string();
    assert_eq!(
        created["links"][0]["href"],
        format!("http://iot.test/v1/devices/{}", uuid)
    );

    let uri = format!("/v1/devices/{}", uuid);
    let (status, shown) = send(&env.router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["name"], "sensor1");
    assert_eq!(shown["desc"], "temp sensor");

    let (status, patched) = send(
        &env.router,
        Method::PATCH,
        &uri,
        Some(json!([{"op": "replace", "path": "/desc", "value": "on the roof"}])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["desc"], "on the roof");

    let (status, page) = send(&env.router, Method::GET, "/v1/devices/detail", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["devices"].as_array().unwrap().len(), 1);

    let (status, _) = send(&env.router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&env.router, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    env.cancel.cancel();
}

#[tokio::test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
async fn test_duplicate_uuid_conflicts_across_the_bus() {
    let env = setup_test_env().await;
    let body = json!({"uuid": "bd9431c1-8d69-4ad3-803a-8d4a6b89fd36", "name": "a"});

    let (status, _) = send(&env.router, Method::POST, "/v1/devices", Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, fault) = send(&env.router, Method::POST, "/v1/devices", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(fault["faultcode"], "Client");

    env.cancel.cancel();
}
