use crate::rest::{
    create_device, delete_device, detail, get_all, get_one, patch_device, DevicesController, Link,
};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use common::auth::{auth_gate, AuthGate};
use http::HeaderMap;
use serde_json::{json, Value};

/// Version discovery document served at `/`
pub async fn versions(
    State(controller): State<DevicesController>,
    headers: HeaderMap,
) -> Json<Value> {
    let base = controller.base_url(&headers);
    let v1 = json!({
        "id": "v1",
        "status": "CURRENT",
        "links": [Link { href: format!("{}/v1/", base), rel: "self".to_string() }],
    });

    Json(json!({
        "name": "IoT API",
        "description": "Device registry for IoT deployments.",
        "versions": [v1.clone()],
        "default_version": v1,
    }))
}

/// Build the full API router: version discovery plus the v1 device
/// resource, behind the auth gate.
pub fn build_iot_api_routes(controller: DevicesController, gate: AuthGate) -> Router {
    Router::new()
        .route("/", get(versions))
        .route("/v1/devices", get(get_all).post(create_device))
        .route("/v1/devices/detail", get(detail))
        .route(
            "/v1/devices/:device_uuid",
            get(get_one).patch(patch_device).delete(delete_device),
        )
        .with_state(controller)
        .layer(axum::middleware::from_fn_with_state(gate, auth_gate))
}
