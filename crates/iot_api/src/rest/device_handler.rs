use crate::domain::{
    CreateDeviceRequest, DeviceService, ListDevicesRequest, PatchOperation, Query,
};
use crate::rest::{base_url, DeviceCollection, DeviceRepresentation};
use axum::body::Bytes;
use axum::extract::{Path, Query as QueryParams, State};
use axum::{Extension, Json};
use common::auth::RequestContext;
use common::domain::{DomainError, DomainResult};
use common::http::ApiError;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

/// REST controller for the device collection and its members.
#[derive(Clone)]
pub struct DevicesController {
    service: Arc<DeviceService>,
    public_url: Option<String>,
    /// Set when mounted under another collection; members are then not
    /// addressable through this controller.
    from_devices: bool,
}

impl DevicesController {
    pub fn new(service: Arc<DeviceService>, public_url: Option<String>) -> Self {
        Self {
            service,
            public_url,
            from_devices: false,
        }
    }

    /// The same controller mounted as a sub-resource of another collection.
    pub fn as_subresource(&self) -> Self {
        Self {
            from_devices: true,
            ..self.clone()
        }
    }

    pub(crate) fn base_url(&self, headers: &HeaderMap) -> String {
        base_url(self.public_url.as_deref(), headers)
    }
}

/// Query string accepted by the list endpoints. The `q.*` keys may repeat;
/// the n-th `q.field` pairs with the n-th `q.op`, `q.value` and `q.type`, and
/// all filters must match.
#[derive(Debug, Default)]
pub struct DeviceListParams {
    pub marker: Option<String>,
    pub limit: Option<String>,
    pub sort_key: Option<String>,
    pub sort_dir: Option<String>,
    pub name: Option<String>,
    pub q_field: Vec<String>,
    pub q_op: Vec<String>,
    pub q_value: Vec<String>,
    pub q_type: Vec<String>,
}

impl DeviceListParams {
    /// Collect the decoded query pairs. Unknown keys are ignored and a
    /// repeated scalar key keeps its last value.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "marker" => params.marker = Some(value),
                "limit" => params.limit = Some(value),
                "sort_key" => params.sort_key = Some(value),
                "sort_dir" => params.sort_dir = Some(value),
                "name" => params.name = Some(value),
                "q.field" => params.q_field.push(value),
                "q.op" => params.q_op.push(value),
                "q.value" => params.q_value.push(value),
                "q.type" => params.q_type.push(value),
                _ => {}
            }
        }
        params
    }

    fn into_request(self) -> DomainResult<ListDevicesRequest> {
        let limit = match self.limit.as_deref().map(str::trim) {
            Some(limit) if !limit.is_empty() => Some(limit.parse::<i64>().map_err(|_| {
                DomainError::InvalidParameterValue(format!("Invalid limit: {}", limit))
            })?),
            _ => None,
        };

        let mut queries = Vec::new();
        if let Some(name) = self.name {
            queries.push(Query::new("name", name));
        }

        let mut ops = self.q_op.into_iter();
        let mut values = self.q_value.into_iter();
        let mut types = self.q_type.into_iter();
        for field in self.q_field {
            let (op, value, value_type) = (ops.next(), values.next(), types.next());
            if field.is_empty() {
                continue;
            }
            let value = value.ok_or_else(|| {
                DomainError::InvalidQuery(format!("Missing q.value for query on {}", field))
            })?;
            queries.push(Query::from_parts(field, op.as_deref(), value, value_type)?);
        }

        Ok(ListDevicesRequest {
            marker: self.marker,
            limit,
            sort_key: self.sort_key,
            sort_dir: self.sort_dir,
            queries,
        })
    }
}

/// The context set by the auth gate, or one read from the headers when the
/// gate is not mounted.
fn request_context(ctx: Option<Extension<RequestContext>>, headers: &HeaderMap) -> RequestContext {
    ctx.map(|Extension(ctx)| ctx)
        .unwrap_or_else(|| RequestContext::from_headers(headers))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(DomainError::Invalid(format!("malformed request body: {}", e))))
}

async fn list_collection(
    controller: &DevicesController,
    ctx: &RequestContext,
    headers: &HeaderMap,
    params: DeviceListParams,
    resource: &str,
    expand: bool,
) -> Result<Json<DeviceCollection>, ApiError> {
    let request = params.into_request()?;
    let page = controller.service.list_devices(ctx, request).await?;
    let base = controller.base_url(headers);
    Ok(Json(DeviceCollection::convert_with_links(
        &page, &base, resource, expand,
    )))
}

#[instrument(name = "ListDevices", skip_all)]
pub async fn get_all(
    State(controller): State<DevicesController>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    QueryParams(pairs): QueryParams<Vec<(String, String)>>,
) -> Result<Json<DeviceCollection>, ApiError> {
    let ctx = request_context(ctx, &headers);
    list_collection(
        &controller,
        &ctx,
        &headers,
        DeviceListParams::from_pairs(pairs),
        "devices",
        false,
    )
    .await
}

#[instrument(name = "ListDevicesDetail", skip_all)]
pub async fn detail(
    State(controller): State<DevicesController>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    QueryParams(pairs): QueryParams<Vec<(String, String)>>,
) -> Result<Json<DeviceCollection>, ApiError> {
    let ctx = request_context(ctx, &headers);
    list_collection(
        &controller,
        &ctx,
        &headers,
        DeviceListParams::from_pairs(pairs),
        "devices/detail",
        true,
    )
    .await
}

#[instrument(name = "GetDevice", skip_all, fields(device_uuid = %device_uuid))]
pub async fn get_one(
    State(controller): State<DevicesController>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    Path(device_uuid): Path<String>,
) -> Result<Json<DeviceRepresentation>, ApiError> {
    if controller.from_devices {
        return Err(DomainError::OperationNotPermitted.into());
    }

    let ctx = request_context(ctx, &headers);
    let device = controller.service.get_device(&ctx, &device_uuid).await?;
    Ok(Json(DeviceRepresentation::convert_with_links(
        &device,
        &controller.base_url(&headers),
        true,
    )))
}

#[instrument(name = "CreateDevice", skip_all)]
pub async fn create_device(
    State(controller): State<DevicesController>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DeviceRepresentation>), ApiError> {
    let ctx = request_context(ctx, &headers);
    let request: CreateDeviceRequest = parse_body(&body)?;

    let device = controller.service.create_device(&ctx, request).await?;
    debug!(uuid = ?device.uuid, "device created successfully");

    Ok((
        StatusCode::CREATED,
        Json(DeviceRepresentation::convert_with_links(
            &device,
            &controller.base_url(&headers),
            true,
        )),
    ))
}

#[instrument(name = "PatchDevice", skip_all, fields(device_uuid = %device_uuid))]
pub async fn patch_device(
    State(controller): State<DevicesController>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    Path(device_uuid): Path<String>,
    body: Bytes,
) -> Result<Json<DeviceRepresentation>, ApiError> {
    let ctx = request_context(ctx, &headers);
    let patch: Vec<PatchOperation> = parse_body(&body)?;

    let device = controller
        .service
        .update_device(&ctx, &device_uuid, patch)
        .await?;
    Ok(Json(DeviceRepresentation::convert_with_links(
        &device,
        &controller.base_url(&headers),
        true,
    )))
}

#[instrument(name = "DeleteDevice", skip_all, fields(device_uuid = %device_uuid))]
pub async fn delete_device(
    State(controller): State<DevicesController>,
    ctx: Option<Extension<RequestContext>>,
    headers: HeaderMap,
    Path(device_uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(ctx, &headers);
    controller.service.delete_device(&ctx, &device_uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}
