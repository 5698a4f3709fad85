use crate::auth::RequestContext;
use crate::domain::{DeviceChanges, DeviceField, DomainError, DomainResult, ErrorKind, SortDir};
use crate::objects::ObjectPrimitive;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One conductor operation with its typed arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args", rename_all = "snake_case")]
pub enum RpcRequest {
    DeviceCreate {
        name: String,
        device_uuid: String,
        device: ObjectPrimitive,
    },
    DeviceList {
        limit: Option<usize>,
        marker: Option<String>,
        sort_key: DeviceField,
        sort_dir: SortDir,
    },
    DeviceDelete {
        device_uuid: String,
    },
    DeviceShow {
        device_uuid: String,
    },
    DeviceUpdate {
        device_uuid: String,
        changes: DeviceChanges,
    },
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::DeviceCreate { .. } => "device_create",
            RpcRequest::DeviceList { .. } => "device_list",
            RpcRequest::DeviceDelete { .. } => "device_delete",
            RpcRequest::DeviceShow { .. } => "device_show",
            RpcRequest::DeviceUpdate { .. } => "device_update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub context: RequestContext,
    pub request: RpcRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RpcResult {
    Device(ObjectPrimitive),
    Devices(Vec<ObjectPrimitive>),
    Empty,
}

/// A failure raised on the conductor, in wire form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DomainError> for RemoteError {
    fn from(error: &DomainError) -> Self {
        Self {
            kind: error.kind(),
            message: error.detail(),
        }
    }
}

impl From<RemoteError> for DomainError {
    fn from(remote: RemoteError) -> Self {
        DomainError::from_remote(remote.kind, remote.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcReply {
    Ok(RpcResult),
    Err(RemoteError),
}

impl From<DomainResult<RpcResult>> for RpcReply {
    fn from(result: DomainResult<RpcResult>) -> Self {
        match result {
            Ok(value) => RpcReply::Ok(value),
            Err(e) => RpcReply::Err(RemoteError::from(&e)),
        }
    }
}

impl RpcReply {
    pub fn into_result(self) -> DomainResult<RpcResult> {
        match self {
            RpcReply::Ok(value) => Ok(value),
            RpcReply::Err(remote) => Err(remote.into()),
        }
    }
}

pub fn encode_message<T: Serialize>(message: &T) -> DomainResult<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| DomainError::RepositoryError(e.into()))
}

pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> DomainResult<T> {
    serde_json::from_slice(payload)
        .map_err(|e| DomainError::Invalid(format!("malformed rpc message: {}", e)))
}
