use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device {0} could not be found.")]
    DeviceNotFound(String),

    #[error("The {0} resource could not be found.")]
    ResourceNotFound(String),

    #[error("A device with UUID {0} already exists.")]
    DeviceAlreadyExists(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid resource state: {0}")]
    InvalidState(String),

    #[error("Unacceptable parameters: {0}")]
    Invalid(String),

    #[error("Expected a uuid but received {0}.")]
    InvalidUuid(String),

    #[error("Expected an uuid or int but received {0}.")]
    InvalidIdentity(String),

    #[error("{0}")]
    InvalidParameterValue(String),

    #[error("Couldn't apply patch '{0}'. Reason: {1}")]
    PatchError(String, String),

    #[error("Invalid sort key: {0}")]
    InvalidSortKey(String),

    #[error("{0}")]
    InvalidQuery(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Operation not permitted.")]
    OperationNotPermitted,

    #[error("Version {version} of {name} is not supported")]
    IncompatibleObjectVersion { name: String, version: String },

    #[error("Unsupported object type {0}")]
    UnsupportedObjectType(String),

    #[error("Timed out waiting for a reply from the conductor: {0}")]
    ConductorTimeout(String),

    #[error("Conductor error: {0}")]
    ConductorError(String),

    #[error("Device driver error: {0}")]
    DriverError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

/// Wire-stable classification of a [`DomainError`], used to carry failures
/// across the conductor RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DeviceNotFound,
    ResourceNotFound,
    DeviceAlreadyExists,
    Conflict,
    InvalidState,
    Invalid,
    InvalidUuid,
    InvalidIdentity,
    InvalidParameterValue,
    PatchError,
    InvalidSortKey,
    InvalidQuery,
    ValidationError,
    NotAuthorized,
    OperationNotPermitted,
    IncompatibleObjectVersion,
    UnsupportedObjectType,
    ConductorTimeout,
    DriverError,
    Internal,
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            DomainError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            DomainError::DeviceAlreadyExists(_) => ErrorKind::DeviceAlreadyExists,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::InvalidState(_) => ErrorKind::InvalidState,
            DomainError::Invalid(_) => ErrorKind::Invalid,
            DomainError::InvalidUuid(_) => ErrorKind::InvalidUuid,
            DomainError::InvalidIdentity(_) => ErrorKind::InvalidIdentity,
            DomainError::InvalidParameterValue(_) => ErrorKind::InvalidParameterValue,
            DomainError::PatchError(_, _) => ErrorKind::PatchError,
            DomainError::InvalidSortKey(_) => ErrorKind::InvalidSortKey,
            DomainError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            DomainError::ValidationError(_) => ErrorKind::ValidationError,
            DomainError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            DomainError::OperationNotPermitted => ErrorKind::OperationNotPermitted,
            DomainError::IncompatibleObjectVersion { .. } => ErrorKind::IncompatibleObjectVersion,
            DomainError::UnsupportedObjectType(_) => ErrorKind::UnsupportedObjectType,
            DomainError::ConductorTimeout(_) => ErrorKind::ConductorTimeout,
            DomainError::DriverError(_) => ErrorKind::DriverError,
            DomainError::ConductorError(_) | DomainError::RepositoryError(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Payload carried alongside the kind on the RPC wire. For most variants
    /// this is the single argument, so the error can be rebuilt verbatim.
    pub fn detail(&self) -> String {
        match self {
            DomainError::DeviceNotFound(s)
            | DomainError::ResourceNotFound(s)
            | DomainError::DeviceAlreadyExists(s)
            | DomainError::Conflict(s)
            | DomainError::InvalidState(s)
            | DomainError::Invalid(s)
            | DomainError::InvalidUuid(s)
            | DomainError::InvalidIdentity(s)
            | DomainError::InvalidParameterValue(s)
            | DomainError::InvalidSortKey(s)
            | DomainError::InvalidQuery(s)
            | DomainError::ValidationError(s)
            | DomainError::NotAuthorized(s)
            | DomainError::UnsupportedObjectType(s)
            | DomainError::ConductorTimeout(s)
            | DomainError::ConductorError(s)
            | DomainError::DriverError(s) => s.clone(),
            DomainError::PatchError(patch, reason) => format!("{}\n{}", patch, reason),
            DomainError::IncompatibleObjectVersion { name, version } => {
                format!("{}\n{}", name, version)
            }
            DomainError::OperationNotPermitted => String::new(),
            DomainError::RepositoryError(err) => err.to_string(),
        }
    }

    /// Rebuild a typed error from its wire form.
    pub fn from_remote(kind: ErrorKind, detail: String) -> Self {
        match kind {
            ErrorKind::DeviceNotFound => DomainError::DeviceNotFound(detail),
            ErrorKind::ResourceNotFound => DomainError::ResourceNotFound(detail),
            ErrorKind::DeviceAlreadyExists => DomainError::DeviceAlreadyExists(detail),
            ErrorKind::Conflict => DomainError::Conflict(detail),
            ErrorKind::InvalidState => DomainError::InvalidState(detail),
            ErrorKind::Invalid => DomainError::Invalid(detail),
            ErrorKind::InvalidUuid => DomainError::InvalidUuid(detail),
            ErrorKind::InvalidIdentity => DomainError::InvalidIdentity(detail),
            ErrorKind::InvalidParameterValue => DomainError::InvalidParameterValue(detail),
            ErrorKind::PatchError => {
                let (patch, reason) = split_pair(&detail);
                DomainError::PatchError(patch, reason)
            }
            ErrorKind::InvalidSortKey => DomainError::InvalidSortKey(detail),
            ErrorKind::InvalidQuery => DomainError::InvalidQuery(detail),
            ErrorKind::ValidationError => DomainError::ValidationError(detail),
            ErrorKind::NotAuthorized => DomainError::NotAuthorized(detail),
            ErrorKind::OperationNotPermitted => DomainError::OperationNotPermitted,
            ErrorKind::IncompatibleObjectVersion => {
                let (name, version) = split_pair(&detail);
                DomainError::IncompatibleObjectVersion { name, version }
            }
            ErrorKind::UnsupportedObjectType => DomainError::UnsupportedObjectType(detail),
            ErrorKind::ConductorTimeout => DomainError::ConductorTimeout(detail),
            ErrorKind::DriverError => DomainError::DriverError(detail),
            ErrorKind::Internal => DomainError::ConductorError(detail),
        }
    }
}

fn split_pair(detail: &str) -> (String, String) {
    match detail.split_once('\n') {
        Some((first, second)) => (first.to_string(), second.to_string()),
        None => (detail.to_string(), String::new()),
    }
}
