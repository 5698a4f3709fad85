use crate::domain::DomainError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

/// Map a domain error to its HTTP status
pub fn domain_error_status(error: &DomainError) -> StatusCode {
    match error {
        DomainError::DeviceNotFound(_) | DomainError::ResourceNotFound(_) => StatusCode::NOT_FOUND,

        DomainError::DeviceAlreadyExists(_)
        | DomainError::Conflict(_)
        | DomainError::InvalidState(_) => StatusCode::CONFLICT,

        DomainError::Invalid(_)
        | DomainError::InvalidUuid(_)
        | DomainError::InvalidIdentity(_)
        | DomainError::InvalidParameterValue(_)
        | DomainError::PatchError(_, _)
        | DomainError::InvalidSortKey(_)
        | DomainError::InvalidQuery(_)
        | DomainError::ValidationError(_) => StatusCode::BAD_REQUEST,

        DomainError::NotAuthorized(_) | DomainError::OperationNotPermitted => {
            StatusCode::FORBIDDEN
        }

        DomainError::IncompatibleObjectVersion { .. }
        | DomainError::UnsupportedObjectType(_)
        | DomainError::ConductorTimeout(_)
        | DomainError::ConductorError(_)
        | DomainError::DriverError(_)
        | DomainError::RepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body returned for every failed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub faultcode: String,
    pub faultstring: String,
    pub debuginfo: Option<String>,
}

/// The single place where domain errors become HTTP responses.
///
/// Server-side failures are logged with a correlation id and the client only
/// gets that id back; client errors are returned verbatim.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = domain_error_status(&self.0);

        let (faultcode, faultstring) = if status.is_server_error() {
            let correlation_id = Uuid::new_v4();
            error!(
                correlation_id = %correlation_id,
                error = %self.0,
                "server error while handling request"
            );
            (
                "Server",
                format!(
                    "Your request could not be handled because of a problem in the server. Error Correlation id is: {}",
                    correlation_id
                ),
            )
        } else {
            debug!(status = status.as_u16(), error = %self.0, "client error");
            ("Client", self.0.to_string())
        };

        let body = Fault {
            faultcode: faultcode.to_string(),
            faultstring,
            debuginfo: None,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn fault_of(error: DomainError) -> (StatusCode, Fault) {
        let response = ApiError(error).into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_status_table() {
        assert_eq!(
            domain_error_status(&DomainError::DeviceNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            domain_error_status(&DomainError::DeviceAlreadyExists("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            domain_error_status(&DomainError::InvalidIdentity("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            domain_error_status(&DomainError::OperationNotPermitted),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            domain_error_status(&DomainError::ConductorTimeout("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_client_errors_are_returned_verbatim() {
        let (status, fault) = fault_of(DomainError::DeviceNotFound("abc".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(fault.faultcode, "Client");
        assert_eq!(fault.faultstring, "Device abc could not be found.");
        assert_eq!(fault.debuginfo, None);
    }

    #[tokio::test]
    async fn test_server_errors_do_not_leak_details() {
        let (status, fault) = fault_of(DomainError::RepositoryError(anyhow::anyhow!(
            "password authentication failed for user iot"
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(fault.faultcode, "Server");
        assert!(fault
            .faultstring
            .starts_with("Your request could not be handled because of a problem in the server."));
        assert!(!fault.faultstring.contains("password"));
    }
}
