//! Garde validation helpers shared by request types.

use crate::domain::{is_uuid_like, DomainError};
use garde::{Report, Validate};

/// Run garde validation, folding the report into a `ValidationError`
pub fn validate_request<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

/// Custom garde rule for optional uuid fields
pub fn uuid_shape(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(uuid) if !is_uuid_like(uuid) => {
            Err(garde::Error::new(format!("{} is not a valid uuid", uuid)))
        }
        _ => Ok(()),
    }
}

fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            if path.to_string().is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use garde::Validate;

    #[derive(Validate)]
    struct NewThing {
        #[garde(length(max = 8))]
        name: String,
        #[garde(custom(uuid_shape))]
        uuid: Option<String>,
    }

    #[test]
    fn test_valid_request_passes() {
        let request = NewThing {
            name: "short".to_string(),
            uuid: Some("bd9431c1-8d69-4ad3-803a-8d4a6b89fd36".to_string()),
        };
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn test_error_names_the_offending_field() {
        let request = NewThing {
            name: "far too long".to_string(),
            uuid: None,
        };
        match validate_request(&request) {
            Err(DomainError::ValidationError(msg)) => assert!(msg.contains("name")),
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_uuid_is_rejected() {
        let request = NewThing {
            name: "ok".to_string(),
            uuid: Some("nope".to_string()),
        };
        assert!(matches!(
            validate_request(&request),
            Err(DomainError::ValidationError(_))
        ));
    }
}
