use crate::domain::{DomainError, DomainResult};
use uuid::Uuid;

/// How a device is addressed: by its internal integer id or its public uuid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceIdentity {
    Id(i64),
    Uuid(String),
}

impl DeviceIdentity {
    /// Resolve an identifier by its lexical shape.
    ///
    /// Integer-shaped values win over uuid-shaped ones; anything else is an
    /// `InvalidIdentity`.
    pub fn parse(value: &str) -> DomainResult<Self> {
        if let Some(id) = as_int(value) {
            Ok(DeviceIdentity::Id(id))
        } else if is_uuid_like(value) {
            Ok(DeviceIdentity::Uuid(canonical_uuid(value)?))
        } else {
            Err(DomainError::InvalidIdentity(value.to_string()))
        }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceIdentity::Id(id) => write!(f, "{}", id),
            DeviceIdentity::Uuid(uuid) => f.write_str(uuid),
        }
    }
}

/// True when `value` is the canonical decimal rendering of an integer
/// ("42", "-7"), so "042" or " 42" are rejected.
pub fn is_int_like(value: &str) -> bool {
    as_int(value).is_some()
}

fn as_int(value: &str) -> Option<i64> {
    value
        .parse::<i64>()
        .ok()
        .filter(|parsed| parsed.to_string() == value)
}

/// True when `value` parses as a uuid in any of the accepted textual forms
/// (hyphenated, simple, braced or urn).
pub fn is_uuid_like(value: &str) -> bool {
    Uuid::try_parse(value).is_ok()
}

/// Normalize a uuid to lowercase hyphenated form.
pub fn canonical_uuid(value: &str) -> DomainResult<String> {
    Uuid::try_parse(value)
        .map(|uuid| uuid.hyphenated().to_string())
        .map_err(|_| DomainError::InvalidUuid(value.to_string()))
}

pub fn generate_uuid() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_shape_resolves_to_id() {
        assert_eq!(DeviceIdentity::parse("42").unwrap(), DeviceIdentity::Id(42));
    }

    #[test]
    fn test_uuid_shape_resolves_to_uuid() {
        let identity = DeviceIdentity::parse("bd9431c1-8d69-4ad3-803a-8d4a6b89fd36").unwrap();
        assert_eq!(
            identity,
            DeviceIdentity::Uuid("bd9431c1-8d69-4ad3-803a-8d4a6b89fd36".to_string())
        );
    }

    #[test]
    fn test_other_shapes_are_invalid_identity() {
        let result = DeviceIdentity::parse("not-an-id");
        assert!(matches!(result, Err(DomainError::InvalidIdentity(ref v)) if v == "not-an-id"));
    }

    #[test]
    fn test_non_canonical_integers_are_not_int_like() {
        assert!(is_int_like("-7"));
        assert!(!is_int_like("042"));
        assert!(!is_int_like(" 42"));
        assert!(!is_int_like("4.2"));
    }

    #[test]
    fn test_uppercase_uuid_is_canonicalized() {
        let identity = DeviceIdentity::parse("BD9431C1-8D69-4AD3-803A-8D4A6B89FD36").unwrap();
        assert_eq!(
            identity,
            DeviceIdentity::Uuid("bd9431c1-8d69-4ad3-803a-8d4a6b89fd36".to_string())
        );
    }

    #[test]
    fn test_canonical_uuid_rejects_garbage() {
        assert!(matches!(
            canonical_uuid("1234"),
            Err(DomainError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_generated_uuids_are_unique_and_canonical() {
        let a = generate_uuid();
        let b = generate_uuid();
        assert_ne!(a, b);
        assert_eq!(canonical_uuid(&a).unwrap(), a);
    }
}
