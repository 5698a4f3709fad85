use chrono::{DateTime, NaiveDateTime, Utc};
use common::domain::{DeviceField, DeviceFilter, DomainError, DomainResult, FieldValue, FilterOp};
use std::fmt;

const SUPPORTED_TYPES: &str = "['integer', 'float', 'string', 'boolean', 'datetime']";

/// Declared type of a query value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Integer,
    Float,
    Boolean,
    String,
    Datetime,
}

impl QueryType {
    fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "integer" => Ok(QueryType::Integer),
            "float" => Ok(QueryType::Float),
            "boolean" => Ok(QueryType::Boolean),
            "string" => Ok(QueryType::String),
            "datetime" => Ok(QueryType::Datetime),
            other => Err(DomainError::InvalidQuery(format!(
                "The data type {} is not supported. The supported data type list is: {}",
                other, SUPPORTED_TYPES
            ))),
        }
    }
}

/// A query value after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Datetime(DateTime<Utc>),
}

/// A field-level comparison filter as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
    pub value_type: Option<String>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Query {:?} {} {:?} {:?}>",
            self.field,
            self.op.as_sql(),
            self.value,
            self.value_type
        )
    }
}

impl Query {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::default(),
            value: value.into(),
            value_type: None,
        }
    }

    /// Build a query from its raw request parameters; `op` defaults to `eq`.
    pub fn from_parts(
        field: String,
        op: Option<&str>,
        value: String,
        value_type: Option<String>,
    ) -> DomainResult<Self> {
        let op = match op {
            Some(op) if !op.is_empty() => op.parse()?,
            _ => FilterOp::default(),
        };
        Ok(Self {
            field,
            op,
            value,
            value_type: value_type.filter(|t| !t.is_empty()),
        })
    }

    /// Convert the raw value to its declared type, or infer one from the
    /// literal when no type was given.
    pub fn value_as_type(&self) -> DomainResult<QueryValue> {
        let Some(declared) = self.value_type.as_deref() else {
            return Ok(infer_literal(&self.value));
        };
        let query_type = QueryType::parse(declared)?;
        coerce(&self.value, query_type).ok_or_else(|| {
            DomainError::InvalidQuery(format!(
                "Unable to convert the value {} to the expected data type {}.",
                self.value, declared
            ))
        })
    }

    /// Turn this query into a storage filter on a declared device field.
    pub fn to_filter(&self) -> DomainResult<DeviceFilter> {
        let field: DeviceField = self.field.parse().map_err(|_| {
            DomainError::InvalidQuery(format!("Unknown query field: {}", self.field))
        })?;

        // untyped values on text columns are taken literally
        let value = if self.value_type.is_none() && is_text_field(field) {
            FieldValue::Text(self.value.clone())
        } else {
            match self.value_as_type()? {
                QueryValue::Integer(i) => FieldValue::Integer(i),
                QueryValue::String(s) => FieldValue::Text(s),
                QueryValue::Datetime(ts) => FieldValue::Timestamp(ts),
                QueryValue::Float(_) | QueryValue::Boolean(_) => {
                    return Err(DomainError::InvalidQuery(format!(
                        "Field {} cannot be compared with {}",
                        field, self.value
                    )))
                }
            }
        };

        DeviceFilter::new(field, self.op, value)
    }
}

fn is_text_field(field: DeviceField) -> bool {
    matches!(
        field,
        DeviceField::Uuid
            | DeviceField::Name
            | DeviceField::Desc
            | DeviceField::ProjectId
            | DeviceField::UserId
    )
}

fn coerce(value: &str, query_type: QueryType) -> Option<QueryValue> {
    match query_type {
        QueryType::Integer => value.trim().parse().ok().map(QueryValue::Integer),
        QueryType::Float => value.trim().parse().ok().map(QueryValue::Float),
        QueryType::Boolean => parse_strict_bool(value).map(QueryValue::Boolean),
        QueryType::String => Some(QueryValue::String(value.to_string())),
        QueryType::Datetime => parse_datetime(value).map(QueryValue::Datetime),
    }
}

fn parse_strict_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "t" | "y" => Some(true),
        "false" | "no" | "off" | "0" | "f" | "n" => Some(false),
        _ => None,
    }
}

/// RFC 3339, or an ISO-8601 timestamp without offset taken as UTC
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn infer_literal(value: &str) -> QueryValue {
    if let Ok(i) = value.parse::<i64>() {
        return QueryValue::Integer(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        if f.is_finite() {
            return QueryValue::Float(f);
        }
    }
    match value {
        "True" | "true" => return QueryValue::Boolean(true),
        "False" | "false" => return QueryValue::Boolean(false),
        _ => {}
    }
    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')));
    QueryValue::String(unquoted.unwrap_or(value).to_string())
}
