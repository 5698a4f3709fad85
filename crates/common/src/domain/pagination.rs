use crate::domain::{Device, DeviceField, DomainError, DomainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// A typed value of one of the declared device fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Compare two values of the same kind. Text compares byte-wise, which
    /// matches the "C" collation of the relational backend.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn fits(&self, field: DeviceField) -> bool {
        matches!(
            (self, field),
            (FieldValue::Integer(_), DeviceField::Id)
                | (
                    FieldValue::Timestamp(_),
                    DeviceField::CreatedAt | DeviceField::UpdatedAt
                )
                | (
                    FieldValue::Text(_),
                    DeviceField::Uuid
                        | DeviceField::Name
                        | DeviceField::Desc
                        | DeviceField::ProjectId
                        | DeviceField::UserId
                )
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }

    /// Orient an ascending comparison for this direction
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortDir {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(DomainError::InvalidParameterValue(format!(
                "Invalid sort direction: {}. Acceptable values are 'asc' or 'desc'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SortDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyset cursor: the position of the last row of the previous page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMarker {
    pub id: i64,
    pub sort_value: FieldValue,
}

impl PageMarker {
    pub fn for_device(device: &Device, sort_key: DeviceField) -> Self {
        Self {
            id: device.id,
            sort_value: device.value_of(sort_key),
        }
    }

    /// Whether `device` sorts strictly after this marker for `[sort_key, id]`.
    pub fn precedes(&self, device: &Device, sort_key: DeviceField, sort_dir: SortDir) -> bool {
        let primary = device
            .value_of(sort_key)
            .compare(&self.sort_value)
            .unwrap_or(Ordering::Equal);
        let ordering = primary.then(device.id.cmp(&self.id));
        sort_dir.apply(ordering) == Ordering::Greater
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Lt,
    Le,
    #[default]
    Eq,
    Ne,
    Ge,
    Gt,
}

impl FilterOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Eq => "=",
            FilterOp::Ne => "<>",
            FilterOp::Ge => ">=",
            FilterOp::Gt => ">",
        }
    }

    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Ge => ordering != Ordering::Less,
            FilterOp::Gt => ordering == Ordering::Greater,
        }
    }
}

impl FromStr for FilterOp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" => Ok(FilterOp::Lt),
            "le" => Ok(FilterOp::Le),
            "eq" => Ok(FilterOp::Eq),
            "ne" => Ok(FilterOp::Ne),
            "ge" => Ok(FilterOp::Ge),
            "gt" => Ok(FilterOp::Gt),
            other => Err(DomainError::InvalidQuery(format!(
                "Invalid input for field/attribute op. Value: '{}'. unimplemented operator",
                other
            ))),
        }
    }
}

/// A typed comparison filter on one device field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub field: DeviceField,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl DeviceFilter {
    pub fn new(field: DeviceField, op: FilterOp, value: FieldValue) -> DomainResult<Self> {
        if !value.fits(field) {
            return Err(DomainError::InvalidQuery(format!(
                "Value {:?} cannot be compared with field {}",
                value, field
            )));
        }
        Ok(Self { field, op, value })
    }

    pub fn name_eq(name: impl Into<String>) -> Self {
        Self {
            field: DeviceField::Name,
            op: FilterOp::Eq,
            value: FieldValue::Text(name.into()),
        }
    }

    pub fn matches(&self, device: &Device) -> bool {
        device
            .value_of(self.field)
            .compare(&self.value)
            .map(|ordering| self.op.holds(ordering))
            .unwrap_or(false)
    }
}

/// Input for listing devices from storage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListDevicesRepoInput {
    pub filters: Vec<DeviceFilter>,
    pub limit: Option<usize>,
    pub marker: Option<PageMarker>,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
}

/// Sort column for listings; defaults to `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey(pub DeviceField);

impl Default for SortKey {
    fn default() -> Self {
        SortKey(DeviceField::Id)
    }
}

impl FromStr for SortKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<DeviceField>().map(SortKey)
    }
}

impl ListDevicesRepoInput {
    /// The full ordering `[sort_key, id]`, collapsed when sorting by id.
    pub fn sort_fields(&self) -> Vec<DeviceField> {
        if self.sort_key.0 == DeviceField::Id {
            vec![DeviceField::Id]
        } else {
            vec![self.sort_key.0, DeviceField::Id]
        }
    }
}
