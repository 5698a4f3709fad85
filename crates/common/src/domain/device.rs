use crate::domain::{
    canonical_uuid, generate_uuid, DomainError, DomainResult, FieldValue, ListDevicesRepoInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Domain representation of a stored device row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub desc: String,
    pub project_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Value of a declared field, used for filtering and cursor building.
    pub fn value_of(&self, field: DeviceField) -> FieldValue {
        match field {
            DeviceField::Id => FieldValue::Integer(self.id),
            DeviceField::Uuid => FieldValue::Text(self.uuid.clone()),
            DeviceField::Name => FieldValue::Text(self.name.clone()),
            DeviceField::Desc => FieldValue::Text(self.desc.clone()),
            DeviceField::ProjectId => FieldValue::Text(self.project_id.clone()),
            DeviceField::UserId => FieldValue::Text(self.user_id.clone()),
            DeviceField::CreatedAt => FieldValue::Timestamp(self.created_at),
            DeviceField::UpdatedAt => FieldValue::Timestamp(self.updated_at),
        }
    }
}

/// The statically declared field schema of a device.
///
/// Shared by the storage layer (columns, sort keys, filters), the object
/// layer and the API representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceField {
    Id,
    Uuid,
    Name,
    Desc,
    ProjectId,
    UserId,
    CreatedAt,
    UpdatedAt,
}

impl DeviceField {
    pub const ALL: [DeviceField; 8] = [
        DeviceField::Id,
        DeviceField::Uuid,
        DeviceField::Name,
        DeviceField::Desc,
        DeviceField::ProjectId,
        DeviceField::UserId,
        DeviceField::CreatedAt,
        DeviceField::UpdatedAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceField::Id => "id",
            DeviceField::Uuid => "uuid",
            DeviceField::Name => "name",
            DeviceField::Desc => "desc",
            DeviceField::ProjectId => "project_id",
            DeviceField::UserId => "user_id",
            DeviceField::CreatedAt => "created_at",
            DeviceField::UpdatedAt => "updated_at",
        }
    }

    /// Column reference as it must appear in SQL (`desc` is reserved)
    pub fn column(&self) -> &'static str {
        match self {
            DeviceField::Desc => "\"desc\"",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for DeviceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| DomainError::InvalidSortKey(s.to_string()))
    }
}

/// An explicit change-set: the writable fields that were set, with their
/// new values. Unset fields are left untouched by create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl DeviceChanges {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Names of the fields carried by this change-set, in schema order
    pub fn fields(&self) -> Vec<DeviceField> {
        let mut fields = Vec::new();
        if self.uuid.is_some() {
            fields.push(DeviceField::Uuid);
        }
        if self.name.is_some() {
            fields.push(DeviceField::Name);
        }
        if self.desc.is_some() {
            fields.push(DeviceField::Desc);
        }
        if self.project_id.is_some() {
            fields.push(DeviceField::ProjectId);
        }
        if self.user_id.is_some() {
            fields.push(DeviceField::UserId);
        }
        fields
    }

    /// Text-valued (column, value) pairs for the non-uuid fields, used by
    /// backends to build inserts and updates.
    pub fn text_columns(&self) -> Vec<(DeviceField, &str)> {
        [
            (DeviceField::Name, self.name.as_deref()),
            (DeviceField::Desc, self.desc.as_deref()),
            (DeviceField::ProjectId, self.project_id.as_deref()),
            (DeviceField::UserId, self.user_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
        .collect()
    }

    /// The uuid a new row should get: the provided one in canonical form, or
    /// a freshly generated one.
    pub fn uuid_for_create(&self) -> DomainResult<String> {
        match self.uuid.as_deref() {
            Some(uuid) if !uuid.is_empty() => canonical_uuid(uuid),
            _ => Ok(generate_uuid()),
        }
    }

    /// Updates may never carry a uuid.
    pub fn ensure_no_uuid(&self) -> DomainResult<()> {
        if self.uuid.is_some() {
            return Err(DomainError::InvalidParameterValue(
                "Cannot overwrite UUID for an existing Device.".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the change-set onto a stored row (used by in-memory storage).
    pub fn apply_to(&self, device: &mut Device) {
        if let Some(name) = &self.name {
            device.name = name.clone();
        }
        if let Some(desc) = &self.desc {
            device.desc = desc.clone();
        }
        if let Some(project_id) = &self.project_id {
            device.project_id = project_id.clone();
        }
        if let Some(user_id) = &self.user_id {
            device.user_id = user_id.clone();
        }
    }
}

/// Repository trait for device storage operations
/// Infrastructure layer (postgres, in-memory) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Insert a new device; a uuid is generated when the change-set lacks one
    async fn create_device(&self, values: DeviceChanges) -> DomainResult<Device>;

    async fn get_device_by_id(&self, device_id: i64) -> DomainResult<Device>;

    async fn get_device_by_uuid(&self, device_uuid: &str) -> DomainResult<Device>;

    /// Filtered, keyset-paginated listing
    async fn get_device_list(&self, input: ListDevicesRepoInput) -> DomainResult<Vec<Device>>;

    /// Field-by-field update of the device addressed by id or uuid
    async fn update_device(&self, device_id: &str, values: DeviceChanges)
        -> DomainResult<Device>;

    /// Hard delete of the device addressed by id or uuid
    async fn destroy_device(&self, device_id: &str) -> DomainResult<()>;
}
