use crate::domain::{
    Device, DeviceChanges, DeviceField, DeviceFilter, DeviceIdentity, DeviceRepository,
    DomainError, DomainResult, FieldValue, ListDevicesRepoInput, PageMarker, SortDir, SortKey,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const OBJ_NAMESPACE: &str = "iot";

/// Serialized, versioned form of a domain object as carried on the RPC wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPrimitive {
    #[serde(rename = "iot_object.name")]
    pub name: String,
    #[serde(rename = "iot_object.namespace")]
    pub namespace: String,
    #[serde(rename = "iot_object.version")]
    pub version: String,
    #[serde(rename = "iot_object.data")]
    pub data: Value,
    #[serde(rename = "iot_object.changes", default)]
    pub changes: Vec<String>,
}

/// The set attributes of a device object; unset ones are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct DeviceObjectData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Parameters for [`DeviceObject::list`]
#[derive(Debug, Clone, Default)]
pub struct ListDevicesParams<'a> {
    pub limit: Option<usize>,
    pub marker: Option<&'a DeviceObject>,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
    pub filters: Vec<DeviceFilter>,
}

/// Versioned in-memory device, sitting between the wire and the stored row.
///
/// Attributes are optional because an object may be partially populated
/// (e.g. built from a create request). Mutations go through the setters so
/// they are recorded in the change-set, which is all that `create` and
/// `save` ever persist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceObject {
    pub id: Option<i64>,
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub desc: Option<String>,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    changes: DeviceChanges,
}

impl DeviceObject {
    pub const OBJ_NAME: &'static str = "Device";
    pub const VERSION: &'static str = "1.0";

    pub fn new() -> Self {
        Self::default()
    }

    /// Copies every declared field from a stored row; the result has no
    /// pending changes.
    pub fn from_record(device: Device) -> Self {
        Self {
            id: Some(device.id),
            uuid: Some(device.uuid),
            name: Some(device.name),
            desc: Some(device.desc),
            project_id: Some(device.project_id),
            user_id: Some(device.user_id),
            created_at: Some(device.created_at),
            updated_at: Some(device.updated_at),
            changes: DeviceChanges::default(),
        }
    }

    pub async fn get(repo: &dyn DeviceRepository, identifier: &str) -> DomainResult<Self> {
        match DeviceIdentity::parse(identifier)? {
            DeviceIdentity::Id(id) => Self::get_by_id(repo, id).await,
            DeviceIdentity::Uuid(uuid) => Self::get_by_uuid(repo, &uuid).await,
        }
    }

    pub async fn get_by_id(repo: &dyn DeviceRepository, id: i64) -> DomainResult<Self> {
        repo.get_device_by_id(id).await.map(Self::from_record)
    }

    pub async fn get_by_uuid(repo: &dyn DeviceRepository, uuid: &str) -> DomainResult<Self> {
        repo.get_device_by_uuid(uuid).await.map(Self::from_record)
    }

    pub async fn list(
        repo: &dyn DeviceRepository,
        params: ListDevicesParams<'_>,
    ) -> DomainResult<Vec<Self>> {
        let marker = params
            .marker
            .map(|marker| marker.page_marker(params.sort_key.0))
            .transpose()?;

        let devices = repo
            .get_device_list(ListDevicesRepoInput {
                filters: params.filters,
                limit: params.limit,
                marker,
                sort_key: params.sort_key,
                sort_dir: params.sort_dir,
            })
            .await?;

        Ok(devices.into_iter().map(Self::from_record).collect())
    }

    /// Like [`DeviceObject::list`], with the page marker given by uuid.
    pub async fn list_after_uuid(
        repo: &dyn DeviceRepository,
        limit: Option<usize>,
        marker_uuid: Option<&str>,
        sort_key: SortKey,
        sort_dir: SortDir,
        filters: Vec<DeviceFilter>,
    ) -> DomainResult<Vec<Self>> {
        let marker = match marker_uuid {
            Some(uuid) => Some(Self::get_by_uuid(repo, uuid).await?),
            None => None,
        };

        Self::list(
            repo,
            ListDevicesParams {
                limit,
                marker: marker.as_ref(),
                sort_key,
                sort_dir,
                filters,
            },
        )
        .await
    }

    /// Persist a new device from the pending changes and load the stored row.
    pub async fn create(&mut self, repo: &dyn DeviceRepository) -> DomainResult<()> {
        let device = repo.create_device(self.changes.clone()).await?;
        *self = Self::from_record(device);
        Ok(())
    }

    /// Persist pending changes. Nothing is sent when there are none.
    pub async fn save(&mut self, repo: &dyn DeviceRepository) -> DomainResult<()> {
        if self.changes.is_empty() {
            debug!("no pending changes, skipping save");
            return Ok(());
        }
        let uuid = self.require_uuid()?;
        let device = repo.update_device(&uuid, self.changes.clone()).await?;
        *self = Self::from_record(device);
        Ok(())
    }

    pub async fn destroy(&mut self, repo: &dyn DeviceRepository) -> DomainResult<()> {
        let uuid = self.require_uuid()?;
        repo.destroy_device(&uuid).await?;
        self.reset_changes();
        Ok(())
    }

    /// Reload from storage, overwriting only the attributes whose stored value
    /// differs. Returns the attributes that were touched.
    pub async fn refresh(&mut self, repo: &dyn DeviceRepository) -> DomainResult<Vec<DeviceField>> {
        let uuid = self.require_uuid()?;
        let current = repo.get_device_by_uuid(&uuid).await?;
        let mut touched = Vec::new();

        macro_rules! sync {
            ($attr:ident, $field:expr, $value:expr) => {
                if self.$attr.as_ref() != Some(&$value) {
                    self.$attr = Some($value);
                    touched.push($field);
                }
            };
            // writable attributes also drop a pending change the stored value replaced
            ($attr:ident, $field:expr, $value:expr, tracked) => {
                if self.$attr.as_ref() != Some(&$value) {
                    self.$attr = Some($value);
                    self.changes.$attr = None;
                    touched.push($field);
                }
            };
        }

        sync!(id, DeviceField::Id, current.id);
        sync!(uuid, DeviceField::Uuid, current.uuid, tracked);
        sync!(name, DeviceField::Name, current.name, tracked);
        sync!(desc, DeviceField::Desc, current.desc, tracked);
        sync!(project_id, DeviceField::ProjectId, current.project_id, tracked);
        sync!(user_id, DeviceField::UserId, current.user_id, tracked);
        sync!(created_at, DeviceField::CreatedAt, current.created_at);
        sync!(updated_at, DeviceField::UpdatedAt, current.updated_at);

        Ok(touched)
    }

    pub fn set_uuid(&mut self, uuid: impl Into<String>) -> &DeviceChanges {
        let uuid = uuid.into();
        self.uuid = Some(uuid.clone());
        self.changes.uuid = Some(uuid);
        &self.changes
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &DeviceChanges {
        let name = name.into();
        self.name = Some(name.clone());
        self.changes.name = Some(name);
        &self.changes
    }

    pub fn set_desc(&mut self, desc: impl Into<String>) -> &DeviceChanges {
        let desc = desc.into();
        self.desc = Some(desc.clone());
        self.changes.desc = Some(desc);
        &self.changes
    }

    pub fn set_project_id(&mut self, project_id: impl Into<String>) -> &DeviceChanges {
        let project_id = project_id.into();
        self.project_id = Some(project_id.clone());
        self.changes.project_id = Some(project_id);
        &self.changes
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) -> &DeviceChanges {
        let user_id = user_id.into();
        self.user_id = Some(user_id.clone());
        self.changes.user_id = Some(user_id);
        &self.changes
    }

    /// Apply a whole change-set through the setters
    pub fn apply_changes(&mut self, changes: &DeviceChanges) {
        if let Some(uuid) = &changes.uuid {
            self.set_uuid(uuid.clone());
        }
        if let Some(name) = &changes.name {
            self.set_name(name.clone());
        }
        if let Some(desc) = &changes.desc {
            self.set_desc(desc.clone());
        }
        if let Some(project_id) = &changes.project_id {
            self.set_project_id(project_id.clone());
        }
        if let Some(user_id) = &changes.user_id {
            self.set_user_id(user_id.clone());
        }
    }

    pub fn changes(&self) -> &DeviceChanges {
        &self.changes
    }

    pub fn reset_changes(&mut self) {
        self.changes = DeviceChanges::default();
    }

    pub fn value_of(&self, field: DeviceField) -> Option<FieldValue> {
        match field {
            DeviceField::Id => self.id.map(FieldValue::Integer),
            DeviceField::Uuid => self.uuid.clone().map(FieldValue::Text),
            DeviceField::Name => self.name.clone().map(FieldValue::Text),
            DeviceField::Desc => self.desc.clone().map(FieldValue::Text),
            DeviceField::ProjectId => self.project_id.clone().map(FieldValue::Text),
            DeviceField::UserId => self.user_id.clone().map(FieldValue::Text),
            DeviceField::CreatedAt => self.created_at.map(FieldValue::Timestamp),
            DeviceField::UpdatedAt => self.updated_at.map(FieldValue::Timestamp),
        }
    }

    /// Keyset cursor positioned on this (loaded) device.
    pub fn page_marker(&self, sort_key: DeviceField) -> DomainResult<PageMarker> {
        match (self.id, self.value_of(sort_key)) {
            (Some(id), Some(sort_value)) => Ok(PageMarker { id, sort_value }),
            _ => Err(DomainError::Invalid(format!(
                "marker device has no value for {}",
                sort_key
            ))),
        }
    }

    fn require_uuid(&self) -> DomainResult<String> {
        self.uuid
            .clone()
            .ok_or_else(|| DomainError::Invalid("device has no uuid".to_string()))
    }

    pub fn to_primitive(&self) -> DomainResult<ObjectPrimitive> {
        let data = DeviceObjectData {
            id: self.id,
            uuid: self.uuid.clone(),
            name: self.name.clone(),
            desc: self.desc.clone(),
            project_id: self.project_id.clone(),
            user_id: self.user_id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        Ok(ObjectPrimitive {
            name: Self::OBJ_NAME.to_string(),
            namespace: OBJ_NAMESPACE.to_string(),
            version: Self::VERSION.to_string(),
            data: serde_json::to_value(data).map_err(|e| DomainError::RepositoryError(e.into()))?,
            changes: self
                .changes
                .fields()
                .iter()
                .map(|field| field.as_str().to_string())
                .collect(),
        })
    }

    /// Rebuild an object from its primitive, after checking that its type
    /// and version are ones this build understands.
    pub fn from_primitive(primitive: ObjectPrimitive) -> DomainResult<Self> {
        if primitive.name != Self::OBJ_NAME || primitive.namespace != OBJ_NAMESPACE {
            return Err(DomainError::UnsupportedObjectType(primitive.name));
        }
        check_version_compatible(&primitive.name, &primitive.version, Self::VERSION)?;

        let data: DeviceObjectData = serde_json::from_value(primitive.data)
            .map_err(|e| DomainError::Invalid(format!("malformed Device primitive: {}", e)))?;

        let mut changes = DeviceChanges::default();
        for change in &primitive.changes {
            match change.parse::<DeviceField>() {
                Ok(DeviceField::Uuid) => changes.uuid = data.uuid.clone(),
                Ok(DeviceField::Name) => changes.name = data.name.clone(),
                Ok(DeviceField::Desc) => changes.desc = data.desc.clone(),
                Ok(DeviceField::ProjectId) => changes.project_id = data.project_id.clone(),
                Ok(DeviceField::UserId) => changes.user_id = data.user_id.clone(),
                Ok(_) => {}
                Err(_) => {
                    return Err(DomainError::Invalid(format!(
                        "unknown changed field {} in Device primitive",
                        change
                    )))
                }
            }
        }

        Ok(Self {
            id: data.id,
            uuid: data.uuid,
            name: data.name,
            desc: data.desc,
            project_id: data.project_id,
            user_id: data.user_id,
            created_at: data.created_at,
            updated_at: data.updated_at,
            changes,
        })
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Same major version and a minor no newer than ours.
fn check_version_compatible(name: &str, remote: &str, local: &str) -> DomainResult<()> {
    let incompatible = || DomainError::IncompatibleObjectVersion {
        name: name.to_string(),
        version: remote.to_string(),
    };
    let (remote_major, remote_minor) = parse_version(remote).ok_or_else(incompatible)?;
    let (local_major, local_minor) = parse_version(local).ok_or_else(incompatible)?;

    if remote_major != local_major || remote_minor > local_minor {
        return Err(incompatible());
    }
    Ok(())
}
