use crate::domain::{
    Device, DeviceChanges, DeviceField, DeviceIdentity, DeviceRepository, DomainError,
    DomainResult, FieldValue, ListDevicesRepoInput, SortDir,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const DEVICE_COLUMNS: &str =
    "id, uuid, name, \"desc\", project_id, user_id, created_at, updated_at";

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Device row as stored in the `device` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRow {
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub desc: String,
    pub project_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for DeviceRow {
    fn from(row: &Row) -> Self {
        DeviceRow {
            id: row.get(0),
            uuid: row.get(1),
            name: row.get(2),
            desc: row.get(3),
            project_id: row.get(4),
            user_id: row.get(5),
            created_at: row.get(6),
            updated_at: row.get(7),
        }
    }
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            desc: row.desc,
            project_id: row.project_id,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn device_from_row(row: &Row) -> Device {
    DeviceRow::from(row).into()
}

fn field_param(value: &FieldValue) -> SqlParam {
    match value {
        FieldValue::Integer(v) => Box::new(*v),
        FieldValue::Text(v) => Box::new(v.clone()),
        FieldValue::Timestamp(v) => Box::new(*v),
    }
}

/// Column and parameter used to address a single row
fn identity_predicate(identity: &DeviceIdentity) -> (&'static str, SqlParam) {
    match identity {
        DeviceIdentity::Id(id) => ("id", Box::new(*id)),
        DeviceIdentity::Uuid(uuid) => ("uuid", Box::new(uuid.clone())),
    }
}

fn as_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// Builds the filtered, keyset-paginated select for a listing.
fn build_list_query(input: &ListDevicesRepoInput) -> (String, Vec<SqlParam>) {
    let mut clauses = Vec::new();
    let mut params: Vec<SqlParam> = Vec::new();

    for filter in &input.filters {
        params.push(field_param(&filter.value));
        clauses.push(format!(
            "{} {} ${}",
            filter.field.column(),
            filter.op.as_sql(),
            params.len()
        ));
    }

    let direction = match input.sort_dir {
        SortDir::Asc => ("ASC", ">"),
        SortDir::Desc => ("DESC", "<"),
    };
    let sort_fields = input.sort_fields();

    if let Some(marker) = &input.marker {
        if sort_fields.len() == 1 {
            params.push(Box::new(marker.id));
            clauses.push(format!("id {} ${}", direction.1, params.len()));
        } else {
            params.push(field_param(&marker.sort_value));
            let sort_param = params.len();
            params.push(Box::new(marker.id));
            clauses.push(format!(
                "({}, id) {} (${}, ${})",
                input.sort_key.0.column(),
                direction.1,
                sort_param,
                params.len()
            ));
        }
    }

    let mut sql = format!("SELECT {} FROM device", DEVICE_COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let order = sort_fields
        .iter()
        .map(|field| format!("{} {}", field.column(), direction.0))
        .collect::<Vec<_>>()
        .join(", ");
    sql.push_str(" ORDER BY ");
    sql.push_str(&order);

    if let Some(limit) = input.limit {
        params.push(Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ${}", params.len()));
    }

    (sql, params)
}

/// PostgreSQL implementation of DeviceRepository trait
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn get_device_where(&self, identity: DeviceIdentity) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (column, param) = identity_predicate(&identity);
        let sql = format!("SELECT {} FROM device WHERE {} = $1", DEVICE_COLUMNS, column);
        let row = conn
            .query_opt(&sql, &[param.as_ref() as &(dyn ToSql + Sync)])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.map(|row| device_from_row(&row))
            .ok_or_else(|| DomainError::DeviceNotFound(identity.to_string()))
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, values), fields(uuid = ?values.uuid))]
    async fn create_device(&self, values: DeviceChanges) -> DomainResult<Device> {
        let uuid = values.uuid_for_create()?;
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let mut columns = vec!["uuid".to_string()];
        let mut params: Vec<SqlParam> = vec![Box::new(uuid.clone())];
        for (field, value) in values.text_columns() {
            columns.push(field.column().to_string());
            params.push(Box::new(value.to_string()));
        }
        columns.push("created_at".to_string());
        params.push(Box::new(now));
        columns.push("updated_at".to_string());
        params.push(Box::new(now));

        let placeholders = (1..=params.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO device ({}) VALUES ({}) RETURNING {}",
            columns.join(", "),
            placeholders,
            DEVICE_COLUMNS
        );

        let result = conn.query_one(&sql, &as_refs(&params)).await;

        match result {
            Ok(row) => {
                let device = device_from_row(&row);
                debug!(id = device.id, "created device: {}", device.uuid);
                Ok(device)
            }
            Err(e) => {
                // 23505 is unique_violation
                if let Some(db_err) = e.as_db_error() {
                    if db_err.code().code() == "23505" {
                        return Err(DomainError::DeviceAlreadyExists(uuid));
                    }
                }
                Err(DomainError::RepositoryError(e.into()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_device_by_id(&self, device_id: i64) -> DomainResult<Device> {
        self.get_device_where(DeviceIdentity::Id(device_id)).await
    }

    #[instrument(skip(self))]
    async fn get_device_by_uuid(&self, device_uuid: &str) -> DomainResult<Device> {
        self.get_device_where(DeviceIdentity::Uuid(device_uuid.to_string()))
            .await
    }

    #[instrument(skip(self, input), fields(limit = ?input.limit, sort_key = %input.sort_key.0, sort_dir = %input.sort_dir))]
    async fn get_device_list(&self, input: ListDevicesRepoInput) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (sql, params) = build_list_query(&input);
        let rows = conn
            .query(&sql, &as_refs(&params))
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let devices: Vec<Device> = rows.iter().map(device_from_row).collect();
        debug!("found {} devices", devices.len());
        Ok(devices)
    }

    #[instrument(skip(self, values))]
    async fn update_device(&self, device_id: &str, values: DeviceChanges) -> DomainResult<Device> {
        values.ensure_no_uuid()?;
        let identity = DeviceIdentity::parse(device_id)?;

        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let (column, param) = identity_predicate(&identity);
        let lock_sql = format!("SELECT id FROM device WHERE {} = $1 FOR UPDATE", column);
        let locked = tx
            .query_opt(&lock_sql, &[param.as_ref() as &(dyn ToSql + Sync)])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;
        let id: i64 = match locked {
            Some(row) => row.get(0),
            None => return Err(DomainError::DeviceNotFound(identity.to_string())),
        };

        let mut assignments = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();
        for (field, value) in values.text_columns() {
            params.push(Box::new(value.to_string()));
            assignments.push(format!("{} = ${}", field.column(), params.len()));
        }
        params.push(Box::new(Utc::now()));
        assignments.push(format!("updated_at = ${}", params.len()));
        params.push(Box::new(id));

        let update_sql = format!(
            "UPDATE device SET {} WHERE id = ${} RETURNING {}",
            assignments.join(", "),
            params.len(),
            DEVICE_COLUMNS
        );
        let row = tx
            .query_one(&update_sql, &as_refs(&params))
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let device = device_from_row(&row);
        debug!(fields = ?values.fields(), "updated device: {}", device.uuid);
        Ok(device)
    }

    #[instrument(skip(self))]
    async fn destroy_device(&self, device_id: &str) -> DomainResult<()> {
        let identity = DeviceIdentity::parse(device_id)?;
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let (column, param) = identity_predicate(&identity);
        let sql = format!("DELETE FROM device WHERE {} = $1", column);
        let deleted = conn
            .execute(&sql, &[param.as_ref() as &(dyn ToSql + Sync)])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if deleted == 0 {
            return Err(DomainError::DeviceNotFound(identity.to_string()));
        }

        debug!("destroyed device: {}", identity);
        Ok(())
    }
}
