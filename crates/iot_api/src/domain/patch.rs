use common::domain::{DeviceChanges, DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// One RFC 6902 operation, restricted to what a device accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Fold a patch document into a change-set.
///
/// Only `/name` and `/desc` are writable. Removing an attribute resets it to
/// the empty string.
pub fn changes_from_patch(patch: &[PatchOperation]) -> DomainResult<DeviceChanges> {
    let mut changes = DeviceChanges::default();

    for operation in patch {
        let target = match operation.path.as_str() {
            "/uuid" | "/id" => {
                return Err(DomainError::InvalidParameterValue(
                    "Cannot overwrite UUID for an existing Device.".to_string(),
                ))
            }
            "/name" => &mut changes.name,
            "/desc" => &mut changes.desc,
            other => {
                return Err(DomainError::PatchError(
                    other.to_string(),
                    "can't update a read-only or unknown attribute".to_string(),
                ))
            }
        };

        *target = Some(match (operation.op, &operation.value) {
            (PatchOp::Remove, _) => String::new(),
            (_, Some(Value::String(value))) => value.clone(),
            (_, Some(_)) => {
                return Err(DomainError::PatchError(
                    operation.path.clone(),
                    "value must be a string".to_string(),
                ))
            }
            (_, None) => {
                return Err(DomainError::PatchError(
                    operation.path.clone(),
                    "missing value".to_string(),
                ))
            }
        });
    }

    Ok(changes)
}
