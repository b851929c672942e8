//! Proposed changes to an entity.

use crate::entity::{EntityKind, EntityStatus};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A proposed change: an optional status transition plus field updates.
///
/// On application, `status` sets the entity's status field and `fields`
/// shallow-merge into the attribute map, last write wins per key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Patch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Patch {
    /// A patch that only changes status.
    pub fn status_change(status: impl Into<EntityStatus>) -> Self {
        Self {
            status: Some(status.into()),
            fields: BTreeMap::new(),
        }
    }

    /// A patch that only updates fields.
    pub fn fields(fields: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            status: None,
            fields,
        }
    }

    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.fields.is_empty()
    }

    /// Parse a raw JSON object into a patch for the given entity kind.
    ///
    /// This is the boundary coercion point: a `"status"` key must be a
    /// string naming a status of that kind; every other top-level key is
    /// carried as an opaque field value.
    pub fn from_json(kind: EntityKind, raw: &serde_json::Value) -> Result<Self, ParseError> {
        let object = raw
            .as_object()
            .ok_or_else(|| ParseError::InvalidPatch("patch must be a JSON object".to_string()))?;

        let mut patch = Patch::default();
        for (key, value) in object {
            if key == "status" {
                let text = value.as_str().ok_or_else(|| {
                    ParseError::InvalidPatch("status must be a string".to_string())
                })?;
                patch.status = Some(EntityStatus::parse(kind, text)?);
            } else {
                patch.fields.insert(key.clone(), value.clone());
            }
        }
        Ok(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PackageStatus;
    use serde_json::json;

    #[test]
    fn from_json_splits_status_and_fields() {
        let raw = json!({"status": "submitted", "metadata": {"note": "q3"}});
        let patch = Patch::from_json(EntityKind::Package, &raw).unwrap();
        assert_eq!(
            patch.status,
            Some(EntityStatus::Package(PackageStatus::Submitted))
        );
        assert_eq!(patch.fields["metadata"], json!({"note": "q3"}));
    }

    #[test]
    fn from_json_rejects_foreign_status() {
        let raw = json!({"status": "in_progress"});
        assert!(Patch::from_json(EntityKind::Package, &raw).is_err());
    }

    #[test]
    fn from_json_rejects_non_object() {
        assert!(Patch::from_json(EntityKind::Task, &json!("status")).is_err());
    }
}
