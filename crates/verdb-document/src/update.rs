//! VerDB Document Updates
//!
//! Update operations applied by the store: whole-document replacement or
//! field-level `$set` / `$unset` over dotted paths.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::types::{remove_path, set_path, Document, Value};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use verdb_common::{StoreError, StoreResult};

// =============================================================================
// Update
// =============================================================================

/// A mutation applied to stored documents. The document ID never changes.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Replace every data field.
    Replace(HashMap<String, Value>),
    /// Set and remove individual (possibly dotted) fields.
    Modify {
        set: Vec<(String, Value)>,
        unset: Vec<String>,
    },
}

impl Update {
    /// A `$set` of the given fields.
    pub fn set(fields: Vec<(String, Value)>) -> Self {
        Self::Modify {
            set: fields,
            unset: Vec::new(),
        }
    }

    /// Parse a replacement document or an operator document
    /// (`{"$set": {...}, "$unset": {...}}`).
    pub fn from_json(json: &JsonValue) -> StoreResult<Self> {
        let map = json
            .as_object()
            .ok_or_else(|| StoreError::InvalidUpdate("update must be an object".into()))?;

        let has_operators = map.keys().any(|k| k.starts_with('$'));
        if !has_operators {
            let data = map
                .iter()
                .filter(|(k, _)| k.as_str() != "_id")
                .map(|(k, v)| (k.clone(), Value::from_json(v.clone())))
                .collect();
            return Ok(Self::Replace(data));
        }

        let mut set = Vec::new();
        let mut unset = Vec::new();
        for (op, operand) in map {
            let fields = operand.as_object().ok_or_else(|| {
                StoreError::InvalidUpdate(format!("{} expects an object", op))
            })?;
            match op.as_str() {
                "$set" => set.extend(
                    fields
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v.clone()))),
                ),
                "$unset" => unset.extend(fields.keys().cloned()),
                other => {
                    return Err(StoreError::InvalidUpdate(format!(
                        "unsupported update operator: {}",
                        other
                    )))
                }
            }
        }

        if set.iter().any(|(k, _)| k == "_id") || unset.iter().any(|k| k == "_id") {
            return Err(StoreError::InvalidUpdate("_id cannot be modified".into()));
        }

        Ok(Self::Modify { set, unset })
    }

    /// Apply the update to a document in place.
    pub fn apply(&self, doc: &mut Document) {
        match self {
            Self::Replace(data) => doc.data = data.clone(),
            Self::Modify { set, unset } => {
                for (path, value) in set {
                    set_path(&mut doc.data, path, value.clone());
                }
                for path in unset {
                    remove_path(&mut doc.data, path);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
