//! VerDB Path Extraction
//!
//! Dotted-path value extraction used by change detection and the
//! update-keys side channel.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use std::collections::HashMap;
use verdb_document::{Document, Value};

/// Values reachable at `path`, in document order.
///
/// Object fields are descended directly. A list met before the last segment
/// fans out into its object elements; non-object elements are ignored. At
/// the last segment the value is collected as is, lists included. Null and
/// missing values are skipped.
pub fn collect_values<'a>(data: &'a HashMap<String, Value>, path: &str) -> Vec<&'a Value> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut frontier = vec![data];
    let mut values = Vec::new();

    for (i, part) in parts.iter().enumerate() {
        let last = i + 1 == parts.len();
        let mut next = Vec::new();

        for node in frontier {
            match node.get(*part) {
                None | Some(Value::Null) => {}
                Some(value) if last => values.push(value),
                Some(Value::Object(obj)) => next.push(obj),
                Some(Value::Array(items)) => {
                    next.extend(items.iter().filter_map(Value::as_object));
                }
                Some(_) => {}
            }
        }

        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    values
}

/// Value at `path` descending object fields only. Null counts as absent.
pub fn object_value<'a>(data: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    (!current.is_null()).then_some(current)
}

/// True when any path's extracted sequence differs between the documents.
///
/// Sequences must match in length and order; numbers compare by value.
pub fn changed(old: &Document, new: &Document, keys: &[String]) -> bool {
    keys.iter().any(|key| {
        let before = collect_values(&old.data, key);
        let after = collect_values(&new.data, key);
        before.len() != after.len() || before.iter().zip(&after).any(|(a, b)| !a.loose_eq(b))
    })
}

// =============================================================================
// Tests
// =============================================================================
