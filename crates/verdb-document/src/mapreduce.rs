//! VerDB Map-Reduce
//!
//! Declarative map-reduce: each matching document emits `(key, value)` from
//! two field paths and a built-in reducer folds the values per key. Results
//! are `{_id: key, value}` rows, returned inline or written to a collection.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::pipeline::Accumulator;
use crate::types::{Document, DocumentId, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Specification
// =============================================================================

/// Field paths emitted per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapSpec {
    pub key: String,
    /// Emitted value path; each document emits `1` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Built-in reducers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Count,
    Min,
    Max,
    Avg,
    Push,
}

impl Reducer {
    fn reduce(&self, values: Vec<Value>) -> Value {
        let acc = match self {
            Self::Count => return Value::from(values.len()),
            Self::Sum => Accumulator::Sum,
            Self::Min => Accumulator::Min,
            Self::Max => Accumulator::Max,
            Self::Avg => Accumulator::Avg,
            Self::Push => Accumulator::Push,
        };
        acc.fold(values.into_iter().map(Some).collect())
    }
}

/// How results are written to the output collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Clear the output collection first.
    #[default]
    Replace,
    /// Upsert each result by key.
    Merge,
}

/// Output collection, in the source database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReduceOut {
    pub collection: String,
    #[serde(default)]
    pub mode: OutputMode,
}

/// A map-reduce job description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReduceSpec {
    pub map: MapSpec,
    pub reduce: Reducer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<MapReduceOut>,
}

// =============================================================================
// Output
// =============================================================================

/// Execution statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapReduceInfo {
    pub input_count: usize,
    pub emit_count: usize,
    pub output_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_collection: Option<String>,
    pub elapsed_ms: u64,
}

/// Map-reduce result: inline rows when no output collection was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapReduceOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
    pub info: MapReduceInfo,
}

// =============================================================================
// Execution
// =============================================================================

/// Emitted and reduced rows for one run, before output handling.
pub(crate) struct Reduced {
    pub rows: Vec<(Value, Value)>,
    pub emit_count: usize,
}

fn strip_ref(path: &str) -> &str {
    path.strip_prefix('$').unwrap_or(path)
}

/// Emit and reduce. Documents missing the key, or the value when a value
/// path is set, emit nothing. Keys keep first-seen order.
pub(crate) fn map_reduce(spec: &MapReduceSpec, docs: &[Document]) -> Reduced {
    let key_path = strip_ref(&spec.map.key);
    let value_path = spec.map.value.as_deref().map(strip_ref);

    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut emit_count = 0;

    for doc in docs {
        let Some(key) = doc.get_field(key_path) else {
            continue;
        };
        let value = match value_path {
            Some(path) => match doc.get_field(path) {
                Some(v) => v,
                None => continue,
            },
            None => Value::Int(1),
        };

        emit_count += 1;
        let slot = *slots.entry(key.canonical_string()).or_insert_with(|| {
            groups.push((key.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(value);
    }

    let rows = groups
        .into_iter()
        .map(|(key, values)| (key, spec.reduce.reduce(values)))
        .collect();

    Reduced { rows, emit_count }
}

/// `{_id: key, value}` row.
pub(crate) fn result_row(key: &Value, value: &Value) -> Value {
    Value::Object(HashMap::from([
        ("_id".to_string(), key.clone()),
        ("value".to_string(), value.clone()),
    ]))
}

/// Output document for a reduced key. String keys are used verbatim as the
/// document ID; other keys use their canonical text.
pub(crate) fn output_document(key: &Value, value: &Value) -> Document {
    let id = match key {
        Value::String(s) => DocumentId::new(s.clone()),
        other => DocumentId::new(other.canonical_string()),
    };
    let mut doc = Document::with_id(id);
    doc.set("value", value.clone());
    doc
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            json!({"dept": "ops", "salary": 10}),
            json!({"dept": "dev", "salary": 20}),
            json!({"dept": "ops", "salary": 30}),
            json!({"salary": 99}),
            json!({"dept": "dev"}),
        ]
        .into_iter()
        .filter_map(Document::from_json)
        .collect()
    }

    #[test]
    fn test_spec_parsing() {
        let spec: MapReduceSpec = serde_json::from_value(json!({
            "map": {"key": "$dept", "value": "salary"},
            "reduce": "sum",
            "out": {"collection": "totals"}
        }))
        .unwrap();
        assert_eq!(spec.reduce, Reducer::Sum);
        assert_eq!(spec.out.unwrap().mode, OutputMode::Replace);

        let bad: Result<MapReduceSpec, _> =
            serde_json::from_value(json!({"map": {"key": "a"}, "reduce": "median"}));
        assert!(bad.is_err());
    }

    #[test]
    fn test_sum_by_key() {
        let spec: MapReduceSpec = serde_json::from_value(json!({
            "map": {"key": "dept", "value": "salary"},
            "reduce": "sum"
        }))
        .unwrap();
        let reduced = map_reduce(&spec, &docs());

        assert_eq!(reduced.emit_count, 3);
        assert_eq!(
            reduced.rows,
            vec![
                (Value::from("ops"), Value::Int(40)),
                (Value::from("dev"), Value::Int(20)),
            ]
        );
    }

    #[test]
    fn test_count_without_value_path() {
        let spec: MapReduceSpec = serde_json::from_value(json!({
            "map": {"key": "dept"},
            "reduce": "count"
        }))
        .unwrap();
        let reduced = map_reduce(&spec, &docs());

        assert_eq!(reduced.emit_count, 4);
        assert_eq!(reduced.rows[1], (Value::from("dev"), Value::Int(2)));
    }

    #[test]
    fn test_output_document_ids() {
        let doc = output_document(&Value::Int(7), &Value::Int(1));
        assert_eq!(doc.id.as_str(), "7");
        let doc = output_document(&Value::from("ops"), &Value::Int(1));
        assert_eq!(doc.id.as_str(), "ops");
    }
}
