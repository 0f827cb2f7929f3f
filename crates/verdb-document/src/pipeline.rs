//! VerDB Aggregation Pipeline
//!
//! Mongo-style aggregation stages evaluated over a collection's documents.
//! Rows flow between stages as object values; `$group` output need not carry
//! a string `_id`.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::query::{Filter, Projection, Sort};
use crate::types::{Document, DocumentId, Value};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use verdb_common::{StoreError, StoreResult};

// =============================================================================
// Expressions
// =============================================================================

/// Value expression used by `$group`: `"$field.path"`, a literal, or an
/// object of expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Field(String),
    Literal(Value),
    Object(Vec<(String, Expr)>),
}

impl Expr {
    fn parse(json: &JsonValue) -> Self {
        match json {
            JsonValue::String(s) if s.starts_with('$') => Self::Field(s[1..].to_string()),
            JsonValue::Object(map) => Self::Object(
                map.iter().map(|(k, v)| (k.clone(), Self::parse(v))).collect(),
            ),
            other => Self::Literal(Value::from_json(other.clone())),
        }
    }

    /// Evaluate against a row. A field reference to a missing path yields `None`.
    fn eval(&self, row: &Value) -> Option<Value> {
        match self {
            Self::Field(path) => row.get_path(path).cloned(),
            Self::Literal(value) => Some(value.clone()),
            Self::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .map(|(k, e)| (k.clone(), e.eval(row).unwrap_or(Value::Null)))
                    .collect(),
            )),
        }
    }
}

// =============================================================================
// Accumulators
// =============================================================================

/// Group accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
}

impl Accumulator {
    fn parse(op: &str) -> StoreResult<Self> {
        Ok(match op {
            "$sum" => Self::Sum,
            "$avg" => Self::Avg,
            "$min" => Self::Min,
            "$max" => Self::Max,
            "$first" => Self::First,
            "$last" => Self::Last,
            "$push" => Self::Push,
            "$addToSet" => Self::AddToSet,
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown accumulator: {}",
                    other
                )))
            }
        })
    }

    /// Fold the values collected for one group. `None` marks a missing input.
    pub fn fold(&self, values: Vec<Option<Value>>) -> Value {
        match self {
            Self::First => values.into_iter().next().flatten().unwrap_or(Value::Null),
            Self::Last => values.into_iter().last().flatten().unwrap_or(Value::Null),
            _ => {
                let present: Vec<Value> = values.into_iter().flatten().collect();
                self.fold_present(present)
            }
        }
    }

    fn fold_present(&self, values: Vec<Value>) -> Value {
        match self {
            Self::Sum => sum(&values),
            Self::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Self::Min => extreme(values, Ordering::Less),
            Self::Max => extreme(values, Ordering::Greater),
            Self::First => values.into_iter().next().unwrap_or(Value::Null),
            Self::Last => values.into_iter().last().unwrap_or(Value::Null),
            Self::Push => Value::Array(values),
            Self::AddToSet => {
                let mut seen = HashSet::new();
                Value::Array(
                    values
                        .into_iter()
                        .filter(|v| seen.insert(v.canonical_string()))
                        .collect(),
                )
            }
        }
    }
}

/// Sum of the numeric values; stays integral while every input is.
fn sum(values: &[Value]) -> Value {
    let mut int_total: i64 = 0;
    let mut float_total = 0.0;
    let mut integral = true;

    for value in values {
        match value {
            Value::Int(n) => match int_total.checked_add(*n) {
                Some(total) => int_total = total,
                None => {
                    integral = false;
                    float_total += *n as f64;
                }
            },
            Value::Float(f) => {
                integral = false;
                float_total += f;
            }
            _ => {}
        }
    }

    if integral {
        Value::Int(int_total)
    } else {
        Value::Float(int_total as f64 + float_total)
    }
}

fn extreme(values: Vec<Value>, want: Ordering) -> Value {
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .reduce(|best, v| if v.total_cmp(&best) == want { v } else { best })
        .unwrap_or(Value::Null)
}

// =============================================================================
// Stages
// =============================================================================

/// One aggregation stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort(Vec<Sort>),
    Skip(usize),
    Limit(usize),
    Project(Projection),
    Unwind {
        path: String,
        preserve_empty: bool,
    },
    Group {
        id: Expr,
        fields: Vec<(String, Accumulator, Expr)>,
    },
    Count(String),
}

impl Stage {
    /// Parse a pipeline given as a JSON array of single-key stage objects.
    pub fn parse_pipeline(json: &JsonValue) -> StoreResult<Vec<Stage>> {
        let stages = json
            .as_array()
            .ok_or_else(|| StoreError::InvalidQuery("pipeline must be an array".into()))?;
        stages.iter().map(Self::from_json).collect()
    }

    /// Parse one stage.
    pub fn from_json(json: &JsonValue) -> StoreResult<Stage> {
        let map = json
            .as_object()
            .filter(|m| m.len() == 1)
            .ok_or_else(|| {
                StoreError::InvalidQuery("a stage must be an object with one operator".into())
            })?;
        let (op, arg) = map
            .iter()
            .next()
            .ok_or_else(|| StoreError::InvalidQuery("empty stage".into()))?;

        match op.as_str() {
            "$match" => Ok(Self::Match(Filter::from_json(arg)?)),
            "$sort" => Ok(Self::Sort(Sort::from_json(arg)?)),
            "$skip" => Ok(Self::Skip(count_arg(op, arg)?)),
            "$limit" => Ok(Self::Limit(count_arg(op, arg)?)),
            "$project" => Projection::from_json(arg)?
                .map(Self::Project)
                .ok_or_else(|| StoreError::InvalidQuery("$project needs fields".into())),
            "$unwind" => parse_unwind(arg),
            "$group" => parse_group(arg),
            "$count" => arg
                .as_str()
                .filter(|s| !s.is_empty() && !s.starts_with('$'))
                .map(|s| Self::Count(s.to_string()))
                .ok_or_else(|| StoreError::InvalidQuery("$count needs a field name".into())),
            other => Err(StoreError::InvalidQuery(format!("unknown stage: {}", other))),
        }
    }

    fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        match self {
            Self::Match(filter) => rows
                .into_iter()
                .filter(|row| filter.matches(&row_document(row)))
                .collect(),
            Self::Sort(keys) => {
                let mut rows = rows;
                rows.sort_by(|a, b| compare_rows(keys, a, b));
                rows
            }
            Self::Skip(n) => rows.into_iter().skip(*n).collect(),
            Self::Limit(n) => rows.into_iter().take(*n).collect(),
            Self::Project(projection) => rows
                .into_iter()
                .map(|row| {
                    let projected = projection.apply(&row_document(&row));
                    let mut data = projected.data;
                    if let Some(id) = row.get_path("_id") {
                        data.insert("_id".to_string(), id.clone());
                    }
                    Value::Object(data)
                })
                .collect(),
            Self::Unwind {
                path,
                preserve_empty,
            } => rows
                .into_iter()
                .flat_map(|row| unwind(row, path, *preserve_empty))
                .collect(),
            Self::Group { id, fields } => group(rows, id, fields),
            Self::Count(field) => {
                let mut out = HashMap::new();
                out.insert(field.clone(), Value::from(rows.len()));
                vec![Value::Object(out)]
            }
        }
    }
}

/// Run a pipeline over documents.
pub fn run(stages: &[Stage], docs: Vec<Document>) -> Vec<Value> {
    let rows: Vec<Value> = docs.iter().map(document_row).collect();
    stages.iter().fold(rows, |rows, stage| stage.apply(rows))
}

// -----------------------------------------------------------------------------
// Stage helpers
// -----------------------------------------------------------------------------

fn count_arg(op: &str, arg: &JsonValue) -> StoreResult<usize> {
    arg.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} needs a non-negative integer", op)))
}

fn field_ref(arg: Option<&JsonValue>) -> Option<String> {
    arg.and_then(JsonValue::as_str)
        .and_then(|s| s.strip_prefix('$'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_unwind(arg: &JsonValue) -> StoreResult<Stage> {
    let (path, preserve_empty) = match arg {
        JsonValue::Object(map) => (
            field_ref(map.get("path")),
            map.get("preserveNullAndEmptyArrays")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false),
        ),
        other => (field_ref(Some(other)), false),
    };
    let path =
        path.ok_or_else(|| StoreError::InvalidQuery("$unwind needs a \"$field\" path".into()))?;
    Ok(Stage::Unwind {
        path,
        preserve_empty,
    })
}

fn parse_group(arg: &JsonValue) -> StoreResult<Stage> {
    let map = arg
        .as_object()
        .ok_or_else(|| StoreError::InvalidQuery("$group expects an object".into()))?;
    let id = map
        .get("_id")
        .map(Expr::parse)
        .ok_or_else(|| StoreError::InvalidQuery("$group needs an _id".into()))?;

    let mut fields = Vec::new();
    for (name, spec) in map.iter().filter(|(k, _)| k.as_str() != "_id") {
        let (op, expr) = spec
            .as_object()
            .filter(|m| m.len() == 1)
            .and_then(|m| m.iter().next())
            .ok_or_else(|| {
                StoreError::InvalidQuery(format!("{} needs exactly one accumulator", name))
            })?;
        fields.push((name.clone(), Accumulator::parse(op)?, Expr::parse(expr)));
    }

    Ok(Stage::Group { id, fields })
}

fn document_row(doc: &Document) -> Value {
    let mut data = doc.data.clone();
    data.insert("_id".to_string(), Value::String(doc.id.to_string()));
    Value::Object(data)
}

fn row_document(row: &Value) -> Document {
    let mut data = row.as_object().cloned().unwrap_or_default();
    let id = match data.remove("_id") {
        Some(Value::String(s)) => DocumentId::new(s),
        Some(other) => DocumentId::new(other.canonical_string()),
        None => DocumentId::new(""),
    };
    Document { id, data }
}

fn compare_rows(keys: &[Sort], a: &Value, b: &Value) -> Ordering {
    for key in keys {
        let left = a.get_path(&key.field).unwrap_or(&Value::Null);
        let right = b.get_path(&key.field).unwrap_or(&Value::Null);
        let ord = left.total_cmp(right);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn unwind(row: Value, path: &str, preserve_empty: bool) -> Vec<Value> {
    let items = match row.get_path(path) {
        Some(Value::Array(items)) if !items.is_empty() => items.clone(),
        Some(Value::Array(_)) | Some(Value::Null) | None => {
            return if preserve_empty { vec![row] } else { Vec::new() };
        }
        Some(_) => return vec![row],
    };

    items
        .into_iter()
        .map(|item| {
            let mut data = row.as_object().cloned().unwrap_or_default();
            crate::types::set_path(&mut data, path, item);
            Value::Object(data)
        })
        .collect()
}

fn group(rows: Vec<Value>, id: &Expr, fields: &[(String, Accumulator, Expr)]) -> Vec<Value> {
    let mut order: Vec<(Value, Vec<Vec<Option<Value>>>)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for row in &rows {
        let key = id.eval(row).unwrap_or(Value::Null);
        let slot = *slots.entry(key.canonical_string()).or_insert_with(|| {
            order.push((key.clone(), vec![Vec::new(); fields.len()]));
            order.len() - 1
        });
        for (i, (_, _, expr)) in fields.iter().enumerate() {
            order[slot].1[i].push(expr.eval(row));
        }
    }

    order
        .into_iter()
        .map(|(key, collected)| {
            let mut out = HashMap::new();
            out.insert("_id".to_string(), key);
            for ((name, acc, _), values) in fields.iter().zip(collected) {
                out.insert(name.clone(), acc.fold(values));
            }
            Value::Object(out)
        })
        .collect()
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
            json!({"_id": "1", "city": "oslo", "n": 3, "tags": ["a", "b"]}),
            json!({"_id": "2", "city": "rome", "n": 5, "tags": []}),
            json!({"_id": "3", "city": "oslo", "n": 4.5}),
        ]
        .into_iter()
        .filter_map(Document::from_json)
        .collect()
    }

    fn pipeline(json: JsonValue) -> Vec<Stage> {
        Stage::parse_pipeline(&json).unwrap()
    }

    #[test]
    fn test_match_sort_limit() {
        let stages = pipeline(json!([
            {"$match": {"city": "oslo"}},
            {"$sort": {"n": -1}},
            {"$limit": 1}
        ]));
        let out = run(&stages, docs());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_path("_id"), Some(&Value::from("3")));
    }

    #[test]
    fn test_group_accumulators() {
        let stages = pipeline(json!([
            {"$group": {
                "_id": "$city",
                "total": {"$sum": "$n"},
                "count": {"$sum": 1},
                "low": {"$min": "$n"},
                "ids": {"$push": "$_id"}
            }},
            {"$sort": {"_id": 1}}
        ]));
        let out = run(&stages, docs());
        assert_eq!(out.len(), 2);

        let oslo = &out[0];
        assert_eq!(oslo.get_path("_id"), Some(&Value::from("oslo")));
        assert_eq!(oslo.get_path("total"), Some(&Value::Float(7.5)));
        assert_eq!(oslo.get_path("count"), Some(&Value::Int(2)));
        assert_eq!(oslo.get_path("low"), Some(&Value::Int(3)));
        assert_eq!(
            oslo.get_path("ids"),
            Some(&Value::Array(vec![Value::from("1"), Value::from("3")]))
        );
        assert_eq!(out[1].get_path("total"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_unwind_and_count() {
        let stages = pipeline(json!([{"$unwind": "$tags"}, {"$count": "n"}]));
        let out = run(&stages, docs());
        assert_eq!(out, vec![Value::Object(HashMap::from([("n".to_string(), Value::Int(2))]))]);

        let preserving = pipeline(json!([
            {"$unwind": {"path": "$tags", "preserveNullAndEmptyArrays": true}}
        ]));
        assert_eq!(run(&preserving, docs()).len(), 4);
    }

    #[test]
    fn test_project_keeps_id() {
        let stages = pipeline(json!([{"$project": {"city": 1}}]));
        let out = run(&stages, docs());
        assert_eq!(out[0].get_path("_id"), Some(&Value::from("1")));
        assert!(out[0].get_path("n").is_none());
    }

    #[test]
    fn test_invalid_stages() {
        assert!(Stage::parse_pipeline(&json!({"$match": {}})).is_err());
        assert!(Stage::parse_pipeline(&json!([{"$bogus": 1}])).is_err());
        assert!(Stage::parse_pipeline(&json!([{"$limit": -1}])).is_err());
        assert!(Stage::parse_pipeline(&json!([{"$group": {"total": {"$sum": 1}}}])).is_err());
        assert!(Stage::parse_pipeline(&json!([{"$group": {"_id": null, "x": {"$median": "$n"}}}])).is_err());
    }

    #[test]
    fn test_accumulator_fold() {
        let values = vec![Some(Value::Int(2)), None, Some(Value::Int(2)), Some(Value::Int(7))];
        assert_eq!(Accumulator::Max.fold(values.clone()), Value::Int(7));
        assert_eq!(Accumulator::Avg.fold(values.clone()), Value::Float(11.0 / 3.0));
        assert_eq!(
            Accumulator::AddToSet.fold(values.clone()),
            Value::Array(vec![Value::Int(2), Value::Int(7)])
        );
        assert_eq!(Accumulator::Last.fold(values), Value::Int(7));
        assert_eq!(Accumulator::Sum.fold(Vec::new()), Value::Int(0));
    }
}
