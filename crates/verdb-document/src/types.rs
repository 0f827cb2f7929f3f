//! VerDB Document Types
//!
//! Core data types for document storage.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Document ID
// =============================================================================

/// Unique identifier for a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A document value that can be any JSON-compatible type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get a value at a path (e.g., "user.address.city").
    ///
    /// Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        self.get_path_parts(&parts)
    }

    fn get_path_parts(&self, parts: &[&str]) -> Option<&Value> {
        if parts.is_empty() {
            return Some(self);
        }

        let key = parts[0];
        let rest = &parts[1..];

        match self {
            Self::Object(obj) => obj.get(key).and_then(|v| v.get_path_parts(rest)),
            Self::Array(arr) => key
                .parse::<usize>()
                .ok()
                .and_then(|idx| arr.get(idx))
                .and_then(|v| v.get_path_parts(rest)),
            _ => None,
        }
    }

    /// Numeric-aware equality: `Int(1)` equals `Float(1.0)`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Self::Object(a), Self::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map_or(false, |w| v.loose_eq(w)))
            }
            _ => self == other,
        }
    }

    /// Total order across all value types, used for sorting and min/max.
    ///
    /// Types rank as null < numbers < strings < objects < arrays < booleans.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let rank = |v: &Value| match v {
            Self::Null => 0,
            Self::Int(_) | Self::Float(_) => 1,
            Self::String(_) => 2,
            Self::Object(_) => 3,
            Self::Array(_) => 4,
            Self::Bool(_) => 5,
        };

        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (a, b) if a.is_number() && b.is_number() => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Object(_), Self::Object(_)) => self.canonical_string().cmp(&other.canonical_string()),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Deterministic textual form usable as a hash key.
    ///
    /// Object keys are sorted and integral floats render as integers, so
    /// values that are `loose_eq` produce the same string.
    pub fn canonical_string(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Self::String(s) => JsonValue::String(s.clone()).to_string(),
            Self::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.canonical_string()).collect();
                format!("[{}]", items.join(","))
            }
            Self::Object(obj) => {
                let mut keys: Vec<&String> = obj.keys().collect();
                keys.sort();
                let items: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{}:{}", JsonValue::String(k.clone()), obj[k].canonical_string()))
                    .collect();
                format!("{{{}}}", items.join(","))
            }
        }
    }

    /// Convert from serde_json::Value.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Float(0.0)
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(arr) => Self::Array(arr.into_iter().map(Self::from_json).collect()),
            JsonValue::Object(obj) => {
                Self::Object(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert to serde_json::Value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            Self::Object(obj) => {
                JsonValue::Object(obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Self::Array(arr)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(obj: HashMap<String, Value>) -> Self {
        Self::Object(obj)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Self::from_json(json)
    }
}

// =============================================================================
// Path Helpers
// =============================================================================

/// Set `value` at a dotted path inside `data`, creating intermediate objects.
///
/// A non-object found on the way is replaced by an object.
pub fn set_path(data: &mut HashMap<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            data.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = data
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(HashMap::new()));
            if !child.is_object() {
                *child = Value::Object(HashMap::new());
            }
            if let Value::Object(inner) = child {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Remove the value at a dotted path inside `data`.
pub fn remove_path(data: &mut HashMap<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => data.remove(path),
        Some((head, rest)) => match data.get_mut(head) {
            Some(Value::Object(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

// =============================================================================
// Document
// =============================================================================

/// A document in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    #[serde(flatten)]
    pub data: HashMap<String, Value>,
}

impl Document {
    /// Create a new document with an auto-generated ID.
    pub fn new() -> Self {
        Self {
            id: DocumentId::generate(),
            data: HashMap::new(),
        }
    }

    /// Create a document with a specific ID.
    pub fn with_id(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            data: HashMap::new(),
        }
    }

    /// Create a document from existing field data with a fresh ID.
    pub fn from_data(data: HashMap<String, Value>) -> Self {
        Self {
            id: DocumentId::generate(),
            data,
        }
    }

    /// Create a document from JSON.
    ///
    /// A string or numeric `_id` becomes the document ID; every other field,
    /// including underscore-prefixed ones, is kept as data.
    pub fn from_json(json: JsonValue) -> Option<Self> {
        match json {
            JsonValue::Object(mut obj) => {
                let id = match obj.remove("_id") {
                    Some(JsonValue::String(s)) => DocumentId::new(s),
                    Some(JsonValue::Number(n)) => DocumentId::new(n.to_string()),
                    _ => DocumentId::generate(),
                };

                let data: HashMap<String, Value> = obj
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect();

                Some(Self { id, data })
            }
            _ => None,
        }
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        obj.insert("_id".to_string(), JsonValue::String(self.id.0.clone()));

        for (k, v) in &self.data {
            obj.insert(k.clone(), v.to_json());
        }

        JsonValue::Object(obj)
    }

    /// Get a field value. `_id` resolves to the document ID.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key.contains('.') {
            let parts: Vec<&str> = key.splitn(2, '.').collect();
            self.data
                .get(parts[0])
                .and_then(|v| v.get_path(parts[1]))
        } else {
            self.data.get(key)
        }
    }

    /// Get a field value, resolving `_id` to an owned string value.
    pub fn get_field(&self, key: &str) -> Option<Value> {
        if key == "_id" {
            return Some(Value::String(self.id.0.clone()));
        }
        self.get(key).cloned()
    }

    /// Set a top-level field value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Set a value at a dotted path.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        set_path(&mut self.data, path, value.into());
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Check if a field exists.
    pub fn contains(&self, key: &str) -> bool {
        key == "_id" || self.get(key).is_some()
    }

    /// Get all field names.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 32);

        let id3 = DocumentId::new("custom-id");
        assert_eq!(id3.as_str(), "custom-id");
    }

    #[test]
    fn test_value_path() {
        let value = Value::from_json(json!({"address": {"city": "NYC"}, "tags": ["a", "b"]}));

        assert_eq!(
            value.get_path("address.city").and_then(|v| v.as_str()),
            Some("NYC")
        );
        assert_eq!(value.get_path("tags.1").and_then(|v| v.as_str()), Some("b"));
        assert!(value.get_path("address.zip").is_none());
    }

    #[test]
    fn test_loose_eq_and_canonical() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).loose_eq(&Value::String("1".into())));
        assert_eq!(Value::Int(1).canonical_string(), Value::Float(1.0).canonical_string());

        let a = Value::from_json(json!({"x": 1, "y": [1, 2]}));
        let b = Value::from_json(json!({"y": [1, 2], "x": 1}));
        assert_eq!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn test_total_cmp_ranks_types() {
        assert_eq!(Value::Null.total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(2).total_cmp(&Value::Float(1.5)), Ordering::Greater);
        assert_eq!(Value::from("b").total_cmp(&Value::from("a")), Ordering::Greater);
        assert_eq!(Value::from("z").total_cmp(&Value::Bool(false)), Ordering::Less);
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut doc = Document::new();
        doc.set("j", 5i64);
        doc.set_path("j.k", 2i64);
        doc.set_path("a.b.c", "deep");

        assert_eq!(doc.get("j.k").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(doc.get("a.b.c").and_then(|v| v.as_str()), Some("deep"));

        assert!(remove_path(&mut doc.data, "a.b.c").is_some());
        assert!(doc.get("a.b.c").is_none());
        assert!(doc.get("a.b").is_some());
    }

    #[test]
    fn test_document_from_json_keeps_reserved_fields() {
        let doc = Document::from_json(json!({
            "_id": "doc123",
            "name": "Bob",
            "_ver": 3,
            "_is_latest": true
        }))
        .unwrap();

        assert_eq!(doc.id.as_str(), "doc123");
        assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Bob"));
        assert_eq!(doc.get("_ver").and_then(|v| v.as_i64()), Some(3));
        assert!(doc.get("_id").is_none());
        assert_eq!(doc.get_field("_id"), Some(Value::from("doc123")));
    }

    #[test]
    fn test_json_conversion() {
        let mut doc = Document::with_id("test-doc");
        doc.set("count", 100i64);
        doc.set("ratio", 0.5f64);

        let json = doc.to_json();
        assert_eq!(json["_id"], "test-doc");
        assert_eq!(json["count"], 100);
        assert_eq!(json["ratio"], 0.5);
    }
}
