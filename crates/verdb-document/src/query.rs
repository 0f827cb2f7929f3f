//! VerDB Document Query
//!
//! Query language for document filtering and retrieval. Filters are parsed
//! from Mongo-style JSON (`{"a": 1, "b": {"$gt": 2}}`) or built in code with
//! `QueryBuilder`.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::types::{set_path, Document, Value};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;
use verdb_common::{StoreError, StoreResult};

// =============================================================================
// Query
// =============================================================================

/// A query for filtering and shaping documents.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub projection: Option<Projection>,
}

impl Query {
    pub fn new() -> Self {
        Self {
            filter: Filter::all(),
            sort: Vec::new(),
            skip: None,
            limit: None,
            projection: None,
        }
    }

    /// Query matching `filter` with no shaping.
    pub fn filter(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::new()
        }
    }

    /// Check if a document matches this query.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.matches(doc)
    }

    /// Add sorting.
    pub fn with_sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(Sort {
            field: field.into(),
            ascending,
        });
        self
    }

    /// Add skip.
    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Add limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Sort, skip, limit and project an already filtered result set.
    pub fn shape(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| compare_by(&self.sort, a, b));
        }

        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        let docs = docs.into_iter().skip(skip).take(limit);

        match &self.projection {
            Some(projection) => docs.map(|d| projection.apply(&d)).collect(),
            None => docs.collect(),
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A `$regex` pattern, compiled when the filter is parsed.
#[derive(Debug, Clone)]
pub struct Pattern(regex::Regex);

impl Pattern {
    pub fn new(pattern: &str) -> StoreResult<Self> {
        regex::Regex::new(pattern)
            .map(Self)
            .map_err(|e| StoreError::InvalidQuery(format!("bad $regex: {}", e)))
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// A filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Nin { field: String, values: Vec<Value> },
    Exists { field: String, exists: bool },
    Regex { field: String, pattern: Pattern },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Filter matching every document.
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Conjunction, collapsing a single clause.
    pub fn and(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            filters.remove(0)
        } else {
            Self::And(filters)
        }
    }

    /// Check if a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Eq { field, value } => doc
                .get_field(field)
                .map(|v| eq_matches(&v, value))
                .unwrap_or_else(|| value.is_null()),
            Self::Ne { field, value } => !Self::Eq {
                field: field.clone(),
                value: value.clone(),
            }
            .matches(doc),
            Self::Gt { field, value } => {
                compare_field(doc, field, value, |o| o == Ordering::Greater)
            }
            Self::Gte { field, value } => {
                compare_field(doc, field, value, |o| o != Ordering::Less)
            }
            Self::Lt { field, value } => compare_field(doc, field, value, |o| o == Ordering::Less),
            Self::Lte { field, value } => {
                compare_field(doc, field, value, |o| o != Ordering::Greater)
            }
            Self::In { field, values } => match doc.get_field(field) {
                Some(v) => values.iter().any(|candidate| eq_matches(&v, candidate)),
                None => values.iter().any(|candidate| candidate.is_null()),
            },
            Self::Nin { field, values } => !Self::In {
                field: field.clone(),
                values: values.clone(),
            }
            .matches(doc),
            Self::Exists { field, exists } => doc.contains(field) == *exists,
            Self::Regex { field, pattern } => match doc.get_field(field) {
                Some(Value::String(s)) => pattern.is_match(&s),
                _ => false,
            },
            Self::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Self::Nor(filters) => !filters.iter().any(|f| f.matches(doc)),
            Self::Not(filter) => !filter.matches(doc),
        }
    }

    /// Scalar equality clauses that every matching document must satisfy.
    ///
    /// Used by collections to narrow candidates through an index.
    pub fn required_equalities(&self) -> Vec<(&str, &Value)> {
        match self {
            // Documents without the field match `null` but are absent from
            // indexes, so null equality never narrows.
            Self::Eq { field, value }
                if !value.is_null() && !value.is_array() && !value.is_object() =>
            {
                vec![(field.as_str(), value)]
            }
            Self::And(filters) => filters
                .iter()
                .flat_map(|f| f.required_equalities())
                .collect(),
            _ => Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // JSON Parsing
    // -------------------------------------------------------------------------

    /// Parse a Mongo-style JSON filter. `null` and `{}` match everything.
    pub fn from_json(json: &JsonValue) -> StoreResult<Self> {
        match json {
            JsonValue::Null => Ok(Self::all()),
            JsonValue::Object(map) => {
                let mut clauses = Vec::with_capacity(map.len());
                for (key, value) in map {
                    match key.as_str() {
                        "$and" => clauses.push(Self::And(parse_filter_list(key, value)?)),
                        "$or" => clauses.push(Self::Or(parse_filter_list(key, value)?)),
                        "$nor" => clauses.push(Self::Nor(parse_filter_list(key, value)?)),
                        op if op.starts_with('$') => {
                            return Err(StoreError::InvalidQuery(format!(
                                "unknown top-level operator: {}",
                                op
                            )))
                        }
                        field => clauses.push(parse_field(field, value)?),
                    }
                }
                Ok(Self::and(clauses))
            }
            other => Err(StoreError::InvalidQuery(format!(
                "filter must be an object, got {}",
                other
            ))),
        }
    }
}

fn parse_filter_list(op: &str, value: &JsonValue) -> StoreResult<Vec<Filter>> {
    let items = value
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} expects an array", op)))?;
    items.iter().map(Filter::from_json).collect()
}

fn is_operator_object(value: &JsonValue) -> bool {
    value
        .as_object()
        .map(|m| !m.is_empty() && m.keys().all(|k| k.starts_with('$')))
        .unwrap_or(false)
}

fn parse_field(field: &str, value: &JsonValue) -> StoreResult<Filter> {
    if !is_operator_object(value) {
        return Ok(Filter::eq(field, Value::from_json(value.clone())));
    }

    let ops = value.as_object().map(|m| m.iter().collect::<Vec<_>>()).unwrap_or_default();
    let options = value.get("$options").and_then(|o| o.as_str()).unwrap_or("");
    let mut clauses = Vec::with_capacity(ops.len());

    for (op, operand) in ops {
        let field = field.to_string();
        let clause = match op.as_str() {
            "$eq" => Filter::Eq { field, value: Value::from_json(operand.clone()) },
            "$ne" => Filter::Ne { field, value: Value::from_json(operand.clone()) },
            "$gt" => Filter::Gt { field, value: Value::from_json(operand.clone()) },
            "$gte" => Filter::Gte { field, value: Value::from_json(operand.clone()) },
            "$lt" => Filter::Lt { field, value: Value::from_json(operand.clone()) },
            "$lte" => Filter::Lte { field, value: Value::from_json(operand.clone()) },
            "$in" => Filter::In { field, values: parse_value_list(op, operand)? },
            "$nin" => Filter::Nin { field, values: parse_value_list(op, operand)? },
            "$exists" => Filter::Exists {
                field,
                exists: operand.as_bool().unwrap_or_else(|| !operand.is_null()),
            },
            "$regex" => {
                let raw = operand
                    .as_str()
                    .ok_or_else(|| StoreError::InvalidQuery("$regex expects a string".into()))?;
                let pattern = if options.contains('i') {
                    format!("(?i){}", raw)
                } else {
                    raw.to_string()
                };
                Filter::Regex { field, pattern: Pattern::new(&pattern)? }
            }
            "$options" => continue,
            "$not" => {
                let inner = if is_operator_object(operand) {
                    parse_field(&field, operand)?
                } else {
                    return Err(StoreError::InvalidQuery("$not expects an operator object".into()));
                };
                Filter::Not(Box::new(inner))
            }
            other => {
                return Err(StoreError::InvalidQuery(format!("unknown operator: {}", other)))
            }
        };
        clauses.push(clause);
    }

    Ok(Filter::and(clauses))
}

fn parse_value_list(op: &str, value: &JsonValue) -> StoreResult<Vec<Value>> {
    value
        .as_array()
        .map(|items| items.iter().cloned().map(Value::from_json).collect())
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} expects an array", op)))
}

/// Equality with array semantics: an array field matches when equal as a
/// whole or when any element equals the operand.
fn eq_matches(field_value: &Value, operand: &Value) -> bool {
    if field_value.loose_eq(operand) {
        return true;
    }
    match field_value {
        Value::Array(items) => items.iter().any(|item| item.loose_eq(operand)),
        _ => false,
    }
}

fn compare_field(
    doc: &Document,
    field: &str,
    value: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    doc.get_field(field)
        .and_then(|v| compare_values(&v, value))
        .map(accept)
        .unwrap_or(false)
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

impl Sort {
    /// Parse `"field"` (ascending) or `"-field"` (descending).
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self { field: field.to_string(), ascending: false },
            None => Self {
                field: spec.trim_start_matches('+').to_string(),
                ascending: true,
            },
        }
    }

    /// Parse `{"field": 1, "other": -1}`.
    pub fn from_json(json: &JsonValue) -> StoreResult<Vec<Self>> {
        let map = json
            .as_object()
            .ok_or_else(|| StoreError::InvalidQuery("sort must be an object".into()))?;
        map.iter()
            .map(|(field, dir)| match dir.as_i64() {
                Some(1) => Ok(Self { field: field.clone(), ascending: true }),
                Some(-1) => Ok(Self { field: field.clone(), ascending: false }),
                _ => Err(StoreError::InvalidQuery(format!(
                    "sort direction for {} must be 1 or -1",
                    field
                ))),
            })
            .collect()
    }
}

/// Compare two documents by a list of sort keys. Missing fields sort as null.
pub fn compare_by(sort: &[Sort], a: &Document, b: &Document) -> Ordering {
    for key in sort {
        let left = a.get_field(&key.field).unwrap_or(Value::Null);
        let right = b.get_field(&key.field).unwrap_or(Value::Null);
        let ord = left.total_cmp(&right);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// =============================================================================
// Projection
// =============================================================================

/// Field selection applied to query results. `_id` is always kept.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Parse `{"a": 1, "b.c": 1}` or `{"a": 0}`. Mixing modes is rejected.
    pub fn from_json(json: &JsonValue) -> StoreResult<Option<Self>> {
        let map = match json {
            JsonValue::Null => return Ok(None),
            JsonValue::Object(map) => map,
            _ => return Err(StoreError::InvalidQuery("selection must be an object".into())),
        };

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for (field, flag) in map {
            if field == "_id" {
                continue;
            }
            let on = flag.as_bool().unwrap_or_else(|| flag.as_i64().unwrap_or(1) != 0);
            if on {
                include.push(field.clone());
            } else {
                exclude.push(field.clone());
            }
        }

        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(Self::Include(include))),
            (true, false) => Ok(Some(Self::Exclude(exclude))),
            (false, false) => Err(StoreError::InvalidQuery(
                "selection cannot mix inclusion and exclusion".into(),
            )),
        }
    }

    /// Project a document.
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            Self::Include(fields) => {
                let mut data = HashMap::new();
                for field in fields {
                    if let Some(value) = doc.get(field) {
                        set_path(&mut data, field, value.clone());
                    }
                }
                Document { id: doc.id.clone(), data }
            }
            Self::Exclude(fields) => {
                let mut out = doc.clone();
                for field in fields {
                    crate::types::remove_path(&mut out.data, field);
                }
                out
            }
        }
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// Builder for constructing queries.
pub struct QueryBuilder {
    filters: Vec<Filter>,
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            query: Query::new(),
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Ne {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn exists(mut self, field: impl Into<String>, exists: bool) -> Self {
        self.filters.push(Filter::Exists {
            field: field.into(),
            exists,
        });
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.query.sort.push(Sort {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    pub fn build(mut self) -> Query {
        self.query.filter = Filter::and(self.filters);
        self.query
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
