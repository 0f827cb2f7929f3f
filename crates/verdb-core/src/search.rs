//! VerDB Search Requests
//!
//! Wire shape for ad hoc searches: a JSON filter plus selection, sort and
//! limit, translated into a store `Query`.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use verdb_common::Result;
use verdb_document::{Document, DocumentStore, Filter, Namespace, Projection, Query, Sort};

/// A search over one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: JsonValue,
    #[serde(default)]
    pub selection: JsonValue,
    /// Field names, `-field` for descending.
    #[serde(default)]
    pub sort: Vec<String>,
    /// Zero means unlimited.
    #[serde(default)]
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(query: JsonValue) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Build the store query. Malformed filters or selections are
    /// `StoreError::InvalidQuery`.
    pub fn to_query(&self) -> Result<Query> {
        let mut query = Query::filter(Filter::from_json(&self.query)?);
        query.sort = self.sort.iter().map(|s| Sort::parse(s)).collect();
        if self.limit > 0 {
            query.limit = Some(self.limit);
        }
        query.projection = Projection::from_json(&self.selection)?;
        Ok(query)
    }

    /// Run against `ns`.
    pub fn run(&self, store: &dyn DocumentStore, ns: &Namespace) -> Result<Vec<Document>> {
        let query = self.to_query()?;
        Ok(store.find_many(ns, &query)?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdb_common::VerdbError;
    use verdb_document::{DocumentEngine, Value};

    fn seeded() -> (DocumentEngine, Namespace) {
        let engine = DocumentEngine::new();
        let ns = Namespace::new("db", "hosts");
        for (i, dc) in ["a", "b", "a", "a"].iter().enumerate() {
            let doc = Document::from_json(json!({"n": i, "dc": dc, "blob": "x"})).unwrap();
            engine.insert_one(&ns, doc).unwrap();
        }
        (engine, ns)
    }

    #[test]
    fn test_search_shapes_results() {
        let (engine, ns) = seeded();
        let request: SearchRequest = serde_json::from_value(json!({
            "query": {"dc": "a"},
            "selection": {"n": 1},
            "sort": ["-n"],
            "limit": 2
        }))
        .unwrap();

        let docs = request.run(&engine, &ns).unwrap();
        let ns_seen: Vec<i64> = docs
            .iter()
            .filter_map(|d| d.get("n").and_then(Value::as_i64))
            .collect();
        assert_eq!(ns_seen, vec![3, 2]);
        assert!(docs.iter().all(|d| d.get("blob").is_none()));
    }

    #[test]
    fn test_defaults_match_everything() {
        let (engine, ns) = seeded();
        let request: SearchRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(request.run(&engine, &ns).unwrap().len(), 4);
    }

    #[test]
    fn test_bad_filter_is_user_error() {
        let err = SearchRequest::new(json!({"n": {"$bogus": 1}}))
            .to_query()
            .unwrap_err();
        assert!(matches!(err, VerdbError::Store(_)));
        assert!(err.is_user_error());
    }
}
