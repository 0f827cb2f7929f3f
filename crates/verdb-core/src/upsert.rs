//! VerDB Direct Upsert
//!
//! Insert-or-update keyed by a registered collection's compare key, without
//! touching version fields.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::registry_manager::RegistryManager;
use serde::Serialize;
use verdb_common::Result;
use verdb_document::{Document, DocumentId, DocumentStore, Filter, Update, Value};

/// What a direct upsert did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "id", rename_all = "snake_case")]
pub enum DirectUpsert {
    Inserted(DocumentId),
    Updated(DocumentId),
    /// A document already existed and no update was given.
    Unchanged(DocumentId),
}

/// Insert `insert` unless a document shares its compare-key value; in that
/// case apply `update`, if any, to the first such document.
///
/// The collection must be registered.
pub fn direct_upsert(
    store: &dyn DocumentStore,
    registries: &RegistryManager,
    database: &str,
    collection: &str,
    insert: Document,
    update: Option<Update>,
) -> Result<DirectUpsert> {
    let reg = registries.lookup(database, collection)?;
    let ns = reg.namespace();

    let key_value = insert.get(&reg.compare_key).cloned().unwrap_or(Value::Null);
    let existing = store.find_one(&ns, &Filter::eq(reg.compare_key.clone(), key_value))?;

    match (existing, update) {
        (Some(doc), Some(update)) => {
            store.update_by_id(&ns, &doc.id, &update)?;
            Ok(DirectUpsert::Updated(doc.id))
        }
        (Some(doc), None) => Ok(DirectUpsert::Unchanged(doc.id)),
        (None, _) => Ok(DirectUpsert::Inserted(store.insert_one(&ns, insert)?)),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use serde_json::json;
    use std::sync::Arc;
    use verdb_common::{CoreConfig, VerdbError};
    use verdb_document::{DocumentEngine, Namespace};

    fn setup() -> (Arc<DocumentEngine>, RegistryManager) {
        let store = Arc::new(DocumentEngine::new());
        let manager = RegistryManager::new(store.clone(), &CoreConfig::default()).unwrap();
        manager
            .create_registry(Registry::new("db", "items", "pk").with_ver_keys(&["a"]))
            .unwrap();
        (store, manager)
    }

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json(value).unwrap()
    }

    #[test]
    fn test_insert_then_update() {
        let (store, manager) = setup();
        let ns = Namespace::new("db", "items");

        let first = direct_upsert(&*store, &manager, "db", "items", doc(json!({"pk": 1, "a": 1})), None)
            .unwrap();
        assert!(matches!(first, DirectUpsert::Inserted(_)));

        let again = direct_upsert(&*store, &manager, "db", "items", doc(json!({"pk": 1, "a": 5})), None)
            .unwrap();
        assert!(matches!(again, DirectUpsert::Unchanged(_)));

        let update = Update::from_json(&json!({"$set": {"a": 2}})).unwrap();
        let updated = direct_upsert(
            &*store,
            &manager,
            "db",
            "items",
            doc(json!({"pk": 1})),
            Some(update),
        )
        .unwrap();
        assert_eq!(updated, DirectUpsert::Updated(first_id(&first)));

        let stored = store.find_one(&ns, &Filter::eq("pk", 1i64)).unwrap().unwrap();
        assert_eq!(stored.get("a"), Some(&Value::Int(2)));
        assert!(stored.get("_ver").is_none());
        assert_eq!(store.count(&ns, &Filter::all()).unwrap(), 1);
    }

    fn first_id(outcome: &DirectUpsert) -> DocumentId {
        match outcome {
            DirectUpsert::Inserted(id) | DirectUpsert::Updated(id) | DirectUpsert::Unchanged(id) => {
                id.clone()
            }
        }
    }

    #[test]
    fn test_missing_compare_key_finds_earlier_document() {
        let (store, manager) = setup();
        let first = direct_upsert(&*store, &manager, "db", "items", doc(json!({"x": 1})), None)
            .unwrap();
        assert!(matches!(first, DirectUpsert::Inserted(_)));

        let second = direct_upsert(&*store, &manager, "db", "items", doc(json!({"x": 2})), None)
            .unwrap();
        assert_eq!(second, DirectUpsert::Unchanged(first_id(&first)));
        assert_eq!(store.count(&Namespace::new("db", "items"), &Filter::all()).unwrap(), 1);
    }

    #[test]
    fn test_unregistered_collection() {
        let (store, manager) = setup();
        let err = direct_upsert(&*store, &manager, "db", "nope", doc(json!({"pk": 1})), None)
            .unwrap_err();
        assert!(matches!(err, VerdbError::NotFound(_)));
    }
}
