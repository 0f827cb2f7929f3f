//! VerDB Registry Manager
//!
//! Owns the cached set of registries and keeps it consistent with the
//! persisted registries collection. Every mutation holds the writer lock
//! across the store round-trip and index provisioning.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::registry::Registry;
use crate::search::SearchRequest;
use crate::versioning::{IS_LATEST, NEXT, VER};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use verdb_common::{CoreConfig, Result, StoreError, VerdbError};
use verdb_document::{Document, DocumentId, DocumentStore, Filter, Namespace, Query, Update};

// =============================================================================
// Registry Manager
// =============================================================================

/// Cached, persisted registry set.
pub struct RegistryManager {
    store: Arc<dyn DocumentStore>,
    namespace: Namespace,
    registries: RwLock<HashMap<String, Registry>>,
}

impl RegistryManager {
    /// Ensure the unique name index and load every persisted registry.
    pub fn new(store: Arc<dyn DocumentStore>, config: &CoreConfig) -> Result<Self> {
        let namespace = Namespace::new(
            config.meta_database.clone(),
            config.registry_collection.clone(),
        );
        store.ensure_index(&namespace, &["name".to_string()], true)?;

        let mut registries = HashMap::new();
        for doc in store.find_many(&namespace, &Query::new())? {
            match Registry::from_document(&doc) {
                Ok(reg) => {
                    registries.insert(reg.name.clone(), reg);
                }
                Err(e) => warn!("Skipping unreadable registry {}: {}", doc.id, e),
            }
        }
        info!("Loaded {} registries from {}", registries.len(), namespace);

        Ok(Self {
            store,
            namespace,
            registries: RwLock::new(registries),
        })
    }

    /// Number of cached registries.
    pub fn size(&self) -> usize {
        self.registries.read().len()
    }

    /// All cached registries, ordered by name.
    pub fn list(&self) -> Vec<Registry> {
        let mut regs: Vec<Registry> = self.registries.read().values().cloned().collect();
        regs.sort_by(|a, b| a.name.cmp(&b.name));
        regs
    }

    pub fn get_reg(&self, database: &str, collection: &str) -> Option<Registry> {
        self.registries
            .read()
            .get(&format!("{}/{}", database, collection))
            .cloned()
    }

    /// Like `get_reg`, mapping a miss to `NotFound`.
    pub fn lookup(&self, database: &str, collection: &str) -> Result<Registry> {
        self.get_reg(database, collection).ok_or_else(|| {
            VerdbError::NotFound(format!("{}/{} is not registered", database, collection))
        })
    }

    /// Search the persisted registries.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<Document>> {
        request.run(&*self.store, &self.namespace)
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Persist and cache a new registry, then provision its indexes.
    ///
    /// An index failure is returned but the registry stays registered.
    pub fn create_registry(&self, mut reg: Registry) -> Result<Registry> {
        let mut registries = self.registries.write();

        reg.validate()?;
        reg.name = reg.gen_name();
        reg.id = Some(DocumentId::generate());

        self.store
            .insert_one(&self.namespace, reg.to_document()?)
            .map_err(|e| duplicate_name(e, &reg.name))?;
        registries.insert(reg.name.clone(), reg.clone());
        info!("Registered {}", reg.name);

        self.provision_indexes(&reg)?;
        Ok(reg)
    }

    /// Replace the registry stored under `id`.
    pub fn update_registry(&self, id: &DocumentId, mut reg: Registry) -> Result<Registry> {
        let mut registries = self.registries.write();

        reg.validate()?;
        reg.name = reg.gen_name();
        reg.id = Some(id.clone());

        let existing = self.fetch(id)?;
        let replacement = reg.to_document()?;
        self.store
            .update_by_id(&self.namespace, id, &Update::Replace(replacement.data))
            .map_err(|e| duplicate_name(e, &reg.name))?;

        registries.remove(&existing.name);
        registries.insert(reg.name.clone(), reg.clone());
        info!("Updated registry {} ({} -> {})", id, existing.name, reg.name);

        self.provision_indexes(&reg)?;
        Ok(reg)
    }

    /// Remove the registry stored under `id`.
    pub fn delete_registry(&self, id: &DocumentId) -> Result<Registry> {
        let mut registries = self.registries.write();

        let removed = match self.store.remove_by_id(&self.namespace, id) {
            Ok(doc) => Registry::from_document(&doc)?,
            Err(StoreError::NotFound(_)) => {
                return Err(VerdbError::NotFound(format!("registry {}", id)))
            }
            Err(e) => return Err(e.into()),
        };
        registries.remove(&removed.name);
        info!("Deleted registry {}", removed.name);
        Ok(removed)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Registry> {
        let doc = self
            .store
            .find_one(&self.namespace, &Filter::eq("_id", id.to_string()))?
            .ok_or_else(|| VerdbError::NotFound(format!("registry {}", id)))?;
        Registry::from_document(&doc)
    }

    /// Indexes on the configured keys plus the compare key and version fields.
    fn provision_indexes(&self, reg: &Registry) -> Result<()> {
        let ns = reg.namespace();
        let fixed = [reg.compare_key.as_str(), VER, NEXT, IS_LATEST]
            .into_iter()
            .map(|k| vec![k.to_string()]);
        for keys in reg.index_keys.iter().map(|k| k.paths()).chain(fixed) {
            self.store.ensure_index(&ns, &keys, false)?;
        }
        Ok(())
    }
}

fn duplicate_name(err: StoreError, name: &str) -> VerdbError {
    match err {
        StoreError::DuplicateKey { .. } => {
            VerdbError::Duplicate(format!("registry {} already exists", name))
        }
        other => other.into(),
    }
}

// =============================================================================
// Tests
// =============================================================================
