//! VerDB Server State
//!
//! Application state shared across request handlers: the document engine
//! and the core services built on it. With a data directory the engine is
//! restored from, and saved to, a JSON snapshot.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::config::ServerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use verdb_common::Result;
use verdb_core::{JobsManager, RegistryManager, Versioner};
use verdb_document::{DocumentEngine, DocumentStore, EngineSnapshot};

/// File name of the engine snapshot inside the data directory.
pub const SNAPSHOT_FILE: &str = "verdb_snapshot.json";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub engine: Arc<DocumentEngine>,
    pub registries: Arc<RegistryManager>,
    pub versioner: Arc<Versioner>,
    pub jobs: Arc<JobsManager>,
    data_dir: Option<PathBuf>,
}

impl AppState {
    /// Build the engine, restore any snapshot, then load the registries.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let data_dir = config.data_dir.as_ref().map(PathBuf::from);
        let engine = Arc::new(DocumentEngine::new());

        if let Some(ref dir) = data_dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(SNAPSHOT_FILE);
            if path.exists() {
                let data = std::fs::read_to_string(&path)?;
                let snapshot: EngineSnapshot = serde_json::from_str(&data)?;
                engine.restore(snapshot)?;
                tracing::info!("Loaded snapshot from {:?}", path);
            }
        }

        let store: Arc<dyn DocumentStore> = engine.clone();
        let registries = Arc::new(RegistryManager::new(store.clone(), &config.core)?);
        let versioner = Arc::new(Versioner::new(
            store.clone(),
            config.core.default_ver_interval,
        ));
        let jobs = Arc::new(JobsManager::new(store, &config.core));

        Ok(Self {
            config: Arc::new(config),
            engine,
            registries,
            versioner,
            jobs,
            data_dir,
        })
    }

    /// Write the engine snapshot. A no-op without a data directory.
    pub fn save_to_disk(&self) -> Result<()> {
        let Some(ref dir) = self.data_dir else {
            return Ok(());
        };

        let snapshot = self.engine.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;

        let path = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{}.tmp", SNAPSHOT_FILE));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(
            "Saved {} collections to {:?}",
            snapshot.collections.len(),
            path
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use verdb_core::Registry;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("verdb-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let state = AppState::new(ServerConfig::default()).unwrap();
        assert!(state.save_to_disk().is_ok());
        assert_eq!(state.registries.size(), 0);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = temp_dir("state");
        let config = ServerConfig::default().with_data_dir(Some(dir.to_string_lossy().into()));

        let state = AppState::new(config.clone()).unwrap();
        state
            .registries
            .create_registry(Registry::new("db", "items", "pk").with_ver_keys(&["a"]))
            .unwrap();
        state.save_to_disk().unwrap();
        assert!(dir.join(SNAPSHOT_FILE).exists());

        let reloaded = AppState::new(config).unwrap();
        assert_eq!(reloaded.registries.size(), 1);
        assert!(reloaded.registries.get_reg("db", "items").is_some());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_corrupt_snapshot_fails_startup() {
        let dir = temp_dir("corrupt");
        std::fs::write(dir.join(SNAPSHOT_FILE), "not json").unwrap();
        let config = ServerConfig::default().with_data_dir(Some(dir.to_string_lossy().into()));

        assert!(AppState::new(config).is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
