//! VerDB Config - Core Configuration
//!
//! Configuration for the registry and job layers: where metadata lives, how
//! many jobs may run at once and the default version bucket width. Supports
//! TOML files and programmatic construction.
//!
//! @version 0.1.0
//! @author VerDB Development Team

use crate::error::{Result, VerdbError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Seconds in one hour.
pub const HOURLY: i64 = 60 * 60;
/// Seconds in one day.
pub const DAILY: i64 = 24 * HOURLY;
/// Seconds in one week.
pub const WEEKLY: i64 = 7 * DAILY;

// =============================================================================
// Core Configuration
// =============================================================================

/// Configuration shared by the registry manager and the jobs manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Database holding the registries and jobs collections.
    pub meta_database: String,
    pub registry_collection: String,
    pub jobs_collection: String,
    /// Advisory ceiling on concurrently scheduled jobs.
    pub max_running_jobs: usize,
    /// Bucket width in seconds for registries that do not set `verInterval`.
    pub default_ver_interval: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            meta_database: "verdb".to_string(),
            registry_collection: "registries".to_string(),
            jobs_collection: "jobs".to_string(),
            max_running_jobs: 4,
            default_ver_interval: DAILY,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| VerdbError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the metadata database.
    pub fn with_meta_database(mut self, database: impl Into<String>) -> Self {
        self.meta_database = database.into();
        self
    }

    /// Set the job concurrency ceiling.
    pub fn with_max_running_jobs(mut self, max: usize) -> Self {
        self.max_running_jobs = max;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.meta_database.is_empty()
            || self.registry_collection.is_empty()
            || self.jobs_collection.is_empty()
        {
            return Err(VerdbError::Configuration(
                "meta_database, registry_collection and jobs_collection must be set".to_string(),
            ));
        }
        if self.default_ver_interval <= 0 {
            return Err(VerdbError::Configuration(
                "default_ver_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
