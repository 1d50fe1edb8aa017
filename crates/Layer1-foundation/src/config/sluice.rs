//! Sluice Config - layered global + project configuration

use crate::storage::{load_path, TomlStore};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{QueueConfig, QueueSettings};

/// Configuration file name inside a store
pub const SLUICE_CONFIG_FILE: &str = "config.toml";

/// Top-level configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SluiceConfig {
    /// Schema version (for migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Queue settings
    #[serde(default)]
    pub queue: QueueSettings,
}

impl SluiceConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            queue: QueueSettings::default(),
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Global then project configuration, project wins
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = TomlStore::global() {
            if let Some(global_config) = global.load_optional::<SluiceConfig>(SLUICE_CONFIG_FILE)? {
                debug!("Loaded global config from {}", global.base_dir().display());
                config.merge(global_config);
            }
        }

        if let Ok(project) = TomlStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<SluiceConfig>(SLUICE_CONFIG_FILE)?
            {
                debug!("Loaded project config from {}", project.base_dir().display());
                config.merge(project_config);
            }
        }

        Ok(config)
    }

    /// Load a single explicit file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        load_path(path.as_ref())
    }

    pub fn save_project(&self) -> Result<()> {
        let store = TomlStore::current_project()?;
        store.save(SLUICE_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge with another configuration (other wins)
    pub fn merge(&mut self, other: SluiceConfig) {
        self.version = self.version.max(other.version);
        self.queue.merge(other.queue);
    }

    /// Resolved queue settings
    pub fn queue_config(&self) -> QueueConfig {
        self.queue.resolve()
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.queue.parallelism = Some(parallelism);
        self
    }

    pub fn separate_errors(mut self, separate: bool) -> Self {
        self.queue.separate_errors = Some(separate);
        self
    }
}

impl Default for SluiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingSignalledPolicy;

    #[test]
    fn test_merge_prefers_later_layer() {
        let mut config = SluiceConfig::new().parallelism(2).separate_errors(true);
        config.merge(SluiceConfig::new().parallelism(16));

        let queue = config.queue_config();
        assert_eq!(queue.parallelism, 16);
        assert!(queue.separate_errors);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [queue]
            parallelism = 0

            [queue.policy]
            on_missing_signalled = "ignore-signals"
            "#,
        )
        .unwrap();

        let config = SluiceConfig::load_from(&path).unwrap();
        assert_eq!(config.version, 1);

        let queue = config.queue_config();
        assert_eq!(queue.parallelism, 0);
        assert_eq!(queue.effective_parallelism(), 1);
        assert_eq!(
            queue.policy.on_missing_signalled,
            MissingSignalledPolicy::IgnoreSignals
        );
    }

    #[test]
    fn test_save_project_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlStore::project(dir.path());
        let config = SluiceConfig::new().parallelism(4);

        store.save(SLUICE_CONFIG_FILE, &config).unwrap();
        let loaded: SluiceConfig = store.load(SLUICE_CONFIG_FILE).unwrap();
        assert_eq!(loaded, config);
    }
}
