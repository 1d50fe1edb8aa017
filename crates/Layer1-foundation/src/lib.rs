//! # sluice-foundation
//!
//! Foundation layer for Sluice:
//! - Error: the shared error taxonomy and `Result` alias
//! - Config: queue settings, default policies, layered config and batch files
//! - Env: environment providers for spawned children
//! - Storage: TOML documents on disk

pub mod config;
pub mod env;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    default_parallelism, BatchFile, DefaultPolicy, MissingFinishedPolicy,
    MissingSignalledPolicy, PolicySettings, QueueConfig, QueueSettings, SluiceConfig, TaskEntry,
    SLUICE_CONFIG_FILE,
};

// ============================================================================
// Environment
// ============================================================================
pub use env::{
    parse_env_entry, validate_env_entries, AmbientEnvironment, EnvironmentProvider,
    FixedEnvironment,
};

// ============================================================================
// Storage
// ============================================================================
pub use storage::TomlStore;
