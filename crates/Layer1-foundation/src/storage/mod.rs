//! Storage module for Sluice
//!
//! - `toml`: TOML documents on disk (configuration, batch files)

mod toml;

pub(crate) use self::toml::load_path;
pub use self::toml::TomlStore;
