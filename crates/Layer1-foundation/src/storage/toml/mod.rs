mod store;

pub(crate) use store::load_path;
pub use store::TomlStore;
