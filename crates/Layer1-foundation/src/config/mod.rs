//! Config - queue settings and how they are loaded
//!
//! - `queue.rs` - parallelism budget and default outcome policy
//! - `sluice.rs` - layered global/project configuration
//! - `batch.rs` - batch files describing tasks to run

mod batch;
mod queue;
mod sluice;

pub use batch::{BatchFile, TaskEntry};
pub use queue::{
    default_parallelism, DefaultPolicy, MissingFinishedPolicy, MissingSignalledPolicy,
    PolicySettings, QueueConfig, QueueSettings,
};
pub use sluice::{SluiceConfig, SLUICE_CONFIG_FILE};
