//! Sluice init command
//!
//! Writes a project configuration under .sluice/ with every queue setting spelled out.

use sluice_foundation::{SluiceConfig, TomlStore, SLUICE_CONFIG_FILE};

/// Initialize Sluice configuration in the current directory
pub fn init_project(force: bool) -> anyhow::Result<()> {
    let store = TomlStore::current_project()?;

    // Check if already initialized
    if store.exists(SLUICE_CONFIG_FILE) && !force {
        println!("✓ Sluice already initialized in this directory.");
        println!("  Use --force to reinitialize.");
        return Ok(());
    }

    let resolved = SluiceConfig::new().queue_config();
    let mut config = SluiceConfig::new()
        .parallelism(resolved.parallelism)
        .separate_errors(resolved.separate_errors);
    config.queue.policy.on_missing_finished = Some(resolved.policy.on_missing_finished);
    config.queue.policy.on_missing_signalled = Some(resolved.policy.on_missing_signalled);

    config.save_project()?;
    println!(
        "✓ Created {}",
        store.file_path(SLUICE_CONFIG_FILE).display()
    );
    Ok(())
}
