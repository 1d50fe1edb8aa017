//! `sluice check` - validate a batch file without running anything

use anyhow::Context;
use sluice_foundation::{BatchFile, TaskEntry};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Locate `program` the way `execvp` would: paths containing `/` are used as-is,
/// bare names are searched in `search_path`.
pub fn resolve_program(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(program, search_path, cwd).ok()
}

/// Problems with one entry that would only surface at spawn time
pub fn entry_problems(entry: &TaskEntry, search_path: Option<&OsStr>) -> Vec<String> {
    let mut problems = Vec::new();
    if resolve_program(&entry.program, search_path).is_none() {
        problems.push(format!("program '{}' not found or not executable", entry.program));
    }
    problems
}

/// Returns whether the batch is valid
pub fn check_batch(path: &Path) -> anyhow::Result<bool> {
    let batch = BatchFile::load(path)
        .with_context(|| format!("Invalid batch {}", path.display()))?;
    let search_path = std::env::var_os("PATH");

    let mut valid = true;
    for (index, entry) in batch.tasks.iter().enumerate() {
        let problems = entry_problems(entry, search_path.as_deref());
        if problems.is_empty() {
            println!("✓ [{}] {}", index, entry.display_name());
        } else {
            valid = false;
            for problem in problems {
                println!("✗ [{}] {}: {}", index, entry.display_name(), problem);
            }
        }
    }

    if valid {
        println!("\n{} tasks OK", batch.len());
    } else {
        eprintln!("\nBatch {} has problems", path.display());
    }
    Ok(valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_resolve_absolute() {
        assert_eq!(
            resolve_program("/bin/sh", None),
            Some(PathBuf::from("/bin/sh"))
        );
        assert!(resolve_program("/definitely/missing", None).is_none());
    }

    #[test]
    fn test_resolve_through_search_path() {
        let path = OsString::from("/nonexistent-dir:/bin");
        assert_eq!(
            resolve_program("sh", Some(&path)),
            Some(PathBuf::from("/bin/sh"))
        );
        assert!(resolve_program("sh", None).is_none());
        assert!(resolve_program("no-such-tool-xyz", Some(&path)).is_none());
    }

    #[test]
    fn test_non_executable_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script");
        std::fs::write(&file, "echo hi").unwrap();

        assert!(resolve_program(file.to_str().unwrap(), None).is_none());

        let entry = TaskEntry::new(file.to_str().unwrap());
        assert_eq!(entry_problems(&entry, None).len(), 1);
    }
}
