//! Pre-flight checks for investigator
//!
//! Validates the inputs and system access the chosen backend needs before
//! the shell starts, so problems surface as one clear message instead of a
//! failure on every command.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Run the checks for the live `/proc` backend
pub fn run_live_checks(proc_root: &Path, dac_dirs: &[PathBuf]) -> Result<()> {
    check_proc_access(proc_root)?;
    check_dac_dirs(dac_dirs)?;
    Ok(())
}

/// Run the checks for snapshot replay
pub fn run_snapshot_checks(snapshot: &Path, dac_dirs: &[PathBuf]) -> Result<()> {
    check_snapshot_file(snapshot)?;
    check_dac_dirs(dac_dirs)?;
    Ok(())
}

/// Check that the process table can be enumerated
pub fn check_proc_access(proc_root: &Path) -> Result<()> {
    match std::fs::read_dir(proc_root) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => bail!(
            "Permission denied: cannot read {}; {}",
            proc_root.display(),
            privilege_hint()
        ),
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to read {}; live inspection needs procfs.\n\n\
                 Use --snapshot <FILE> to inspect a recorded snapshot instead.",
                proc_root.display()
            )
        }),
    }
}

/// Hint shown when reading another process is refused
#[must_use]
pub fn privilege_hint() -> &'static str {
    if unsafe { libc::geteuid() } == 0 {
        "check ptrace restrictions (kernel.yama.ptrace_scope)"
    } else {
        "run as the target's user or with sudo"
    }
}

fn check_snapshot_file(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!(
            "Invalid argument: snapshot not found: {}\n\n\
             Make sure the path is correct and the file exists.",
            path.display()
        );
    }
    if !path.is_file() {
        bail!(
            "Invalid argument: not a file: {}\n\n\
             --snapshot must point to a JSON snapshot, not a directory.",
            path.display()
        );
    }
    Ok(())
}

fn check_dac_dirs(dirs: &[PathBuf]) -> Result<()> {
    for dir in dirs {
        if !dir.is_dir() {
            bail!(
                "Invalid argument: --dac-dir {} is not a directory",
                dir.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_snapshot_checks(&dir.path().join("nope.json"), &[]).unwrap_err();
        assert!(err.to_string().starts_with("Invalid argument: snapshot not found"));

        let err = run_snapshot_checks(dir.path(), &[]).unwrap_err();
        assert!(err.to_string().starts_with("Invalid argument: not a file"));
    }

    #[test]
    fn test_dac_dir_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("s.json");
        std::fs::write(&snapshot, "{}").unwrap();

        assert!(run_snapshot_checks(&snapshot, &[dir.path().to_path_buf()]).is_ok());
        let err = run_snapshot_checks(&snapshot, &[dir.path().join("missing")]).unwrap_err();
        assert!(err.to_string().contains("is not a directory"));
    }

    #[test]
    fn test_missing_proc_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_proc_access(&dir.path().join("proc")).unwrap_err();
        assert!(err.to_string().contains("--snapshot"));
    }
}
