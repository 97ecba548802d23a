//! Filesystem utilities.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory: {}", path.display()))?;
    }
    Ok(())
}

/// Whether `path` is a file the current user may execute.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Delete all but the newest `keep` files in `dir` whose name starts with `prefix`.
///
/// `age` maps a file name to an ordering key where larger means newer; ties
/// fall back to the name. Returns the deleted paths.
pub fn prune_files<K, F>(dir: &Path, prefix: &str, keep: usize, age: F) -> Result<Vec<PathBuf>>
where
    K: Ord,
    F: Fn(&str) -> K,
{
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<(K, String, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter_map(|p| {
            let name = p.file_name()?.to_str()?.to_string();
            name.starts_with(prefix).then(|| (age(&name), name, p))
        })
        .collect();
    files.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    let excess = files.len().saturating_sub(keep);
    let removed: Vec<PathBuf> = files.drain(..excess).map(|(_, _, p)| p).collect();
    for path in &removed {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove file: {}", path.display()))?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_nested() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("b");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    /// Digits in the name, as a stand-in for a timestamp.
    fn digits(name: &str) -> String {
        name.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    #[test]
    fn test_prune_files_keeps_newest() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "stagehand-build-20260101-000000.log",
            "stagehand-build-20260102-000000.log",
            "stagehand-cook-20260103-000000.log",
            "notes.txt",
        ] {
            fs::write(tmp.path().join(name), "x").unwrap();
        }

        let removed = prune_files(tmp.path(), "stagehand-", 2, digits).unwrap();
        assert_eq!(removed, vec![tmp.path().join("stagehand-build-20260101-000000.log")]);
        assert!(tmp.path().join("notes.txt").exists());
        assert!(tmp.path().join("stagehand-cook-20260103-000000.log").exists());
    }

    #[test]
    fn test_prune_files_orders_by_age_not_name() {
        let tmp = TempDir::new().unwrap();
        for name in [
            "stagehand-package-20250101-120000.log",
            "stagehand-package-20250102-120000.log",
            "stagehand-build-20261019-120000.log",
        ] {
            fs::write(tmp.path().join(name), "x").unwrap();
        }

        let removed = prune_files(tmp.path(), "stagehand-", 2, digits).unwrap();
        assert_eq!(removed, vec![tmp.path().join("stagehand-package-20250101-120000.log")]);
        assert!(tmp.path().join("stagehand-build-20261019-120000.log").exists());
    }

    #[test]
    fn test_prune_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(prune_files(&tmp.path().join("nope"), "x", 1, digits)
            .unwrap()
            .is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("Build.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(!is_executable(&script));

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&script));
        assert!(!is_executable(tmp.path()));
    }
}
