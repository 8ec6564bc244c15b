//! Canonical file paths below the harvest output directory.

use std::path::{Path, PathBuf};

/// Directory monthly export archives are unpacked into.
#[must_use]
pub fn extracted_dir(output_dir: &Path) -> PathBuf {
    output_dir.join("extracted")
}

/// Merged export file produced from the extracted archives.
#[must_use]
pub fn merged_cases_path(output_dir: &Path) -> PathBuf {
    extracted_dir(output_dir).join("merged_all_cases.json")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensures the parent directory of a file exists.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_file_lives_next_to_extracted_entries() {
        assert_eq!(
            merged_cases_path(Path::new("data")),
            Path::new("data/extracted/merged_all_cases.json")
        );
    }

    #[test]
    fn ensure_parent_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a/b/staging.duckdb");

        ensure_parent(&file).unwrap();
        assert!(dir.path().join("a/b").is_dir());
        ensure_parent(Path::new("staging.duckdb")).unwrap();
    }
}
