//! Resumability store.
//!
//! Every completed unit of work leaves one immutable artifact in the output
//! directory. A unit whose artifact exists is trusted as done and never
//! fetched again. Artifacts are written to a temporary file and renamed
//! into place, so an interrupted write never looks like a finished unit.

use std::path::{Path, PathBuf};

use crate::SourceError;

/// Deterministic artifact names for each unit of work.
pub mod units {
    /// Envelope of a completed listing-source year.
    #[must_use]
    pub fn listing_run(year: i32) -> String {
        format!("asn_{year}.json")
    }

    /// Envelope of a listing-source year that was cut short. Persisted for
    /// its records, but never treated as a finished unit.
    #[must_use]
    pub fn listing_partial_run(year: i32) -> String {
        format!("asn_{year}.partial.json")
    }

    /// Checkpoint holding the records of one listing page.
    #[must_use]
    pub fn listing_page(year: i32, page: u32) -> String {
        format!("asn_{year}_page_{page:04}.json")
    }

    /// Export archive of one calendar month.
    #[must_use]
    pub fn export_month(year: i32, month: u32) -> String {
        format!("ntsb_{year}_{month:02}.zip")
    }

    /// Marker written once every month of a full year has an archive.
    #[must_use]
    pub fn export_year_complete(year: i32) -> String {
        format!("ntsb_{year}.complete")
    }
}

/// Directory of persisted artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path(&self, unit: &str) -> PathBuf {
        self.root.join(unit)
    }

    /// Whether the unit has already been completed.
    #[must_use]
    pub fn exists(&self, unit: &str) -> bool {
        self.path(unit).is_file()
    }

    /// Persists a unit atomically and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the directory cannot be created or the
    /// file cannot be written or renamed.
    pub fn write(&self, unit: &str, contents: &[u8]) -> Result<PathBuf, SourceError> {
        std::fs::create_dir_all(&self.root).map_err(|e| SourceError::io(&self.root, e))?;

        let path = self.path(unit);
        let tmp_path = self.root.join(format!("{unit}.tmp"));

        std::fs::write(&tmp_path, contents).map_err(|e| SourceError::io(&tmp_path, e))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| SourceError::io(&path, e))?;

        Ok(path)
    }

    /// Reads a persisted unit.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the artifact cannot be read.
    pub fn read(&self, unit: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.path(unit);
        std::fs::read(&path).map_err(|e| SourceError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_names_are_deterministic() {
        assert_eq!(units::listing_run(2010), "asn_2010.json");
        assert_eq!(units::listing_page(2010, 7), "asn_2010_page_0007.json");
        assert_eq!(units::export_month(2024, 3), "ntsb_2024_03.zip");
        assert_eq!(units::export_year_complete(2024), "ntsb_2024.complete");
    }

    #[test]
    fn written_units_exist_and_leave_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"));

        assert!(!store.exists("ntsb_2024_01.zip"));
        let path = store.write("ntsb_2024_01.zip", b"PK").unwrap();

        assert!(store.exists("ntsb_2024_01.zip"));
        assert_eq!(std::fs::read(path).unwrap(), b"PK");
        assert!(!store.path("ntsb_2024_01.zip.tmp").exists());
        assert_eq!(store.read("ntsb_2024_01.zip").unwrap(), b"PK");
    }

    #[test]
    fn leftover_temp_file_does_not_count_as_done() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        std::fs::write(store.path("ntsb_2024_02.zip.tmp"), b"partial").unwrap();

        assert!(!store.exists("ntsb_2024_02.zip"));
    }
}
