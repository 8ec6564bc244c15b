//! Unpacking of downloaded monthly export archives.
//!
//! Every `ntsb_{year}_{mm}.zip` is unpacked into a flat directory. Entries
//! are renamed `{year}_{mm}_{name}` so files from different months never
//! collide; directory entries are skipped.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::SourceError;

/// Totals from an extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Archives unpacked successfully.
    pub archives: usize,
    /// Archives that could not be read.
    pub failed: usize,
    /// Files written.
    pub files: usize,
}

/// Parses `ntsb_{year}_{mm}.zip` into its year and month.
///
/// ```
/// use accident_harvest_source::archive::parse_archive_name;
///
/// assert_eq!(parse_archive_name("ntsb_2010_01.zip"), Some((2010, 1)));
/// assert_eq!(parse_archive_name("notes.zip"), None);
/// ```
#[must_use]
pub fn parse_archive_name(name: &str) -> Option<(i32, u32)> {
    let stem = name.strip_prefix("ntsb_")?.strip_suffix(".zip")?;
    let (year, month) = stem.split_once('_')?;
    let month: u32 = month.parse().ok()?;

    (1..=12)
        .contains(&month)
        .then_some((year.parse().ok()?, month))
}

/// Lists the monthly archives in `dir`, sorted by name.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if the directory cannot be read.
pub fn list_archives(dir: &Path) -> Result<Vec<(PathBuf, i32, u32)>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SourceError::io(dir, e))?;

    let mut archives: Vec<(PathBuf, i32, u32)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let (year, month) = parse_archive_name(path.file_name()?.to_str()?)?;
            path.is_file().then_some((path, year, month))
        })
        .collect();

    archives.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(archives)
}

/// Unpacks one archive into `out_dir` and returns the number of files
/// written.
///
/// # Errors
///
/// Returns [`SourceError::Archive`] if the archive is corrupt, or
/// [`SourceError::Io`] if an entry cannot be written.
pub fn extract_archive(
    archive_path: &Path,
    out_dir: &Path,
    year: i32,
    month: u32,
) -> Result<usize, SourceError> {
    let file = File::open(archive_path).map_err(|e| SourceError::io(archive_path, e))?;
    let archive_error = |source| SourceError::Archive {
        path: archive_path.display().to_string(),
        source,
    };

    let mut archive = zip::ZipArchive::new(file).map_err(archive_error)?;
    std::fs::create_dir_all(out_dir).map_err(|e| SourceError::io(out_dir, e))?;

    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_error)?;
        if entry.is_dir() {
            continue;
        }

        let Some(name) = Path::new(entry.name())
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
        else {
            continue;
        };

        let out_path = out_dir.join(format!("{year}_{month:02}_{name}"));
        let mut out = File::create(&out_path).map_err(|e| SourceError::io(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| SourceError::io(&out_path, e))?;
        written += 1;
    }

    Ok(written)
}

/// Unpacks every monthly archive in `archive_dir` into `out_dir`. A corrupt
/// archive is logged and skipped.
///
/// # Errors
///
/// Returns [`SourceError::Io`] if `archive_dir` cannot be listed.
pub fn extract_archives(archive_dir: &Path, out_dir: &Path) -> Result<ExtractReport, SourceError> {
    let archives = list_archives(archive_dir)?;
    log::info!("Found {} archives to extract", archives.len());

    let mut report = ExtractReport::default();

    for (path, year, month) in archives {
        match extract_archive(&path, out_dir, year, month) {
            Ok(files) => {
                log::debug!("Extracted {files} files from {}", path.display());
                report.archives += 1;
                report.files += files;
            }
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                report.failed += 1;
            }
        }
    }

    log::info!(
        "Extracted {} files from {} archives into {} ({} failed)",
        report.files,
        report.archives,
        out_dir.display(),
        report.failed
    );

    Ok(report)
}
