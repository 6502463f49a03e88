#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the `DuckDB` data directory.
//!
//! All paths are relative to the project root's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory, resolved at compile time from
/// `CARGO_MANIFEST_DIR`. Falls back to the current directory.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the path of the pipeline's working store.
#[must_use]
pub fn default_store_path() -> PathBuf {
    data_dir().join("crash_weather.duckdb")
}

/// Returns the path of the store that dashboard tables are exported to.
#[must_use]
pub fn default_export_path() -> PathBuf {
    data_dir().join("dashboard.duckdb")
}

/// Creates a directory (and its parents) if it does not exist.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_paths_live_under_data_dir() {
        assert!(default_store_path().starts_with(data_dir()));
        assert!(default_export_path().starts_with(data_dir()));
        assert_eq!(
            default_store_path().extension().and_then(|e| e.to_str()),
            Some("duckdb")
        );
    }
}
