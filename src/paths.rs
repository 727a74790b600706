//! Configuration file discovery and the stored performance catalog.
//!
//! ## Config resolution
//!
//! 1. `--config <FILE>` when given (must exist).
//! 2. `config.yaml` in the current working directory.
//! 3. `config.yaml` under `dirs::config_dir()/ondes-gw`.
//!
//! When none of these exist the gateway runs on built-in defaults.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name under the platform config dir
const APP_DIR: &str = "ondes-gw";

const CONFIG_FILE: &str = "config.yaml";

/// Pick the configuration file to load, if any.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    let candidates = std::iter::once(PathBuf::from(CONFIG_FILE))
        .chain(dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE)));

    for candidate in candidates {
        debug!("Looking for config at {}", candidate.display());
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

fn is_performance_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
        .unwrap_or(false)
}

/// Standard MIDI Files in `dir`, sorted by name ignoring case.
///
/// Only regular files directly inside `dir` are listed; hidden files are
/// skipped.
pub fn list_performances(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read performance directory: {}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() && is_performance_file(&path) {
            files.push(path);
        }
    }

    files.sort_by_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    Ok(files)
}

/// Locate a performance given on the command line.
///
/// A bare file name is looked up in the performance directory; anything
/// else is taken as a path.
pub fn resolve_performance(dir: &Path, name: &Path) -> PathBuf {
    if name.components().count() == 1 && !name.exists() {
        dir.join(name)
    } else {
        name.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_catalog_is_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["b.mid", "A.MID", "c.midi", "notes.txt", ".hidden.mid"] {
            fs::write(dir.path().join(name), b"MThd").unwrap();
        }
        fs::create_dir(dir.path().join("folder.mid")).unwrap();

        let names: Vec<_> = list_performances(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["A.MID", "b.mid", "c.midi"]);
    }

    #[test]
    fn test_catalog_missing_directory_is_an_error() {
        assert!(list_performances(Path::new("/nonexistent/midi")).is_err());
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ondes.yaml");
        assert!(resolve_config(Some(&path)).is_err());

        fs::write(&path, "tuning:\n  reference_hz: 440.0\n").unwrap();
        assert_eq!(resolve_config(Some(&path)).unwrap(), Some(path));
    }

    #[test]
    fn test_resolve_performance() {
        let dir = Path::new("/srv/midi");
        assert_eq!(
            resolve_performance(dir, Path::new("Bolero.mid")),
            PathBuf::from("/srv/midi/Bolero.mid")
        );
        assert_eq!(
            resolve_performance(dir, Path::new("/tmp/take.mid")),
            PathBuf::from("/tmp/take.mid")
        );
    }
}
