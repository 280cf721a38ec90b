//! Memory file location resolution
//!
//! Order: explicit path, then the project-local file, then the global file.

use crate::config::MemoryConfig;
use crate::errors::{AppError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Directory holding the memory file, both per project and globally
pub const MEMORY_DIR: &str = ".memvid";

/// Memory file name
pub const MEMORY_FILE: &str = "memory.mv2";

/// Which candidate a location came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Explicit,
    Project,
    Global,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::Explicit => "explicit",
            LocationSource::Project => "project",
            LocationSource::Global => "global",
        }
    }
}

/// Resolved memory file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryLocation {
    pub path: PathBuf,

    pub source: LocationSource,

    /// Whether the file existed before this process resolved it
    pub existed: bool,
}

/// Candidate files in resolution order
fn candidates(config: &MemoryConfig) -> Result<Vec<(LocationSource, PathBuf)>> {
    let mut out = Vec::with_capacity(3);

    if let Some(path) = &config.path {
        out.push((LocationSource::Explicit, path.clone()));
    }

    let project_dir = match &config.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|e| AppError::FileError {
            message: format!("Cannot determine working directory: {}", e),
        })?,
    };
    out.push((LocationSource::Project, project_dir.join(MEMORY_DIR).join(MEMORY_FILE)));

    let global_dir = config
        .global_dir
        .clone()
        .or_else(|| dirs::home_dir().map(|home| home.join(MEMORY_DIR)));
    if let Some(dir) = global_dir {
        out.push((LocationSource::Global, dir.join(MEMORY_FILE)));
    }

    Ok(out)
}

/// Resolve the memory file.
///
/// The first existing candidate wins. When none exists, the explicit path is
/// used if one was configured, otherwise the project-local path.
pub fn resolve_location(config: &MemoryConfig) -> Result<MemoryLocation> {
    resolve_with(config, |p| p.is_file())
}

fn resolve_with(config: &MemoryConfig, exists: impl Fn(&Path) -> bool) -> Result<MemoryLocation> {
    let candidates = candidates(config)?;

    if let Some((source, path)) = candidates.iter().find(|(_, path)| exists(path)) {
        return Ok(MemoryLocation {
            path: path.clone(),
            source: *source,
            existed: true,
        });
    }

    candidates
        .into_iter()
        .find(|(source, _)| matches!(source, LocationSource::Explicit | LocationSource::Project))
        .map(|(source, path)| MemoryLocation {
            path,
            source,
            existed: false,
        })
        .ok_or_else(|| AppError::FileError {
            message: "No memory location could be resolved".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(explicit: Option<&str>) -> MemoryConfig {
        MemoryConfig {
            path: explicit.map(PathBuf::from),
            project_dir: Some(PathBuf::from("/work/app")),
            global_dir: Some(PathBuf::from("/home/u/.memvid")),
        }
    }

    #[test]
    fn test_explicit_path_wins_when_present() {
        let loc = resolve_with(&config(Some("/data/m.mv2")), |_| true).unwrap();
        assert_eq!(loc.source, LocationSource::Explicit);
        assert_eq!(loc.path, PathBuf::from("/data/m.mv2"));
        assert!(loc.existed);
    }

    #[test]
    fn test_project_before_global() {
        let loc = resolve_with(&config(None), |_| true).unwrap();
        assert_eq!(loc.source, LocationSource::Project);
        assert_eq!(loc.path, PathBuf::from("/work/app/.memvid/memory.mv2"));
    }

    #[test]
    fn test_global_fallback_when_only_global_exists() {
        let loc = resolve_with(&config(None), |p| p.starts_with("/home/u")).unwrap();
        assert_eq!(loc.source, LocationSource::Global);
        assert!(loc.existed);
    }

    #[test]
    fn test_missing_everywhere_creates_project_local() {
        let loc = resolve_with(&config(None), |_| false).unwrap();
        assert_eq!(loc.source, LocationSource::Project);
        assert!(!loc.existed);
    }

    #[test]
    fn test_missing_everywhere_prefers_explicit() {
        let loc = resolve_with(&config(Some("/data/m.mv2")), |_| false).unwrap();
        assert_eq!(loc.source, LocationSource::Explicit);
        assert!(!loc.existed);
    }

    #[test]
    fn test_real_filesystem_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global");
        std::fs::create_dir_all(&global).unwrap();
        std::fs::write(global.join(MEMORY_FILE), b"").unwrap();

        let cfg = MemoryConfig {
            path: None,
            project_dir: Some(dir.path().join("project")),
            global_dir: Some(global.clone()),
        };
        let loc = resolve_location(&cfg).unwrap();
        assert_eq!(loc.source, LocationSource::Global);
        assert_eq!(loc.path, global.join(MEMORY_FILE));
    }
}
