//! Persisted revisions of a source unit
//!
//! Each promoted round writes `<base>_improved_<iteration>.<ext>`. The order
//! of revisions is kept explicitly in a `RevisionLog` rather than inferred
//! from file names, and the log is saved next to the revisions as
//! `<base>_revisions.json`.

use crate::util::{extension_of, write_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub iteration: u32,
    pub path: PathBuf,
    pub diagnostic_count: usize,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionLog {
    pub source: PathBuf,
    pub revisions: Vec<Revision>,
}

impl RevisionLog {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            revisions: Vec::new(),
        }
    }

    pub fn push(&mut self, revision: Revision) {
        self.revisions.push(revision);
    }

    pub fn latest(&self) -> Option<&Revision> {
        self.revisions.last()
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        write_atomic(path, &content)
    }
}

/// File stem with any `_improved_<n>` suffix removed, so revision names never
/// stack suffixes.
pub fn base_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.rfind("_improved_") {
        Some(pos)
            if pos > 0
                && stem[pos + "_improved_".len()..]
                    .chars()
                    .all(|c| c.is_ascii_digit())
                && stem.len() > pos + "_improved_".len() =>
        {
            stem[..pos].to_string()
        }
        _ => stem,
    }
}

fn target_dir(original: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => original
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}

/// `<dir>/<base>_improved_<iteration>.<ext>`
pub fn revision_path(original: &Path, output_dir: Option<&Path>, iteration: u32) -> PathBuf {
    target_dir(original, output_dir).join(format!(
        "{}_improved_{}.{}",
        base_stem(original),
        iteration,
        extension_of(original)
    ))
}

/// `<dir>/<base>_revisions.json`
pub fn log_path(original: &Path, output_dir: Option<&Path>) -> PathBuf {
    target_dir(original, output_dir).join(format!("{}_revisions.json", base_stem(original)))
}

/// Write one revision file, creating the output directory on demand.
pub fn persist(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_atomic(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn revision_names_follow_base_and_iteration() {
        let original = Path::new("pkg/app.py");
        assert_eq!(revision_path(original, None, 1), PathBuf::from("pkg/app_improved_1.py"));
        assert_eq!(
            revision_path(original, Some(Path::new("out")), 3),
            PathBuf::from("out/app_improved_3.py")
        );
        assert_eq!(log_path(original, None), PathBuf::from("pkg/app_revisions.json"));
    }

    #[test]
    fn base_stem_strips_existing_iteration_suffix() {
        assert_eq!(base_stem(Path::new("a/app_improved_2.py")), "app");
        assert_eq!(base_stem(Path::new("app_improved_x.py")), "app_improved_x");
        assert_eq!(base_stem(Path::new("app_improved_.py")), "app_improved_");
        assert_eq!(base_stem(Path::new("_improved_4.py")), "_improved_4");
    }

    #[test]
    fn log_round_trips_through_json() {
        let dir = tempdir().unwrap();
        let mut log = RevisionLog::new("app.py");
        log.push(Revision {
            iteration: 1,
            path: dir.path().join("app_improved_1.py"),
            diagnostic_count: 4,
            score: Some(7.5),
            created_at: Utc::now(),
        });
        let path = dir.path().join("app_revisions.json");
        log.save(&path).unwrap();
        let loaded: RevisionLog =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, log);
        assert_eq!(loaded.latest().map(|r| r.iteration), Some(1));
    }

    #[test]
    fn persist_creates_output_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out/app_improved_1.py");
        persist(&path, "x = 1\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x = 1\n");
    }
}
