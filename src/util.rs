use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Keep at most `max` characters of `detail`, marking a cut with `...`.
pub fn clip(detail: &str, max: usize) -> String {
    match detail.char_indices().nth(max) {
        None => detail.to_string(),
        Some(_) if max <= 3 => detail.chars().take(max).collect(),
        Some(_) => {
            let cut = detail
                .char_indices()
                .nth(max - 3)
                .map_or(detail.len(), |(i, _)| i);
            format!("{}...", &detail[..cut])
        }
    }
}

/// Replace `path` with `content` via a sibling temp file and a rename, so a
/// reader never observes a half-written source unit.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unit".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

/// File extension without the dot, falling back to `py`.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("py")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clip_counts_characters_not_bytes() {
        assert_eq!(clip("ééééé", 4), "é...");
        assert_eq!(clip("ééééé", 5), "ééééé");
        assert_eq!(clip("こんにちは", 3), "こんに");
        assert_eq!(clip("こんにちは", 0), "");
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("unit.py");
        fs::write(&path, "old\n").unwrap();
        write_atomic(&path, "new\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        assert!(!dir.path().join(".unit.py.tmp").exists());
    }

    #[test]
    fn test_extension_of_defaults_to_py() {
        assert_eq!(extension_of(Path::new("a/b.pyi")), "pyi");
        assert_eq!(extension_of(Path::new("a/b")), "py");
    }
}
