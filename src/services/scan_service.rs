use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::error::AppError;
use crate::models::FileRecord;

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Lists every regular file under `root` as a [`FileRecord`] keyed by its
/// `/`-separated path relative to `root`. Hidden files and directories are
/// skipped. Results are sorted by path.
pub fn scan_directory(root: &Path) -> Result<Vec<FileRecord>, AppError> {
    if !root.is_dir() {
        return Err(AppError::General(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(key) = relative_key(root, entry.path()) {
            files.push(FileRecord::new(key));
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lists_nested_files_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("photos/2024")).unwrap();
        fs::write(dir.path().join("notes.txt"), "n").unwrap();
        fs::write(dir.path().join("photos/2024/beach.jpg"), "b").unwrap();

        let files = scan_directory(dir.path()).unwrap();

        let paths = files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["notes.txt", "photos/2024/beach.jpg"]);
        assert!(files.iter().all(|f| f.category.is_none()));
    }

    #[test]
    fn skips_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), "x").unwrap();
        fs::write(dir.path().join(".DS_Store"), "x").unwrap();
        fs::write(dir.path().join("report.pdf"), "x").unwrap();

        let files = scan_directory(dir.path()).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "report.pdf");
    }

    #[test]
    fn rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_directory(&dir.path().join("missing")).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
