use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::AppError;
use crate::models::{ClassificationMap, UNCLASSIFIED_CATEGORY};

const MAX_DIR_NAME_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct MovedFile {
    pub from: String,
    pub to: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveReport {
    pub moved: Vec<MovedFile>,
    pub warnings: Vec<String>,
}

/// Makes a model-supplied category usable as a single directory name.
pub fn category_dir_name(category: &str) -> String {
    let replaced = category
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            {
                '_'
            } else {
                c
            }
        })
        .collect::<String>();
    let cleaned = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        return UNCLASSIFIED_CATEGORY.to_string();
    }
    cleaned.chars().take(MAX_DIR_NAME_CHARS).collect()
}

/// Returns `destination`, or the first free `name_N.ext` next to it.
fn unique_destination(destination: &Path) -> PathBuf {
    if !destination.exists() {
        return destination.to_path_buf();
    }

    let parent = destination.parent().unwrap_or_else(|| Path::new(""));
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = destination
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1usize;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    // Rename fails across filesystems; fall back to copy + remove.
    fs::copy(source, destination)?;
    fs::remove_file(source)
}

fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Removes folders under `root` left empty by the move, deepest first, so a
/// parent that only held emptied folders goes too. `root`, the folders in
/// `keep` and hidden folders are never touched.
fn remove_empty_dirs(root: &Path, keep: &HashSet<PathBuf>, warnings: &mut Vec<String>) {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warnings.push(format!("failed to scan for empty folders: {err}"));
                continue;
            }
        };
        if !entry.file_type().is_dir() || keep.contains(entry.path()) {
            continue;
        }

        match is_empty_dir(entry.path()) {
            Ok(true) => match fs::remove_dir(entry.path()) {
                Ok(()) => tracing::debug!("Removed empty folder {}", entry.path().display()),
                Err(err) => warnings.push(format!(
                    "failed to remove empty folder {}: {err}",
                    entry.path().display()
                )),
            },
            Ok(false) => {}
            Err(err) => warnings.push(format!(
                "failed to read folder {}: {err}",
                entry.path().display()
            )),
        }
    }
}

/// Moves every classified file under `root` into `root/<category>/`.
///
/// Per-file problems are collected as warnings and never stop the run.
/// Folders emptied by the move are removed afterwards.
pub fn apply_classification(
    root: &Path,
    classification: &ClassificationMap,
) -> Result<MoveReport, AppError> {
    if !root.is_dir() {
        return Err(AppError::General(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut report = MoveReport::default();
    let mut categories = classification.keys().collect::<Vec<_>>();
    categories.sort();
    let category_dirs = categories
        .iter()
        .map(|category| root.join(category_dir_name(category)))
        .collect::<HashSet<_>>();

    for category in categories {
        let category_dir = root.join(category_dir_name(category));
        if let Err(err) = fs::create_dir_all(&category_dir) {
            report.warnings.push(format!(
                "failed to create {}: {err}",
                category_dir.display()
            ));
            continue;
        }

        for record in &classification[category] {
            let source = root.join(&record.path);
            if !source.is_file() {
                report
                    .warnings
                    .push(format!("source file does not exist: {}", record.path));
                continue;
            }
            let Some(file_name) = source.file_name() else {
                report
                    .warnings
                    .push(format!("invalid source path: {}", record.path));
                continue;
            };

            let target = category_dir.join(file_name);
            if target == source {
                continue;
            }
            let destination = unique_destination(&target);

            match move_file(&source, &destination) {
                Ok(()) => {
                    tracing::info!("Moved {} -> {}", record.path, destination.display());
                    report.moved.push(MovedFile {
                        from: record.path.clone(),
                        to: destination,
                    });
                }
                Err(err) => report
                    .warnings
                    .push(format!("failed to move {}: {err}", record.path)),
            }
        }
    }

    remove_empty_dirs(root, &category_dirs, &mut report.warnings);
    Ok(report)
}
