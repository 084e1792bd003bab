use std::collections::{BTreeMap, HashMap};

use crate::error::AppError;
use crate::models::{ClassificationMap, FileRecord, OTHER_CATEGORY, UNCLASSIFIED_CATEGORY};
use crate::state::ProcessedSet;

pub const DEFAULT_BATCH_SIZE: usize = 150;

pub fn chunk_files(files: &[FileRecord], batch_size: usize) -> Vec<Vec<FileRecord>> {
    if files.is_empty() {
        return Vec::new();
    }
    let size = batch_size.max(1);
    files.chunks(size).map(|chunk| chunk.to_vec()).collect()
}

/// Renders one batch as a classification request.
///
/// Paths are written exactly as they appear in `FileRecord::path`; the
/// resolver later matches the reply against those same bytes.
pub fn build_batch_prompt(batch: &[FileRecord]) -> String {
    let file_list = batch
        .iter()
        .map(|file| format!("- {}\n", file.path))
        .collect::<String>();

    format!(
        "Group the following files by similarity and return the grouping as JSON.\n\
Give each category a short, descriptive name that can be used as a folder name.\n\
\n\
Files:\n\
{file_list}\
\n\
Return the result as a JSON object with this shape:\n\
{{\n\
  \"category name 1\": [\"file path 1\", \"file path 2\"],\n\
  \"category name 2\": [\"file path 3\"]\n\
}}\n\
\n\
Rules:\n\
1. Return only valid JSON. Do not include any other text.\n\
2. Assign every listed file to exactly one category. Do not leave any file out.\n\
3. Copy each file path exactly as it is listed.\n\
4. If a file's purpose is unclear, put it in the \"{OTHER_CATEGORY}\" category."
    )
}

/// Maps a normalized reply back onto the records of one batch.
///
/// Only records in `batch` can be matched; paths the model invented, renamed
/// or took from another batch are ignored. A path listed more than once, or
/// already marked in `processed`, is kept under the first category that
/// claimed it.
pub fn resolve_batch(
    reply_json: &str,
    batch: &[FileRecord],
    processed: &ProcessedSet,
) -> Result<ClassificationMap, AppError> {
    let categories: BTreeMap<String, Vec<String>> = serde_json::from_str(reply_json)
        .map_err(|e| {
            AppError::MalformedResponse(format!("reply JSON is not a category map: {e}"))
        })?;
    if categories.is_empty() {
        return Err(AppError::MalformedResponse(
            "model returned an empty category map".to_string(),
        ));
    }

    let by_path: HashMap<&str, &FileRecord> = batch
        .iter()
        .map(|file| (file.path.as_str(), file))
        .collect();
    let mut ignored = 0usize;
    let mut classified = ClassificationMap::new();

    for (category, paths) in &categories {
        let category = category.trim();
        if category.is_empty() {
            ignored += paths.len();
            continue;
        }
        for path in paths {
            let Some(record) = by_path.get(path.as_str()) else {
                ignored += 1;
                continue;
            };
            if !processed.mark(&record.path) {
                continue;
            }
            classified
                .entry(category.to_string())
                .or_default()
                .push(record.with_category(category));
        }
    }

    if ignored > 0 {
        tracing::debug!("Ignored {ignored} reply entries that matched no file in the batch");
    }

    Ok(classified)
}

/// Collects every input file no batch accounted for into the reserved
/// unclassified category. Returns `None` when nothing is missing.
pub fn unclassified_fallback(
    files: &[FileRecord],
    processed: &ProcessedSet,
) -> Option<ClassificationMap> {
    let pending = processed.pending_paths();
    if pending.is_empty() {
        return None;
    }

    let missing = files
        .iter()
        .filter(|file| pending.contains(&file.path))
        .map(|file| file.with_category(UNCLASSIFIED_CATEGORY))
        .collect::<Vec<_>>();

    tracing::warn!(
        "{} files were not classified by the model; assigning them to \"{UNCLASSIFIED_CATEGORY}\"",
        missing.len()
    );
    for file in &missing {
        tracing::debug!("Unclassified: {}", file.path);
    }

    let mut fallback = ClassificationMap::new();
    fallback.insert(UNCLASSIFIED_CATEGORY.to_string(), missing);
    Some(fallback)
}

pub fn merge_classifications(results: Vec<ClassificationMap>) -> ClassificationMap {
    let mut merged = ClassificationMap::new();
    for result in results {
        for (category, files) in result {
            merged.entry(category).or_default().extend(files);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(paths: &[&str]) -> Vec<FileRecord> {
        paths.iter().map(|path| FileRecord::new(*path)).collect()
    }

    fn sorted_paths(map: &ClassificationMap, category: &str) -> Vec<String> {
        let mut paths = map
            .get(category)
            .map(|files| files.iter().map(|f| f.path.clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    #[test]
    fn chunk_files_splits_into_fixed_batches() {
        let files = records(&["a", "b", "c", "d", "e"]);
        let batches = chunk_files(&files, 2);

        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert_eq!(batches[2][0].path, "e");
    }

    #[test]
    fn chunk_files_handles_empty_and_zero_size() {
        assert!(chunk_files(&[], 150).is_empty());
        assert_eq!(chunk_files(&records(&["a", "b"]), 0).len(), 2);
    }

    #[test]
    fn prompt_lists_every_path_verbatim() {
        let batch = records(&["docs/Report 2024.PDF", "img/photo (1).jpg"]);
        let prompt = build_batch_prompt(&batch);

        assert!(prompt.contains("- docs/Report 2024.PDF\n"));
        assert!(prompt.contains("- img/photo (1).jpg\n"));
        assert!(prompt.contains("\"other\""));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn resolve_batch_maps_reply_onto_records() {
        let batch = records(&["a.txt", "b.jpg", "c.txt"]);
        let processed = ProcessedSet::new(&batch);
        let reply = r#"{"docs":["a.txt","c.txt"],"images":["b.jpg"]}"#;

        let map = resolve_batch(reply, &batch, &processed).unwrap();

        assert_eq!(sorted_paths(&map, "docs"), vec!["a.txt", "c.txt"]);
        assert_eq!(sorted_paths(&map, "images"), vec!["b.jpg"]);
        assert_eq!(map["images"][0].category.as_deref(), Some("images"));
        assert!(processed.pending_paths().is_empty());
    }

    #[test]
    fn resolve_batch_ignores_paths_outside_the_batch() {
        let all = records(&["a.txt", "b.txt"]);
        let processed = ProcessedSet::new(&all);
        let batch = vec![all[0].clone()];
        let reply = r#"{"docs":["a.txt","b.txt","invented.txt","A.TXT"]}"#;

        let map = resolve_batch(reply, &batch, &processed).unwrap();

        assert_eq!(sorted_paths(&map, "docs"), vec!["a.txt"]);
        assert!(!processed.is_processed("b.txt"));
    }

    #[test]
    fn resolve_batch_keeps_first_category_for_duplicates() {
        let batch = records(&["a.txt"]);
        let processed = ProcessedSet::new(&batch);
        let reply = r#"{"b_notes":["a.txt"],"a_docs":["a.txt","a.txt"]}"#;

        let map = resolve_batch(reply, &batch, &processed).unwrap();

        assert_eq!(sorted_paths(&map, "a_docs"), vec!["a.txt"]);
        assert!(!map.contains_key("b_notes"));
    }

    #[test]
    fn resolve_batch_skips_paths_already_marked() {
        let batch = records(&["a.txt", "b.txt"]);
        let processed = ProcessedSet::new(&batch);
        processed.mark("a.txt");

        let map = resolve_batch(r#"{"docs":["a.txt","b.txt"]}"#, &batch, &processed).unwrap();

        assert_eq!(sorted_paths(&map, "docs"), vec!["b.txt"]);
        assert!(processed.pending_paths().is_empty());
    }

    #[test]
    fn resolve_batch_rejects_empty_map() {
        let batch = records(&["a.txt"]);
        let processed = ProcessedSet::new(&batch);

        let err = resolve_batch("{}", &batch, &processed).unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }

    #[test]
    fn resolve_batch_rejects_wrong_shape() {
        let batch = records(&["a.txt"]);
        let processed = ProcessedSet::new(&batch);

        let err = resolve_batch(r#"{"docs": "a.txt"}"#, &batch, &processed).unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn resolve_batch_skips_blank_category_names() {
        let batch = records(&["a.txt", "b.txt"]);
        let processed = ProcessedSet::new(&batch);
        let reply = r#"{"  ":["a.txt"],"notes":["b.txt"]}"#;

        let map = resolve_batch(reply, &batch, &processed).unwrap();

        assert_eq!(map.len(), 1);
        assert!(!processed.is_processed("a.txt"));
    }

    #[test]
    fn fallback_collects_exactly_the_unmatched_files() {
        let files = records(&["a.txt", "b.jpg", "c.txt"]);
        let processed = ProcessedSet::new(&files);
        processed.mark("b.jpg");

        let fallback = unclassified_fallback(&files, &processed).unwrap();

        assert_eq!(
            sorted_paths(&fallback, UNCLASSIFIED_CATEGORY),
            vec!["a.txt", "c.txt"]
        );
        assert!(fallback[UNCLASSIFIED_CATEGORY]
            .iter()
            .all(|f| f.category.as_deref() == Some(UNCLASSIFIED_CATEGORY)));
    }

    #[test]
    fn fallback_is_none_when_everything_matched() {
        let files = records(&["a.txt"]);
        let processed = ProcessedSet::new(&files);
        processed.mark("a.txt");

        assert!(unclassified_fallback(&files, &processed).is_none());
    }

    #[test]
    fn merge_accumulates_categories_across_batches() {
        let first = ClassificationMap::from([(
            "images".to_string(),
            vec![FileRecord::new("a.jpg").with_category("images")],
        )]);
        let second = ClassificationMap::from([
            (
                "images".to_string(),
                vec![FileRecord::new("b.png").with_category("images")],
            ),
            (
                "docs".to_string(),
                vec![FileRecord::new("c.txt").with_category("docs")],
            ),
        ]);

        let merged = merge_classifications(vec![first, second]);

        assert_eq!(sorted_paths(&merged, "images"), vec!["a.jpg", "b.png"]);
        assert_eq!(sorted_paths(&merged, "docs"), vec!["c.txt"]);
    }
}
