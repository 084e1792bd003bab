use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Category assigned to files that no batch reply accounted for.
pub const UNCLASSIFIED_CATEGORY: &str = "unclassified";

/// Bucket the model is asked to use for files it cannot place.
pub const OTHER_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the scanned root. Exact, case-sensitive join key
    /// between the model's reply and the input list.
    pub path: String,
    pub category: Option<String>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: None,
        }
    }

    pub fn with_category(&self, category: &str) -> Self {
        Self {
            path: self.path.clone(),
            category: Some(category.to_string()),
        }
    }
}

/// Category name to the files assigned to it. A path appears under at most
/// one category; file order within a category is not meaningful.
pub type ClassificationMap = HashMap<String, Vec<FileRecord>>;
