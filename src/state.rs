use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::models::FileRecord;

/// Tracks which input paths some batch reply has accounted for.
///
/// Lives for exactly one classification call. Batch workers mark paths
/// concurrently; the completeness check reads it once every worker is done.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    entries: Mutex<HashMap<String, bool>>,
}

impl ProcessedSet {
    pub fn new(files: &[FileRecord]) -> Self {
        let entries = files
            .iter()
            .map(|file| (file.path.clone(), false))
            .collect::<HashMap<_, _>>();
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, bool>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks `path` as processed. Returns false if it was already marked.
    pub fn mark(&self, path: &str) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(path) {
            Some(done) if *done => false,
            Some(done) => {
                *done = true;
                true
            }
            None => {
                entries.insert(path.to_string(), true);
                true
            }
        }
    }

    pub fn is_processed(&self, path: &str) -> bool {
        self.lock().get(path).copied().unwrap_or(false)
    }

    /// Paths no batch has marked yet.
    pub fn pending_paths(&self) -> HashSet<String> {
        self.lock()
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(path, _)| path.clone())
            .collect()
    }
}
