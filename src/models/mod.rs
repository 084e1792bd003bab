pub mod file_record;

pub use file_record::{ClassificationMap, FileRecord, OTHER_CATEGORY, UNCLASSIFIED_CATEGORY};
