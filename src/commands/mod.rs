pub mod classify_pipeline;
pub mod organize_command;
