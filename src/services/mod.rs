pub mod classify_service;
pub mod config_service;
pub mod llm_service;
pub mod move_service;
pub mod reply_normalizer;
pub mod scan_service;
