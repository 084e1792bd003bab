pub mod commands;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::organize_command::{self, OrganizeArgs};

pub use commands::classify_pipeline::{Classifier, ClassifyOptions};
pub use error::AppError;
pub use models::{ClassificationMap, FileRecord, OTHER_CATEGORY, UNCLASSIFIED_CATEGORY};
pub use services::llm_service::{ChatCompletionsTransport, Transport};

const DEFAULT_LOG_FILTER: &str = "warn,filesort_lib=info";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() {
    let args = OrganizeArgs::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(organize_command::run_organize(args)) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
