use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use crate::commands::classify_pipeline::{Classifier, ClassifyOptions};
use crate::models::ClassificationMap;
use crate::services::classify_service::DEFAULT_BATCH_SIZE;
use crate::services::config_service;
use crate::services::llm_service::{
    ChatCompletionsTransport, DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT,
};
use crate::services::move_service::{self, MoveReport};
use crate::services::scan_service;

/// Sort the files in a folder into category folders chosen by an LLM.
#[derive(Debug, Parser)]
#[command(name = "filesort", version)]
pub struct OrganizeArgs {
    /// Folder to organize. Prompted for on stdin when omitted.
    pub root: Option<PathBuf>,

    /// Provider to use (deepseek, siliconflow, aliyun, github). Defaults to
    /// the config's `default_provider`.
    #[arg(long, short)]
    pub provider: Option<String>,

    /// Path to the provider config file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Files sent to the model per request.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Classify only; do not move anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct OrganizeOutput<'a> {
    categories: BTreeMap<&'a str, Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    moves: Option<&'a MoveReport>,
}

/// Category names with their file counts, sorted by name.
pub fn category_summary(classification: &ClassificationMap) -> Vec<(String, usize)> {
    let mut summary = classification
        .iter()
        .map(|(category, files)| (category.clone(), files.len()))
        .collect::<Vec<_>>();
    summary.sort();
    summary
}

fn prompt_for_directory(input: &mut impl BufRead, output: &mut impl Write) -> io::Result<PathBuf> {
    write!(output, "Enter the folder to organize: ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no folder given",
        ));
    }
    Ok(PathBuf::from(trimmed))
}

fn render_json(
    classification: &ClassificationMap,
    moves: Option<&MoveReport>,
) -> serde_json::Result<String> {
    let categories = classification
        .iter()
        .map(|(category, files)| {
            let mut paths = files.iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
            paths.sort_unstable();
            (category.as_str(), paths)
        })
        .collect();
    serde_json::to_string_pretty(&OrganizeOutput { categories, moves })
}

pub async fn run_organize(args: OrganizeArgs) -> anyhow::Result<()> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config_service::default_config_path);
    let config = config_service::load_or_init_config(&config_path)?;
    let provider = config.provider(args.provider.as_deref())?;
    tracing::info!(
        "[organize] Using provider {} ({}) from {}",
        provider.kind,
        provider.model_name,
        config_path.display()
    );

    let transport = ChatCompletionsTransport::new(
        provider.api_url.clone(),
        provider.api_key.clone(),
        DEFAULT_MAX_TOKENS,
        DEFAULT_REQUEST_TIMEOUT,
    )?;

    let root = match args.root.clone() {
        Some(root) => root,
        None => prompt_for_directory(&mut io::stdin().lock(), &mut io::stdout())
            .context("failed to read folder path")?,
    };

    let files = scan_service::scan_directory(&root)?;
    if !args.json {
        println!("Found {} files", files.len());
    }
    if files.is_empty() {
        if args.json {
            println!("{}", render_json(&ClassificationMap::new(), None)?);
        }
        return Ok(());
    }

    let options = ClassifyOptions {
        batch_size: args.batch_size,
        ..ClassifyOptions::new(provider.model_name.clone())
    };
    let classifier = Classifier::new(Arc::new(transport), options);

    if !args.json {
        println!("Classifying with {} ...", provider.kind);
    }
    let classification = classifier
        .classify(&files)
        .await
        .with_context(|| format!("failed to classify files in {}", root.display()))?;

    if !args.json {
        println!("Done: {} categories", classification.len());
        for (category, count) in category_summary(&classification) {
            println!("- {category}: {count} files");
        }
    }

    let report = if args.dry_run {
        None
    } else {
        Some(move_service::apply_classification(&root, &classification)?)
    };

    if args.json {
        println!("{}", render_json(&classification, report.as_ref())?);
        return Ok(());
    }

    match report {
        Some(report) => {
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            println!("Moved {} files", report.moved.len());
        }
        None => println!("Dry run: no files were moved"),
    }
    Ok(())
}
