use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::AppError;
use crate::models::{ClassificationMap, FileRecord};
use crate::services::classify_service;
use crate::services::llm_service::Transport;
use crate::services::reply_normalizer::{self, preview};
use crate::state::ProcessedSet;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
const MAX_BACKOFF_EXPONENT: u32 = 10;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub model_name: String,
    pub batch_size: usize,
    /// Transport attempts per batch, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles for each retry after that.
    pub backoff_base: Duration,
}

impl ClassifyOptions {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            batch_size: classify_service::DEFAULT_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport retry
// ---------------------------------------------------------------------------

fn retry_backoff_duration(base: Duration, attempt: usize) -> Duration {
    let exponent = (attempt.saturating_sub(1) as u32).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(2u32.pow(exponent))
}

async fn send_prompt_with_retry(
    transport: &dyn Transport,
    prompt: &str,
    options: &ClassifyOptions,
) -> Result<String, AppError> {
    let attempts = options.max_attempts.max(1);
    let mut last_error: Option<AppError> = None;

    for attempt in 1..=attempts {
        match transport.invoke(prompt, &options.model_name).await {
            Ok(reply) => return Ok(reply),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt < attempts {
                    let delay = retry_backoff_duration(options.backoff_base, attempt);
                    tracing::warn!(
                        "[classify] Request failed, retrying in {}ms (attempt {attempt}/{attempts}): {err}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    Err(AppError::RetriesExhausted {
        attempts,
        last: Box::new(last_error.unwrap_or_else(|| {
            AppError::General("request failed with unknown error".to_string())
        })),
    })
}

// ---------------------------------------------------------------------------
// Batch classification
// ---------------------------------------------------------------------------

async fn classify_batch(
    batch: &[FileRecord],
    transport: &dyn Transport,
    options: &ClassifyOptions,
    processed: &ProcessedSet,
) -> Result<ClassificationMap, AppError> {
    let prompt = classify_service::build_batch_prompt(batch);
    let reply = send_prompt_with_retry(transport, &prompt, options).await?;
    tracing::debug!("[classify] Raw reply: {}", preview(&reply));

    let normalized = reply_normalizer::normalize_reply(&reply)?;
    classify_service::resolve_batch(&normalized, batch, processed)
}

fn unique_by_path(files: &[FileRecord]) -> Vec<FileRecord> {
    let mut seen = HashSet::new();
    let unique = files
        .iter()
        .filter(|file| seen.insert(file.path.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    if unique.len() < files.len() {
        tracing::warn!(
            "[classify] Ignoring {} duplicate input paths",
            files.len() - unique.len()
        );
    }
    unique
}

/// Classification engine: one generic pipeline over any [`Transport`].
pub struct Classifier {
    transport: Arc<dyn Transport>,
    options: ClassifyOptions,
}

impl Classifier {
    pub fn new(transport: Arc<dyn Transport>, options: ClassifyOptions) -> Self {
        Self { transport, options }
    }

    /// Classifies `files` into categories.
    ///
    /// Batches run concurrently. If any batch fails, every batch still runs to
    /// completion but only the first error is returned; no partial result is
    /// ever produced. On success every input path appears in exactly one
    /// category, with files the model skipped placed in the unclassified one.
    pub async fn classify(&self, files: &[FileRecord]) -> Result<ClassificationMap, AppError> {
        let files = unique_by_path(files);
        if files.is_empty() {
            return Ok(ClassificationMap::new());
        }

        let batches = classify_service::chunk_files(&files, self.options.batch_size);
        let total = batches.len();
        let processed = Arc::new(ProcessedSet::new(&files));
        let options = Arc::new(self.options.clone());

        tracing::info!(
            "[classify] Classifying {} files in {total} batches with {}",
            files.len(),
            options.model_name
        );

        let mut join_set: JoinSet<(usize, Result<ClassificationMap, AppError>)> = JoinSet::new();
        for (idx, batch) in batches.into_iter().enumerate() {
            let transport = self.transport.clone();
            let options = options.clone();
            let processed = processed.clone();

            join_set.spawn(async move {
                tracing::info!(
                    "[classify] Batch {}/{total}: {} files",
                    idx + 1,
                    batch.len()
                );
                let outcome =
                    classify_batch(&batch, transport.as_ref(), &options, &processed).await;
                (idx, outcome)
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut first_error: Option<AppError> = None;
        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok((idx, Ok(map))) => {
                    tracing::info!(
                        "[classify] Batch {}/{total} done: {} categories",
                        idx + 1,
                        map.len()
                    );
                    Ok(map)
                }
                Ok((idx, Err(err))) => Err(AppError::Batch {
                    index: idx + 1,
                    total,
                    source: Box::new(err),
                }),
                Err(join_err) => Err(AppError::General(format!(
                    "classification task failed: {join_err}"
                ))),
            };

            match outcome {
                Ok(map) => results.push(map),
                Err(err) => {
                    tracing::error!("[classify] {err}");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        if let Some(fallback) = classify_service::unclassified_fallback(&files, &processed) {
            results.push(fallback);
        }

        Ok(classify_service::merge_classifications(results))
    }
}
