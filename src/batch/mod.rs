//! Concurrent fan-out of independent genome records, fanned back in by name.

mod threading;

use crate::api::{ApiResult, PipelineStage, ProgressCallback, ProgressEvent, SkewError};
use crate::config::SkewConfig;
use crate::sequence::{SequenceFetcher, SequenceParser};
use crate::skew;
use crate::types::{GenomeRecord, SkewArray};
use crate::utils::deadline::{abandoned_tasks, run_with_deadline};
use crate::utils::skew_plotter::ArtifactRenderer;
use crossbeam_channel::unbounded;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::Builder;
use threading::WorkerPool;

const TASK: &str = "Computing skew arrays";

/// Per-record outcome, keyed by record name.
pub type BatchResults = BTreeMap<String, ApiResult<SkewArray>>;

pub struct BatchDispatcher {
    fetcher: Arc<dyn SequenceFetcher>,
    parser: SequenceParser,
    max_concurrency: usize,
    task_timeout: Duration,
    progress_callback: Option<ProgressCallback>,
}

impl BatchDispatcher {
    pub fn new(
        fetcher: Arc<dyn SequenceFetcher>,
        parser: SequenceParser,
        max_concurrency: usize,
        task_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            parser,
            max_concurrency: max_concurrency.max(1),
            task_timeout,
            progress_callback: None,
        }
    }

    pub fn from_config(config: &SkewConfig, fetcher: Arc<dyn SequenceFetcher>) -> Self {
        Self::new(
            fetcher,
            SequenceParser::new(config.max_lines),
            config.max_concurrency,
            config.task_deadline(),
        )
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn emit_progress(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress_callback {
            callback(event);
        }
    }

    /// Runs fetch, parse and compute for every record on at most
    /// `max_concurrency` workers. One record failing or timing out never
    /// affects its siblings. A record whose name was already seen is skipped.
    pub fn submit(&self, records: Vec<GenomeRecord>) -> BatchResults {
        let mut seen = HashSet::with_capacity(records.len());
        let mut queued = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(record.name.clone()) {
                queued.push(record);
            } else {
                log::warn!("Skipping duplicate record name {}", record.name);
            }
        }

        let total = queued.len() as u64;
        self.emit_progress(ProgressEvent::Started {
            task: TASK.to_string(),
            total,
        });

        let (done_tx, done_rx) = unbounded::<(String, ApiResult<SkewArray>)>();
        let fetcher = Arc::clone(&self.fetcher);
        let parser = self.parser;
        let timeout = self.task_timeout;
        let callback = self.progress_callback.clone();
        let completed = Arc::new(AtomicU64::new(0));

        let work = move |record: GenomeRecord| {
            let name = record.name.clone();
            let outcome = process_with_deadline(record, Arc::clone(&fetcher), parser, timeout);

            if let Some(callback) = &callback {
                if let Err(e) = &outcome {
                    callback(ProgressEvent::Error {
                        task: name.clone(),
                        error: e.to_string(),
                    });
                }
                callback(ProgressEvent::Progress {
                    task: TASK.to_string(),
                    current: completed.fetch_add(1, Ordering::SeqCst) + 1,
                    total,
                });
            }
            // The receiver outlives every worker, so this cannot fail.
            let _ = done_tx.send((name, outcome));
        };

        let mut results = BatchResults::new();
        match WorkerPool::new(self.max_concurrency, work) {
            Ok(pool) => {
                for record in queued {
                    if let Err(record) = pool.send(record) {
                        results.insert(
                            record.name,
                            Err(SkewError::InvalidInput("batch queue closed".to_string())),
                        );
                    }
                }
                pool.finish();
            }
            Err(e) => {
                log::error!("Failed to start batch workers: {}", e);
                for record in queued {
                    results.insert(
                        record.name,
                        Err(SkewError::InvalidInput(format!("no batch workers: {}", e))),
                    );
                }
            }
        }

        // Completion order is arbitrary; names re-associate outcomes.
        for (name, outcome) in done_rx.iter() {
            results.insert(name, outcome);
        }

        let failures = results.values().filter(|r| r.is_err()).count();
        log::info!(
            "Batch finished: {} succeeded, {} failed",
            results.len() - failures,
            failures
        );
        let stragglers = abandoned_tasks();
        if stragglers > 0 {
            log::warn!("{} timed-out task thread(s) are still blocked", stragglers);
        }
        self.emit_progress(ProgressEvent::Completed {
            task: TASK.to_string(),
        });
        results
    }
}

// A stuck fetch or read costs only this record its deadline.
fn process_with_deadline(
    record: GenomeRecord,
    fetcher: Arc<dyn SequenceFetcher>,
    parser: SequenceParser,
    timeout: Duration,
) -> ApiResult<SkewArray> {
    let name = record.name.clone();
    run_with_deadline(&name, timeout, move || {
        process_record(record, fetcher.as_ref(), parser)
    })
    .and_then(|record| {
        record
            .skew
            .ok_or_else(|| SkewError::InvalidInput(format!("{} produced no skew", name)))
    })
}

/// Fetches (unless already populated) and computes one record, returning it
/// rebuilt with its sequence and skew filled in.
fn process_record(
    mut record: GenomeRecord,
    fetcher: &dyn SequenceFetcher,
    parser: SequenceParser,
) -> ApiResult<GenomeRecord> {
    if record.sequence.is_none() {
        let source = record.source.clone().ok_or_else(|| {
            SkewError::InvalidInput(format!("record {} has no source or sequence", record.name))
        })?;
        let stream = fetcher
            .fetch(&source)
            .map_err(|e| e.in_stage(PipelineStage::Fetch, &source))?;
        let sequence = parser
            .parse(stream)
            .map_err(|e| e.in_stage(PipelineStage::Parse, &source))?;
        record.sequence = Some(sequence);
    }

    record.skew = record.sequence.as_deref().map(|sequence| skew::compute(sequence));
    Ok(record)
}

/// File-safe artifact stem for a record name.
pub fn artifact_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if stem.trim_matches('.').is_empty() {
        "_".repeat(stem.len().max(1))
    } else {
        stem
    }
}

/// Writes `<name>.<ext>` for every successful batch entry, publishing each
/// through a temp file so no reader sees a half-written artifact.
pub fn render_all(
    results: &BatchResults,
    renderer: &dyn ArtifactRenderer,
    output_dir: &Path,
) -> BTreeMap<String, ApiResult<PathBuf>> {
    let mut rendered = BTreeMap::new();
    if let Err(e) = fs::create_dir_all(output_dir) {
        let err = SkewError::RenderError(format!("{}: {}", output_dir.display(), e));
        for name in results.keys() {
            rendered.insert(name.clone(), Err(err.clone()));
        }
        return rendered;
    }

    for (name, outcome) in results {
        let Ok(skew) = outcome else { continue };
        let target = output_dir.join(format!("{}.{}", artifact_stem(name), renderer.extension()));
        let result = Builder::new()
            .prefix(".skew_")
            .suffix(".partial")
            .tempfile_in(output_dir)
            .map_err(|e| SkewError::RenderError(e.to_string()))
            .and_then(|tmp| {
                renderer.render(skew, Some(&format!("Skew array for {}", name)), tmp.path())?;
                tmp.persist(&target)
                    .map_err(|e| SkewError::RenderError(e.error.to_string()))?;
                Ok(target)
            })
            .map_err(|e| e.in_stage(PipelineStage::Render, name));

        if let Ok(path) = &result {
            log::debug!("Generated plot for {} at {}", name, path.display());
        }
        rendered.insert(name.clone(), result);
    }
    rendered
}
