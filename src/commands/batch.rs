use crate::api::{Pipeline, ProgressEvent};
use crate::batch::render_all;
use crate::config::SkewConfig;
use crate::sequence::load_records;
use crate::types::GenomeRecord;
use crate::utils::progress_bar_builder::ProgressBarBuilder;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Serialize)]
struct RecordReport {
    length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_skew: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_skew: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(
    config: SkewConfig,
    fasta: Option<PathBuf>,
    sources: Vec<(String, String)>,
    render: bool,
    output_file: Option<PathBuf>,
) -> Result<()> {
    let mut records = match &fasta {
        Some(path) => load_records(path)
            .with_context(|| format!("Failed to load records from {}", path.display()))?,
        None => Vec::new(),
    };
    records.extend(
        sources
            .into_iter()
            .map(|(name, source)| GenomeRecord::from_source(name, source)),
    );
    if records.is_empty() {
        bail!("Nothing to do: give a FASTA file or at least one --source NAME=URL_OR_PATH");
    }

    let pipeline = Pipeline::from_config(config).context("Failed to set up pipeline")?;
    let progress = ProgressBarBuilder::new("Computing skew arrays")
        .with_length(records.len() as u64)
        .build()?;
    let bar = progress.clone();
    let dispatcher = pipeline.dispatcher().with_progress(Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::Progress { current, .. } => bar.set_position(current),
        ProgressEvent::Error { task, error } => bar.println(format!("{}: {}", task, error)),
        ProgressEvent::Started { .. } | ProgressEvent::Completed { .. } => {}
    }));

    let results = dispatcher.submit(records);
    progress.finish_with_message("Done");

    let mut plots = if render {
        render_all(&results, pipeline.renderer(), &pipeline.config().output_dir)
    } else {
        BTreeMap::new()
    };

    let report: BTreeMap<&str, RecordReport> = results
        .iter()
        .map(|(name, outcome)| {
            let plot = plots.remove(name);
            let report = match outcome {
                Ok(skew) => RecordReport {
                    length: Some(skew.len() - 1),
                    min_skew: skew.iter().min().copied(),
                    final_skew: skew.last().copied(),
                    plot: plot.as_ref().and_then(|p| p.as_ref().ok()).cloned(),
                    error: plot.and_then(|p| p.err()).map(|e| e.to_string()),
                },
                Err(e) => RecordReport {
                    length: None,
                    min_skew: None,
                    final_skew: None,
                    plot: None,
                    error: Some(e.to_string()),
                },
            };
            (name.as_str(), report)
        })
        .collect();

    let mut writer: Box<dyn Write> = match &output_file {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writeln!(writer)?;
    writer.flush()?;

    let failed = results.values().filter(|r| r.is_err()).count();
    if failed > 0 {
        log::warn!("{} of {} records failed", failed, results.len());
    }
    Ok(())
}
