use crate::api::Pipeline;
use crate::config::SkewConfig;
use crate::skew::summarize;
use crate::utils::progress_bar_builder::ProgressBarBuilder;
use anyhow::{Context, Result};
use std::time::Duration;

pub fn run(config: SkewConfig, identifier: String, overwrite: bool, summary: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(config).context("Failed to set up pipeline")?;

    let progress = ProgressBarBuilder::new(format!("Generating skew plot for {}", identifier))
        .with_tick(Duration::from_millis(120))
        .build()?;
    let artifact = pipeline.request(&identifier, overwrite);
    progress.finish_and_clear();

    let artifact = artifact.with_context(|| format!("Could not produce skew plot for {}", identifier))?;
    println!("{}", artifact.display());

    if summary {
        let skew = pipeline
            .skew(&identifier)
            .with_context(|| format!("Could not compute skew for {}", identifier))?;
        let summary = summarize(&skew).context("Empty skew array")?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
