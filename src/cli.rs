use crate::config::SkewConfig;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory for cached plots (overrides config.toml)
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of sequence lines read per source
    #[arg(long, global = true)]
    pub max_lines: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Args {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply(&self, mut config: SkewConfig) -> SkewConfig {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(max_lines) = self.max_lines {
            config.max_lines = max_lines;
        }
        if let Commands::Batch { jobs, timeout, .. } = &self.command {
            if let Some(jobs) = jobs {
                config.max_concurrency = *jobs;
            }
            if let Some(timeout) = timeout {
                config.task_timeout = *timeout;
            }
        }
        config.normalized()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate (or reuse) the cached skew plot for a FASTA URL or path
    Skew {
        /// URL or local path of a FASTA file, optionally gzip-compressed
        identifier: String,

        /// Regenerate the plot even if it is cached
        #[arg(long)]
        overwrite: bool,

        /// Also print the minimum/maximum skew positions as JSON
        #[arg(long)]
        summary: bool,
    },

    /// Compute skew arrays for many genomes concurrently
    Batch {
        /// Multi-FASTA file; each record is processed independently
        fasta: Option<PathBuf>,

        /// Named source as NAME=URL_OR_PATH (repeatable)
        #[arg(long = "source", value_parser = parse_named_source)]
        sources: Vec<(String, String)>,

        /// Maximum number of records processed at once
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Per-record deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write <name>.svg plots for successful records
        #[arg(long)]
        render: bool,

        /// Write the JSON report here instead of stdout
        #[arg(short = 'o', long = "output")]
        output_file: Option<PathBuf>,
    },

    /// Remove the cached plot for a URL or path
    Purge {
        identifier: String,
    },
}

fn parse_named_source(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, source)) if !name.is_empty() && !source.is_empty() => {
            Ok((name.to_string(), source.to_string()))
        }
        _ => Err(format!("expected NAME=URL_OR_PATH, got '{}'", value)),
    }
}
