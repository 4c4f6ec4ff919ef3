pub mod pipeline;

pub use pipeline::Pipeline;

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Progress callback for CLI or front-end updates
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress events emitted while a batch runs
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Started { task: String, total: u64 },
    Progress { task: String, current: u64, total: u64 },
    Error { task: String, error: String },
    Completed { task: String },
}

pub type ApiResult<T> = Result<T, SkewError>;

/// Which step of a record's pipeline failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Fetch,
    Parse,
    Render,
    Publish,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Fetch => "fetch",
            PipelineStage::Parse => "parse",
            PipelineStage::Render => "render",
            PipelineStage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Errors are cloneable so single-flight waiters can share one outcome.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum SkewError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage} failed for {identifier}: {source}")]
    Pipeline {
        stage: PipelineStage,
        identifier: String,
        source: Box<SkewError>,
    },
}

impl SkewError {
    /// Wraps a stage failure, keeping the originating kind reachable via `origin`.
    pub fn in_stage(self, stage: PipelineStage, identifier: &str) -> Self {
        SkewError::Pipeline {
            stage,
            identifier: identifier.to_string(),
            source: Box::new(self),
        }
    }

    pub fn origin(&self) -> &SkewError {
        match self {
            SkewError::Pipeline { source, .. } => source.origin(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            SkewError::Pipeline { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SkewError {
    fn from(err: reqwest::Error) -> Self {
        SkewError::SourceUnavailable(err.to_string())
    }
}
