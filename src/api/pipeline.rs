use crate::api::{ApiResult, PipelineStage};
use crate::batch::BatchDispatcher;
use crate::config::SkewConfig;
use crate::sequence::{SequenceFetcher, SequenceParser, SourceFetcher};
use crate::skew;
use crate::types::{CacheKey, SkewArray};
use crate::utils::cache::CacheStore;
use crate::utils::skew_plotter::{ArtifactRenderer, SkewPlotter};
use std::path::PathBuf;
use std::sync::Arc;

/// Entry point for front ends: one shared fetcher, cache and configuration.
pub struct Pipeline {
    config: SkewConfig,
    fetcher: Arc<dyn SequenceFetcher>,
    renderer: Arc<dyn ArtifactRenderer>,
    store: CacheStore,
}

impl Pipeline {
    pub fn from_config(config: SkewConfig) -> ApiResult<Self> {
        let fetcher: Arc<dyn SequenceFetcher> =
            Arc::new(SourceFetcher::new(config.download_deadline())?);
        Self::with_parts(config, fetcher, Arc::new(SkewPlotter::default()))
    }

    pub fn with_parts(
        config: SkewConfig,
        fetcher: Arc<dyn SequenceFetcher>,
        renderer: Arc<dyn ArtifactRenderer>,
    ) -> ApiResult<Self> {
        let config = config.normalized();
        let store = CacheStore::from_config(&config, Arc::clone(&fetcher), Arc::clone(&renderer))?;
        Ok(Self {
            config,
            fetcher,
            renderer,
            store,
        })
    }

    pub fn config(&self) -> &SkewConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn renderer(&self) -> &dyn ArtifactRenderer {
        self.renderer.as_ref()
    }

    /// Artifact path for `identifier`, from cache unless `overwrite` is set.
    pub fn request(&self, identifier: &str, overwrite: bool) -> ApiResult<PathBuf> {
        self.store.get_or_compute(identifier, overwrite)
    }

    /// Fetches and computes the skew curve directly, bypassing the artifact cache.
    pub fn skew(&self, identifier: &str) -> ApiResult<SkewArray> {
        let stream = self
            .fetcher
            .fetch(identifier)
            .map_err(|e| e.in_stage(PipelineStage::Fetch, identifier))?;
        let sequence = SequenceParser::new(self.config.max_lines)
            .parse(stream)
            .map_err(|e| e.in_stage(PipelineStage::Parse, identifier))?;
        Ok(skew::compute(sequence))
    }

    pub fn purge(&self, identifier: &str) -> ApiResult<bool> {
        self.store.purge(CacheKey::of(identifier))
    }

    pub fn dispatcher(&self) -> BatchDispatcher {
        BatchDispatcher::from_config(&self.config, Arc::clone(&self.fetcher))
    }
}
