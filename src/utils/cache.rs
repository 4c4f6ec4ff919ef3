use crate::api::{ApiResult, PipelineStage, SkewError};
use crate::config::SkewConfig;
use crate::sequence::{SequenceFetcher, SequenceParser};
use crate::skew;
use crate::types::CacheKey;
use crate::utils::deadline::run_with_deadline;
use crate::utils::skew_plotter::ArtifactRenderer;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tempfile::{Builder, NamedTempFile};

/// One population attempt that late callers for the same key can join.
#[derive(Default)]
struct Flight {
    outcome: Mutex<Option<ApiResult<PathBuf>>>,
    landed: Condvar,
}

impl Flight {
    fn wait(&self, timeout: Duration) -> ApiResult<PathBuf> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SkewError::Timeout(timeout.as_millis() as u64));
            }
            outcome = self
                .landed
                .wait_timeout(outcome, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn land(&self, result: ApiResult<PathBuf>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
        self.landed.notify_all();
    }
}

type FlightTable = Mutex<HashMap<CacheKey, Arc<Flight>>>;

/// Retires a flight even if population unwinds, so waiters never hang.
struct FlightGuard<'a> {
    table: &'a FlightTable,
    key: CacheKey,
    flight: Arc<Flight>,
    outcome: Option<ApiResult<PathBuf>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            Err(SkewError::RenderError(format!(
                "population of {} was aborted",
                self.key
            )))
        });
        lock_table(self.table).remove(&self.key);
        self.flight.land(outcome);
    }
}

fn lock_table(table: &FlightTable) -> MutexGuard<'_, HashMap<CacheKey, Arc<Flight>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Flat content-addressable store of rendered skew artifacts.
///
/// An artifact lives at `<output_dir>/skew_<key>.<ext>`; its presence on disk
/// is the only cache signal. Population for a key is single-flight and bounded
/// by the task deadline.
pub struct CacheStore {
    populator: Arc<Populator>,
    task_timeout: Duration,
    in_flight: FlightTable,
}

// Everything a population thread needs; shared so an abandoned attempt can
// outlive the call that started it.
struct Populator {
    output_dir: PathBuf,
    parser: SequenceParser,
    fetcher: Arc<dyn SequenceFetcher>,
    renderer: Arc<dyn ArtifactRenderer>,
}

impl CacheStore {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        parser: SequenceParser,
        fetcher: Arc<dyn SequenceFetcher>,
        renderer: Arc<dyn ArtifactRenderer>,
        task_timeout: Duration,
    ) -> ApiResult<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| {
            SkewError::RenderError(format!("{}: {}", output_dir.display(), e))
        })?;

        Ok(Self {
            populator: Arc::new(Populator {
                output_dir,
                parser,
                fetcher,
                renderer,
            }),
            task_timeout,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_config(
        config: &SkewConfig,
        fetcher: Arc<dyn SequenceFetcher>,
        renderer: Arc<dyn ArtifactRenderer>,
    ) -> ApiResult<Self> {
        Self::new(
            &config.output_dir,
            SequenceParser::new(config.max_lines),
            fetcher,
            renderer,
            config.task_deadline(),
        )
    }

    pub fn key(identifier: &str) -> CacheKey {
        CacheKey::of(identifier)
    }

    pub fn output_dir(&self) -> &Path {
        &self.populator.output_dir
    }

    pub fn artifact_path(&self, key: CacheKey) -> PathBuf {
        self.populator.artifact_path(key)
    }

    pub fn exists(&self, key: CacheKey) -> bool {
        self.artifact_path(key).is_file()
    }

    /// Removes a cached artifact; returns whether one was there.
    pub fn purge(&self, key: CacheKey) -> ApiResult<bool> {
        match fs::remove_file(self.artifact_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SkewError::RenderError(e.to_string())),
        }
    }

    /// Returns the artifact for `identifier`, running fetch, parse, compute
    /// and render only on a miss or when `overwrite` is set. Concurrent callers
    /// for the same key join the in-flight attempt and share its outcome.
    ///
    /// An attempt that misses the task deadline fails with `Timeout` for every
    /// caller and is retired, so the next request starts afresh.
    pub fn get_or_compute(&self, identifier: &str, overwrite: bool) -> ApiResult<PathBuf> {
        let key = Self::key(identifier);

        let flight = {
            let mut table = lock_table(&self.in_flight);
            if let Some(flight) = table.get(&key) {
                let flight = Arc::clone(flight);
                drop(table);
                log::debug!("Joining in-flight population of {}", key);
                return flight.wait(self.task_timeout);
            }
            if !overwrite && self.exists(key) {
                log::debug!("Cache hit for {} ({})", identifier, key);
                return Ok(self.artifact_path(key));
            }
            let flight = Arc::new(Flight::default());
            table.insert(key, Arc::clone(&flight));
            flight
        };

        let mut guard = FlightGuard {
            table: &self.in_flight,
            key,
            flight,
            outcome: None,
        };
        let populator = Arc::clone(&self.populator);
        let owned = identifier.to_string();
        let result = run_with_deadline(
            &format!("populate-{}", key),
            self.task_timeout,
            move || populator.populate(&owned, key),
        );
        guard.outcome = Some(result.clone());
        result
    }
}

impl Populator {
    fn artifact_path(&self, key: CacheKey) -> PathBuf {
        self.output_dir
            .join(key.artifact_name(self.renderer.extension()))
    }

    fn populate(&self, identifier: &str, key: CacheKey) -> ApiResult<PathBuf> {
        log::info!("Generating skew plot for {} ({})", identifier, key);

        let download = self
            .spool(identifier, key)
            .map_err(|e| e.in_stage(PipelineStage::Fetch, identifier))?;

        let sequence = download
            .reopen()
            .map_err(|e| SkewError::DecodeError(e.to_string()))
            .and_then(|file| self.parser.parse(file))
            .map_err(|e| e.in_stage(PipelineStage::Parse, identifier))?;
        let skew = skew::compute(&sequence);
        log::debug!("Computed {} skew values for {}", skew.len(), identifier);

        let rendered = Builder::new()
            .prefix(&format!("skew_{}.", key))
            .suffix(".partial")
            .tempfile_in(&self.output_dir)
            .map_err(|e| SkewError::RenderError(e.to_string()))
            .and_then(|rendered| {
                self.renderer.render(&skew, None, rendered.path())?;
                Ok(rendered)
            })
            .map_err(|e| e.in_stage(PipelineStage::Render, identifier))?;

        let artifact = self.artifact_path(key);
        rendered
            .persist(&artifact)
            .map_err(|e| {
                SkewError::RenderError(format!("{}: {}", artifact.display(), e.error))
                    .in_stage(PipelineStage::Publish, identifier)
            })?;

        if let Err(e) = download.close() {
            log::warn!("Failed to remove download for {}: {}", identifier, e);
        }

        log::info!("Published {}", artifact.display());
        Ok(artifact)
    }

    // The temp file is deleted on drop, so a failed attempt leaves nothing behind.
    fn spool(&self, identifier: &str, key: CacheKey) -> ApiResult<NamedTempFile> {
        let mut stream = self.fetcher.fetch(identifier)?;
        let mut download = Builder::new()
            .prefix(&key.download_prefix())
            .tempfile_in(&self.output_dir)
            .map_err(|e| {
                SkewError::RenderError(format!("{}: {}", self.output_dir.display(), e))
            })?;
        io::copy(&mut stream, download.as_file_mut())
            .map_err(|e| SkewError::SourceUnavailable(format!("{}: {}", identifier, e)))?;
        Ok(download)
    }
}
