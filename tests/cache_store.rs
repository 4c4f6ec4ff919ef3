use gcskew_tools::sequence::{SequenceFetcher, SequenceParser};
use gcskew_tools::types::CacheKey;
use gcskew_tools::utils::{CacheStore, SkewPlotter};
use gcskew_tools::{ApiResult, PipelineStage, SkewError};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

/// Serves canned FASTA bodies in call order and counts fetches.
struct CountingFetcher {
    calls: AtomicUsize,
    bodies: Vec<&'static str>,
    delay: Duration,
}

impl CountingFetcher {
    fn new(bodies: Vec<&'static str>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            bodies,
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SequenceFetcher for CountingFetcher {
    fn fetch(&self, identifier: &str) -> ApiResult<Box<dyn Read + Send>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if identifier.starts_with("unreachable") {
            return Err(SkewError::SourceUnavailable(format!("{}: connection refused", identifier)));
        }
        let body = self.bodies[call.min(self.bodies.len() - 1)];
        Ok(Box::new(Cursor::new(body.as_bytes().to_vec())))
    }
}

/// Blocks the first fetch for `stall`, as a source that never sends data would.
struct StallingFetcher {
    calls: AtomicUsize,
    stall: Duration,
}

impl SequenceFetcher for StallingFetcher {
    fn fetch(&self, _identifier: &str) -> ApiResult<Box<dyn Read + Send>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(self.stall);
        }
        Ok(Box::new(Cursor::new(b">chr\nGGCA\n".to_vec())))
    }
}

fn store_with(dir: &Path, fetcher: Arc<dyn SequenceFetcher>) -> CacheStore {
    store_with_deadline(dir, fetcher, Duration::from_secs(30))
}

fn store_with_deadline(
    dir: &Path,
    fetcher: Arc<dyn SequenceFetcher>,
    task_timeout: Duration,
) -> CacheStore {
    CacheStore::new(
        dir,
        SequenceParser::new(1000),
        fetcher,
        Arc::new(SkewPlotter::default()),
        task_timeout,
    )
    .unwrap()
}

fn dir_entries(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn second_request_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(vec![">chr\nGGCCGGAT\n"]));
    let store = store_with(dir.path(), fetcher.clone());
    let id = "https://example.org/genomes/e_coli.fa.gz";

    let first = store.get_or_compute(id, false).unwrap();
    let second = store.get_or_compute(id, false).unwrap();

    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
    assert!(store.exists(CacheKey::of(id)));
    assert_eq!(
        first.file_name().unwrap().to_string_lossy(),
        format!("skew_{}.svg", CacheKey::of(id))
    );
    // transient download is removed once the plot is published
    assert_eq!(dir_entries(dir.path()), vec![format!("skew_{}.svg", CacheKey::of(id))]);
}

#[test]
fn concurrent_requests_populate_once() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        CountingFetcher::new(vec![">chr\nGGGGCCAT\n"]).with_delay(Duration::from_millis(300)),
    );
    let store = store_with(dir.path(), fetcher.clone());
    let barrier = Barrier::new(4);

    let paths: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    store.get_or_compute("data/shared.fa", false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    assert_eq!(fetcher.calls(), 1);
    assert!(paths.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn concurrent_waiters_share_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        CountingFetcher::new(vec![">header only\n"]).with_delay(Duration::from_millis(300)),
    );
    let store = store_with(dir.path(), fetcher.clone());
    let barrier = Barrier::new(3);

    let errors: Vec<SkewError> = thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    store.get_or_compute("data/empty.fa", false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap_err()).collect()
    });

    assert_eq!(fetcher.calls(), 1);
    for err in errors {
        assert_eq!(err.stage(), Some(PipelineStage::Parse));
        assert!(matches!(err.origin(), SkewError::DecodeError(_)));
    }
}

#[test]
fn overwrite_reruns_and_replaces_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(vec![">v1\nGGGG\n", ">v2\nCCCCCCCCAT\n"]));
    let store = store_with(dir.path(), fetcher.clone());
    let id = "data/evolving.fa";

    let path = store.get_or_compute(id, false).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let replaced = store.get_or_compute(id, true).unwrap();
    let after = fs::read_to_string(&replaced).unwrap();

    assert_eq!(path, replaced);
    assert_eq!(fetcher.calls(), 2);
    assert_ne!(before, after);
    assert!(after.trim_end().ends_with("</svg>"));
    assert!(after.contains("10 bp"));
    assert_eq!(dir_entries(dir.path()).len(), 1);
}

#[test]
fn failed_fetch_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(vec![">chr\nGC\n"]));
    let store = store_with(dir.path(), fetcher.clone());
    let id = "unreachable.example.org/genome.fa";

    let err = store.get_or_compute(id, false).unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Fetch));
    assert!(matches!(err.origin(), SkewError::SourceUnavailable(_)));
    assert!(!store.exists(CacheKey::of(id)));
    assert!(dir_entries(dir.path()).is_empty());

    // failures are not cached
    store.get_or_compute(id, false).unwrap_err();
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn failed_parse_cleans_up_download() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(vec!["", ">chr\nGGCC\n"]));
    let store = store_with(dir.path(), fetcher.clone());
    let id = "data/late.fa";

    let err = store.get_or_compute(id, false).unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Parse));
    assert!(dir_entries(dir.path()).is_empty());

    let path = store.get_or_compute(id, false).unwrap();
    assert!(path.is_file());
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn purge_removes_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(CountingFetcher::new(vec![">chr\nGGCC\n"]));
    let store = store_with(dir.path(), fetcher.clone());
    let key = CacheKey::of("data/purge.fa");

    store.get_or_compute("data/purge.fa", false).unwrap();
    assert!(store.purge(key).unwrap());
    assert!(!store.exists(key));
    assert!(!store.purge(key).unwrap());

    store.get_or_compute("data/purge.fa", false).unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn readers_never_see_a_partial_artifact_during_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        CountingFetcher::new(vec![">v1\nGGGG\n", ">v2\nCCCCCCCCAT\n"])
            .with_delay(Duration::from_millis(200)),
    );
    let store = store_with(dir.path(), fetcher.clone());
    let id = "data/live.fa";
    let path = store.get_or_compute(id, false).unwrap();
    let done = AtomicBool::new(false);

    let reads = thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut reads = 0;
            while !done.load(Ordering::SeqCst) {
                let svg = fs::read_to_string(&path).unwrap();
                assert!(svg.trim_end().ends_with("</svg>"), "torn read: {}", svg);
                reads += 1;
            }
            reads
        });

        let replaced = store.get_or_compute(id, true);
        done.store(true, Ordering::SeqCst);
        assert_eq!(replaced.unwrap(), path);
        reader.join().unwrap()
    });

    assert!(reads > 0);
    assert_eq!(fetcher.calls(), 2);
    assert!(fs::read_to_string(&path).unwrap().contains("10 bp"));
}

#[test]
fn plain_request_racing_an_overwrite_gets_a_complete_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        CountingFetcher::new(vec![">v1\nGGGG\n", ">v2\nCCCCCCCCAT\n"])
            .with_delay(Duration::from_millis(300)),
    );
    let store = store_with(dir.path(), fetcher.clone());
    let id = "data/contended.fa";
    store.get_or_compute(id, false).unwrap();
    let barrier = Barrier::new(2);

    let (overwritten, plain) = thread::scope(|scope| {
        let overwrite = scope.spawn(|| {
            barrier.wait();
            store.get_or_compute(id, true)
        });
        let plain = scope.spawn(|| {
            barrier.wait();
            thread::sleep(Duration::from_millis(50));
            let path = store.get_or_compute(id, false).unwrap();
            let svg = fs::read_to_string(&path).unwrap();
            assert!(svg.trim_end().ends_with("</svg>"));
            path
        });
        (overwrite.join().unwrap().unwrap(), plain.join().unwrap())
    });

    assert_eq!(overwritten, plain);
    // the plain request never starts a population of its own
    assert_eq!(fetcher.calls(), 2);
    assert!(fs::read_to_string(&plain).unwrap().contains("10 bp"));
}

#[test]
fn stalled_population_times_out_for_every_caller() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(StallingFetcher {
        calls: AtomicUsize::new(0),
        stall: Duration::from_secs(3),
    });
    let store = store_with_deadline(dir.path(), fetcher.clone(), Duration::from_millis(300));
    let barrier = Barrier::new(3);
    let started = Instant::now();

    let errors: Vec<SkewError> = thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    store.get_or_compute("data/stalled.fa", false)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap().unwrap_err()).collect()
    });

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(errors, vec![SkewError::Timeout(300); 3]);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    // the timed-out attempt is retired, so the next request starts afresh
    let path = store.get_or_compute("data/stalled.fa", false).unwrap();
    assert!(path.is_file());
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn unwritable_output_dir_is_a_render_error() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("plots");
    let fetcher = Arc::new(CountingFetcher::new(vec![">chr\nGGCC\n"]));
    let store = store_with(&output_dir, fetcher.clone());
    fs::remove_dir(&output_dir).unwrap();

    let err = store.get_or_compute("data/orphaned.fa", false).unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Fetch));
    assert!(matches!(err.origin(), SkewError::RenderError(_)));
}
