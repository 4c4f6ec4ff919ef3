use crate::api::{ApiResult, SkewError};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

static STRAGGLERS: AtomicUsize = AtomicUsize::new(0);

/// Tasks that missed their deadline and whose threads have not exited yet.
pub fn abandoned_tasks() -> usize {
    STRAGGLERS.load(Ordering::SeqCst)
}

/// Runs `task` on its own thread and gives up waiting after `timeout`.
///
/// A stuck read cannot be interrupted, so on timeout the thread is left to
/// finish on its own and is counted in `abandoned_tasks` until it does.
pub(crate) fn run_with_deadline<T, F>(name: &str, timeout: Duration, task: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ApiResult<T> + Send + 'static,
{
    let (tx, rx) = bounded(1);
    let state = Arc::new(AtomicU8::new(RUNNING));
    let worker_state = Arc::clone(&state);

    let spawned = thread::Builder::new()
        .name(format!("skew-{}", name))
        .spawn(move || {
            let _ = tx.send(task());
            if worker_state
                .compare_exchange(RUNNING, FINISHED, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                STRAGGLERS.fetch_sub(1, Ordering::SeqCst);
            }
        });
    if let Err(e) = spawned {
        return Err(SkewError::InvalidInput(format!("cannot spawn task: {}", e)));
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            // Count first so a thread finishing right now never underflows.
            let stragglers = STRAGGLERS.fetch_add(1, Ordering::SeqCst) + 1;
            if state
                .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                STRAGGLERS.fetch_sub(1, Ordering::SeqCst);
                // Finished between the timeout and now; the result may be waiting.
                if let Ok(result) = rx.try_recv() {
                    return result;
                }
            } else {
                log::warn!(
                    "{} timed out after {:?}; {} abandoned task(s) still running",
                    name,
                    timeout,
                    stragglers
                );
            }
            Err(SkewError::Timeout(timeout.as_millis() as u64))
        }
        Err(RecvTimeoutError::Disconnected) => Err(SkewError::InvalidInput(
            "task ended without reporting".to_string(),
        )),
    }
}
