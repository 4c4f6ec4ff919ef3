use crossbeam_channel::{bounded, Sender};
use std::sync::Arc;
use std::thread;

/// Fixed set of worker threads draining a bounded job queue.
pub(crate) struct WorkerPool<T: Send + 'static> {
    handles: Vec<thread::JoinHandle<usize>>,
    tx: Sender<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub(crate) fn new<F>(num_threads: usize, work: F) -> std::io::Result<Self>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let num_threads = num_threads.max(1);
        let (tx, rx) = bounded::<T>(num_threads * 2);
        let work = Arc::new(work);
        let mut handles = Vec::with_capacity(num_threads);

        for idx in 0..num_threads {
            let rx = rx.clone();
            let work = Arc::clone(&work);
            let handle = thread::Builder::new()
                .name(format!("skew-worker-{}", idx))
                .spawn(move || {
                    let mut handled = 0;
                    while let Ok(job) = rx.recv() {
                        work(job);
                        handled += 1;
                    }
                    handled
                })?;
            handles.push(handle);
        }

        Ok(WorkerPool { handles, tx })
    }

    /// Blocks while the queue is full, which bounds work in flight.
    pub(crate) fn send(&self, job: T) -> Result<(), T> {
        self.tx.send(job).map_err(|e| e.into_inner())
    }

    /// Closes the queue and waits for the workers to drain it.
    pub(crate) fn finish(self) -> usize {
        drop(self.tx);

        let mut handled = 0;
        for handle in self.handles {
            match handle.join() {
                Ok(count) => handled += count,
                Err(_) => log::error!("Batch worker panicked"),
            }
        }
        handled
    }
}
