use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use super::worker::{Job, WorkFuture, WorkFutureBatch, WorkItem, WorkQueue, WorkResult, Worker};

/// Fixed-size pool of worker threads fed from one shared queue.
pub struct ThreadPool {
    work_queue: Arc<WorkQueue>,
    workers: Vec<Worker>,
}

impl ThreadPool {
    /// One worker per logical CPU.
    pub fn new() -> Self {
        Self::with_threads(default_thread_count())
    }

    pub fn with_threads(thread_count: usize) -> Self {
        Self::named(thread_count, "dal-worker")
    }

    pub fn named(thread_count: usize, name: &str) -> Self {
        let work_queue = Arc::new(WorkQueue::new());
        let workers = (0..thread_count)
            .map(|id| Worker::new(id, name, Arc::clone(&work_queue)))
            .collect();
        debug!(threads = thread_count, name, "thread pool started");
        Self {
            work_queue,
            workers,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn submit(&self, work: Job) -> WorkFuture {
        let future = WorkFuture::new();
        self.work_queue.submit_work_item(WorkItem {
            work,
            future: future.clone(),
        });
        future
    }

    pub fn submit_batch(&self, work: Vec<Job>) -> WorkFutureBatch {
        let mut futures = Vec::with_capacity(work.len());
        let items = work
            .into_iter()
            .map(|work| {
                let future = WorkFuture::new();
                futures.push(future.clone());
                WorkItem { work, future }
            })
            .collect();
        self.work_queue.submit_work_batch(items);
        WorkFutureBatch { futures }
    }

    /// Runs `f` over disjoint chunks of `0..len`, each at least `grain` long
    /// (except possibly the last), and blocks until all of them finish. The
    /// calling thread drains the queue while it waits. A panic inside `f` is
    /// re-raised here once every chunk has completed.
    pub fn parallel_for<F>(&self, len: usize, grain: usize, f: F)
    where
        F: Fn(Range<usize>) + Sync,
    {
        if len == 0 {
            return;
        }

        let chunks = chunk_ranges(len, grain, self.thread_count() + 1);
        if chunks.len() <= 1 || self.workers.is_empty() {
            f(0..len);
            return;
        }

        let f_ref: &(dyn Fn(Range<usize>) + Sync) = &f;
        // SAFETY: every job borrowing `f` is waited on below before this
        // function returns, and jobs never unwind past process_work.
        let f_static: &'static (dyn Fn(Range<usize>) + Sync) = unsafe {
            std::mem::transmute::<
                &(dyn Fn(Range<usize>) + Sync),
                &'static (dyn Fn(Range<usize>) + Sync),
            >(f_ref)
        };

        let jobs = chunks
            .into_iter()
            .map(|range| Box::new(move || f_static(range)) as Job)
            .collect();
        let batch = self.submit_batch(jobs);

        while !batch.is_complete() {
            match self.work_queue.try_get_work() {
                Some(item) => Worker::process_work(item),
                None => break,
            }
        }

        let mut first_panic = None;
        for result in batch.wait() {
            if let WorkResult::Panicked(payload) = result {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.work_queue.shutdown();
        for worker in &mut self.workers {
            worker.join();
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.thread_count())
            .finish()
    }
}

pub fn default_thread_count() -> usize {
    match sys_info::cpu_num() {
        Ok(n) if n > 0 => n as usize,
        _ => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

/// Splits `0..len` into at most `max_chunks` contiguous ranges of at least
/// `grain` items each.
fn chunk_ranges(len: usize, grain: usize, max_chunks: usize) -> Vec<Range<usize>> {
    let grain = grain.max(1);
    let chunks = len.div_ceil(grain).clamp(1, max_chunks.max(1));
    let chunk_size = len.div_ceil(chunks);
    (0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn chunks_cover_range_without_overlap() {
        for (len, grain, max) in [(1, 1, 4), (10, 3, 2), (1000, 16, 9), (7, 100, 8)] {
            let chunks = chunk_ranges(len, grain, max);
            assert!(chunks.len() <= max);
            assert_eq!(chunks.first().unwrap().start, 0);
            assert_eq!(chunks.last().unwrap().end, len);
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }

    #[test]
    fn parallel_for_visits_every_index_once() {
        let pool = ThreadPool::with_threads(4);
        let hits: Vec<AtomicUsize> = (0..5000).map(|_| AtomicUsize::new(0)).collect();
        pool.parallel_for(hits.len(), 7, |range| {
            for i in range {
                hits[i].fetch_add(1, Ordering::Relaxed);
            }
        });
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn parallel_for_without_workers_runs_inline() {
        let pool = ThreadPool::with_threads(0);
        let total = AtomicUsize::new(0);
        pool.parallel_for(100, 1, |range| {
            total.fetch_add(range.len(), Ordering::Relaxed);
        });
        assert_eq!(total.load(Ordering::Relaxed), 100);
    }

    #[test]
    #[should_panic(expected = "chunk failed")]
    fn panic_in_chunk_reaches_caller() {
        let pool = ThreadPool::with_threads(2);
        pool.parallel_for(64, 1, |range| {
            if range.contains(&40) {
                panic!("chunk failed");
            }
        });
    }

    #[test]
    fn submitted_job_completes() {
        let pool = ThreadPool::with_threads(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let future = pool.submit(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        future.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
