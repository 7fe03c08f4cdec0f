use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub enum WorkResult {
    Done,
    Panicked(Box<dyn Any + Send + 'static>),
}

#[derive(Clone)]
pub struct WorkFuture {
    state: Arc<(Mutex<Option<WorkResult>>, Condvar)>,
}

impl WorkFuture {
    pub fn new() -> Self {
        WorkFuture {
            state: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.state;
        let mut result = lock.lock().unwrap();
        while result.is_none() {
            result = cvar.wait(result).unwrap();
        }
    }

    pub fn wait_and_take(self) -> WorkResult {
        let (lock, cvar) = &*self.state;
        let mut result = lock.lock().unwrap();
        while result.is_none() {
            result = cvar.wait(result).unwrap();
        }
        result.take().unwrap()
    }

    pub fn is_complete(&self) -> bool {
        self.state.0.lock().unwrap().is_some()
    }

    pub fn complete(&self, result: WorkResult) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap() = Some(result);
        cvar.notify_all();
    }
}

impl Default for WorkFuture {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WorkItem {
    pub work: Job,
    pub future: WorkFuture,
}

pub struct WorkFutureBatch {
    pub futures: Vec<WorkFuture>,
}

impl WorkFutureBatch {
    pub fn is_complete(&self) -> bool {
        self.futures.iter().all(|f| f.is_complete())
    }

    pub fn wait(self) -> Vec<WorkResult> {
        self.futures
            .into_iter()
            .map(|future| future.wait_and_take())
            .collect()
    }
}

pub struct WorkQueue {
    queue: Mutex<VecDeque<WorkItem>>,
    items_count: AtomicUsize,
    condvar: Condvar,
    shutdown: AtomicBool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            items_count: AtomicUsize::new(0),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn submit_work_item(&self, work_item: WorkItem) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(work_item);
        self.items_count.fetch_add(1, Ordering::SeqCst);
        self.condvar.notify_one();
    }

    pub fn submit_work_batch(&self, work_items: Vec<WorkItem>) {
        let batch_size = work_items.len();
        let mut queue = self.queue.lock().unwrap();
        queue.reserve(batch_size);
        for work_item in work_items {
            queue.push_back(work_item);
        }
        self.items_count.fetch_add(batch_size, Ordering::SeqCst);
        self.condvar.notify_all();
    }

    /// Blocks until work arrives. Returns `None` once the queue is shut down.
    fn wait_and_get_next_work(&self) -> Option<WorkItem> {
        let mut queue = self.queue.lock().unwrap();
        loop {
            if let Some(item) = self.try_pop_work_item(&mut queue) {
                return Some(item);
            }
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            queue = self.condvar.wait(queue).unwrap();
        }
    }

    pub fn try_get_work(&self) -> Option<WorkItem> {
        let mut queue = self.queue.lock().unwrap();
        self.try_pop_work_item(&mut queue)
    }

    fn try_pop_work_item(&self, queue: &mut VecDeque<WorkItem>) -> Option<WorkItem> {
        if self.items_count.load(Ordering::SeqCst) > 0 {
            let item = queue.pop_front();
            if item.is_some() {
                self.items_count.fetch_sub(1, Ordering::SeqCst);
            }
            item
        } else {
            None
        }
    }

    pub fn shutdown(&self) {
        let _queue = self.queue.lock().unwrap();
        self.shutdown.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Worker {
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn new(id: usize, name: &str, work_queue: Arc<WorkQueue>) -> Worker {
        let thread = thread::Builder::new()
            .name(format!("{}-{}", name, id))
            .spawn(move || {
                while let Some(work_item) = work_queue.wait_and_get_next_work() {
                    Self::process_work(work_item);
                }
            })
            .expect("Failed to spawn worker thread");

        Worker {
            thread: Some(thread),
        }
    }

    /// Runs one item and completes its future, capturing a panic instead of
    /// unwinding through the worker loop.
    pub fn process_work(work_item: WorkItem) {
        let WorkItem { work, future } = work_item;
        let result = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(()) => WorkResult::Done,
            Err(payload) => WorkResult::Panicked(payload),
        };
        future.complete(result);
    }

    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
