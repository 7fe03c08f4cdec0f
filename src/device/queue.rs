use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use tracing::{trace, warn};

use crate::thread_pool::ThreadPool;
use crate::utils::error::DalError;

#[derive(Clone, Debug, PartialEq, Eq)]
enum EventState {
    Pending,
    Complete,
    Failed(String),
}

/// Completion signal of one device submission.
#[derive(Clone)]
pub struct Event {
    state: Arc<(Mutex<EventState>, Condvar)>,
}

impl Event {
    fn pending() -> Self {
        Self {
            state: Arc::new((Mutex::new(EventState::Pending), Condvar::new())),
        }
    }

    /// An event that is already signalled.
    pub fn completed() -> Self {
        Self {
            state: Arc::new((Mutex::new(EventState::Complete), Condvar::new())),
        }
    }

    fn signal(&self, state: EventState) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap() = state;
        cvar.notify_all();
    }

    pub fn is_complete(&self) -> bool {
        *self.state.0.lock().unwrap() != EventState::Pending
    }

    /// Blocks until the submission finished, successfully or not.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        while *state == EventState::Pending {
            state = cvar.wait(state).unwrap();
        }
    }

    /// Blocks, then reports whether the submission's kernel panicked.
    pub fn wait_result(&self) -> Result<(), DalError> {
        self.wait();
        match &*self.state.0.lock().unwrap() {
            EventState::Failed(msg) => Err(DalError::Device(msg.clone())),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("complete", &self.is_complete())
            .finish()
    }
}

struct Submission {
    deps: Vec<Event>,
    task: Box<dyn FnOnce() + Send + 'static>,
    event: Event,
}

/// Launch shape: one work item per `(row, chunk)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NdRange {
    pub rows: usize,
    pub chunks: usize,
}

impl NdRange {
    pub fn work_items(&self) -> usize {
        self.rows * self.chunks
    }
}

/// In-order asynchronous queue. Submissions return immediately with an
/// [`Event`]; a submission thread waits on each one's dependencies and runs
/// its work items on the device's compute units.
pub struct DeviceQueue {
    device: usize,
    sender: Mutex<Option<Sender<Submission>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    compute_units: Arc<ThreadPool>,
    last: Mutex<Event>,
}

impl DeviceQueue {
    pub fn new(device: usize, compute_units: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Submission>();
        let thread = thread::Builder::new()
            .name(format!("dal-device-{}", device))
            .spawn(move || {
                for submission in receiver {
                    let failed_dep = submission.deps.iter().find_map(|dep| dep.wait_result().err());
                    let state = match failed_dep {
                        Some(err) => EventState::Failed(format!("dependency failed: {}", err)),
                        None => match panic::catch_unwind(AssertUnwindSafe(submission.task)) {
                            Ok(()) => EventState::Complete,
                            Err(payload) => EventState::Failed(panic_message(&*payload)),
                        },
                    };
                    if let EventState::Failed(msg) = &state {
                        warn!(device, error = msg.as_str(), "device submission failed");
                    }
                    submission.event.signal(state);
                }
            })
            .expect("Failed to spawn device queue thread");

        Self {
            device,
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            compute_units: Arc::new(ThreadPool::named(compute_units, "dal-device-cu")),
            last: Mutex::new(Event::completed()),
        }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn compute_units(&self) -> usize {
        self.compute_units.thread_count()
    }

    /// Queues `task` to run after every event in `deps` has signalled.
    pub fn submit<F>(&self, deps: &[Event], task: F) -> Result<Event, DalError>
    where
        F: FnOnce() + Send + 'static,
    {
        let event = Event::pending();
        let submission = Submission {
            deps: deps.to_vec(),
            task: Box::new(task),
            event: event.clone(),
        };

        let sender = self.sender.lock().unwrap();
        let sender = sender
            .as_ref()
            .ok_or_else(|| DalError::Device("device queue is shut down".to_string()))?;
        sender
            .send(submission)
            .map_err(|_| DalError::Device("device queue thread has exited".to_string()))?;

        *self.last.lock().unwrap() = event.clone();
        trace!(device = self.device, deps = deps.len(), "device submission queued");
        Ok(event)
    }

    /// Queues a kernel executed once per work item of `range`.
    pub fn launch<K>(&self, range: NdRange, deps: &[Event], kernel: K) -> Result<Event, DalError>
    where
        K: Fn(usize, usize) + Send + Sync + 'static,
    {
        let units = Arc::clone(&self.compute_units);
        self.submit(deps, move || {
            let chunks = range.chunks.max(1);
            units.parallel_for(range.work_items(), 1, |items| {
                for item in items {
                    kernel(item / chunks, item % chunks);
                }
            });
        })
    }

    /// Blocks until everything submitted so far has finished.
    pub fn wait_all(&self) {
        let last = self.last.lock().unwrap().clone();
        last.wait();
    }
}

impl Drop for DeviceQueue {
    fn drop(&mut self) {
        // Closing the channel lets the submission thread drain and exit.
        self.sender.lock().unwrap().take();
        if let Some(thread) = self.thread.lock().unwrap().take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for DeviceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceQueue")
            .field("device", &self.device)
            .field("compute_units", &self.compute_units())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "device kernel panicked".to_string()
    }
}
