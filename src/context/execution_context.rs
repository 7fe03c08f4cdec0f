use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::buffer::{Allocation, Array, Location};
use crate::device::{DeviceInfo, DeviceQueue, Event, NdRange};
use crate::dtype::Element;
use crate::isa::CpuExtension;
use crate::thread_pool::ThreadPool;
use crate::utils::MutPtr;
use crate::utils::error::DalError;

use super::config::{ContextConfig, DeviceConfig};
use super::memory_tracker::MemoryTracker;

/// Elements of one device fill work item, in vectors.
const FILL_VECTORS_PER_ITEM: usize = 64;

/// A unit of work with a host implementation and, optionally, a device one.
pub trait Kernel: Send + Sync {
    fn name(&self) -> &str;

    fn run_host(&self, ctx: &HostContext) -> Result<(), DalError>;

    /// Enqueues the device implementation after `deps` and returns its event.
    fn run_device(&self, ctx: &DeviceContext, deps: &[Event]) -> Result<Event, DalError> {
        let _ = (ctx, deps);
        Err(DalError::UnsupportedLocation(format!(
            "{} has no device implementation",
            self.name()
        )))
    }
}

struct HostInner {
    pool: ThreadPool,
    extension: CpuExtension,
    memory: Arc<MemoryTracker>,
    row_grain: usize,
}

/// CPU execution: a worker pool plus the ISA level kernels dispatch on.
#[derive(Clone)]
pub struct HostContext {
    inner: Arc<HostInner>,
}

impl HostContext {
    /// `config` is expected to have passed [`ContextConfig::build`].
    pub fn new(config: &ContextConfig) -> Self {
        let threads = config.resolved_thread_count();
        let extension = config.resolved_cpu_extension();
        let memory = match config.host_memory_limit {
            Some(limit) => MemoryTracker::new(Location::Host, limit),
            None => MemoryTracker::unlimited(Location::Host),
        };
        debug!(
            threads,
            extension = extension.name(),
            row_grain = config.row_grain,
            "host context created"
        );
        Self {
            inner: Arc::new(HostInner {
                // The calling thread takes part in every parallel_for.
                pool: ThreadPool::with_threads(threads.saturating_sub(1)),
                extension,
                memory: Arc::new(memory),
                row_grain: config.row_grain,
            }),
        }
    }

    pub fn pool(&self) -> &ThreadPool {
        &self.inner.pool
    }

    /// Threads that run a parallel loop, the caller included.
    pub fn thread_count(&self) -> usize {
        self.inner.pool.thread_count() + 1
    }

    pub fn cpu_extension(&self) -> CpuExtension {
        self.inner.extension
    }

    pub fn memory(&self) -> &Arc<MemoryTracker> {
        &self.inner.memory
    }

    pub fn row_grain(&self) -> usize {
        self.inner.row_grain
    }

    pub(crate) fn allocate(&self, bytes: usize) -> Result<Allocation, DalError> {
        Allocation::zeroed(bytes, Location::Host, Some(Arc::clone(&self.inner.memory)))
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("threads", &self.thread_count())
            .field("extension", &self.inner.extension)
            .field("row_grain", &self.inner.row_grain)
            .finish()
    }
}

struct DeviceInner {
    info: DeviceInfo,
    queue: DeviceQueue,
    memory: Arc<MemoryTracker>,
}

/// Execution on one device through its in-order queue. Device memory is
/// charged against the device's own budget, separate from the host's.
#[derive(Clone)]
pub struct DeviceContext {
    inner: Arc<DeviceInner>,
}

impl DeviceContext {
    /// `config` is expected to have passed [`DeviceConfig::build`].
    pub fn new(config: &DeviceConfig) -> Self {
        let info = config.info();
        debug!(
            device = info.id,
            name = info.name.as_str(),
            memory = info.memory_total,
            compute_units = info.compute_units,
            "device context created"
        );
        Self {
            inner: Arc::new(DeviceInner {
                queue: DeviceQueue::new(info.id, info.compute_units),
                memory: Arc::new(MemoryTracker::new(
                    Location::Device(info.id),
                    info.memory_total,
                )),
                info,
            }),
        }
    }

    pub fn id(&self) -> usize {
        self.inner.info.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn queue(&self) -> &DeviceQueue {
        &self.inner.queue
    }

    pub fn memory(&self) -> &Arc<MemoryTracker> {
        &self.inner.memory
    }

    /// Blocks until every submission made through this context has finished.
    pub fn wait(&self) {
        self.inner.queue.wait_all();
    }

    /// Allocates in queue order and waits for the allocation to complete, so
    /// the returned block is ready for use.
    pub(crate) fn allocate(&self, bytes: usize) -> Result<Allocation, DalError> {
        let slot = Arc::new(Mutex::new(None));
        let result = Arc::clone(&slot);
        let location = Location::Device(self.id());
        let memory = Arc::clone(&self.inner.memory);
        self.inner
            .queue
            .submit(&[], move || {
                *result.lock().unwrap() = Some(Allocation::zeroed(bytes, location, Some(memory)));
            })?
            .wait_result()?;

        let allocation = slot.lock().unwrap().take();
        allocation.unwrap_or_else(|| Err(DalError::Device("allocation was not performed".to_string())))
    }

    /// Enqueues a kernel writing `value` into every element of `array`. The
    /// launch waits for earlier device writes to `array`, and the array keeps
    /// the returned event, so its memory outlives the kernel.
    pub fn fill<T: Element>(&self, array: &mut Array<T>, value: T) -> Result<Event, DalError> {
        let count = array.get_count();
        let deps: Vec<Event> = array.pending().into_iter().collect();
        let dst = MutPtr(array.raw_mut_ptr());
        let per_item = self.inner.info.preferred_vector_width(T::DATA_TYPE) * FILL_VECTORS_PER_ITEM;
        let range = NdRange {
            rows: 1,
            chunks: count.div_ceil(per_item),
        };
        trace!(device = self.id(), count, items = range.work_items(), "fill enqueued");

        let event = self.inner.queue.launch(range, &deps, move |_, chunk| {
            let start = chunk * per_item;
            let end = (start + per_item).min(count);
            // SAFETY: work items cover disjoint element ranges of the array,
            // whose allocation waits for the event before it is released.
            let items = unsafe {
                std::slice::from_raw_parts_mut((dst.get() as *mut T).add(start), end - start)
            };
            items.fill(value);
        })?;
        array.set_pending(event.clone());
        Ok(event)
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("info", &self.inner.info)
            .field("memory", &self.inner.memory)
            .finish()
    }
}

/// Where operations run. Cloning shares the underlying pool or queue.
#[derive(Clone, Debug)]
pub enum ExecutionContext {
    Host(HostContext),
    Device(DeviceContext),
}

impl ExecutionContext {
    pub fn host() -> Self {
        ExecutionContext::Host(HostContext::new(&ContextConfig::default()))
    }

    pub fn host_with(config: ContextConfig) -> Result<Self, DalError> {
        Ok(ExecutionContext::Host(HostContext::new(&config.build()?)))
    }

    pub fn device(config: DeviceConfig) -> Result<Self, DalError> {
        Ok(ExecutionContext::Device(DeviceContext::new(&config.build()?)))
    }

    pub fn is_device(&self) -> bool {
        matches!(self, ExecutionContext::Device(_))
    }

    /// Where arrays allocated through this context live.
    pub fn location(&self) -> Location {
        match self {
            ExecutionContext::Host(_) => Location::Host,
            ExecutionContext::Device(device) => Location::Device(device.id()),
        }
    }

    pub(crate) fn allocate(&self, bytes: usize) -> Result<Allocation, DalError> {
        match self {
            ExecutionContext::Host(host) => host.allocate(bytes),
            ExecutionContext::Device(device) => device.allocate(bytes),
        }
    }

    /// Runs `kernel` and blocks until its effects are visible.
    pub fn run<K: Kernel + ?Sized>(&self, kernel: &K) -> Result<(), DalError> {
        trace!(kernel = kernel.name(), device = self.is_device(), "running kernel");
        match self {
            ExecutionContext::Host(host) => kernel.run_host(host),
            ExecutionContext::Device(device) => kernel.run_device(device, &[])?.wait_result(),
        }
    }

    /// Starts `kernel` after `deps` without waiting for it. Host kernels run
    /// to completion before this returns and yield an already-signalled event.
    pub fn submit<K: Kernel + ?Sized>(&self, kernel: &K, deps: &[Event]) -> Result<Event, DalError> {
        match self {
            ExecutionContext::Host(host) => {
                for dep in deps {
                    dep.wait_result()?;
                }
                kernel.run_host(host)?;
                Ok(Event::completed())
            }
            ExecutionContext::Device(device) => kernel.run_device(device, deps),
        }
    }

    /// Blocks until all outstanding work on this context has finished.
    pub fn wait(&self) {
        if let ExecutionContext::Device(device) = self {
            device.wait();
        }
    }
}

impl From<HostContext> for ExecutionContext {
    fn from(ctx: HostContext) -> Self {
        ExecutionContext::Host(ctx)
    }
}

impl From<DeviceContext> for ExecutionContext {
    fn from(ctx: DeviceContext) -> Self {
        ExecutionContext::Device(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        hits: AtomicUsize,
    }

    impl Kernel for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn run_host(&self, _ctx: &HostContext) -> Result<(), DalError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn small_device(memory_limit: u64) -> ExecutionContext {
        ExecutionContext::device(DeviceConfig {
            id: 5,
            memory_limit,
            compute_units: 2,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn host_only_kernel_is_unsupported_on_device() {
        let kernel = Counting {
            hits: AtomicUsize::new(0),
        };
        ExecutionContext::host().run(&kernel).unwrap();
        assert_eq!(kernel.hits.load(Ordering::SeqCst), 1);

        let err = small_device(1 << 20).run(&kernel).unwrap_err();
        assert!(matches!(err, DalError::UnsupportedLocation(_)));
    }

    #[test]
    fn device_allocation_is_charged_and_released() {
        let ctx = small_device(1024);
        let ExecutionContext::Device(device) = &ctx else {
            unreachable!()
        };
        let array = Array::<f64>::zeros_on(&ctx, 64).unwrap();
        assert_eq!(array.location(), Location::Device(5));
        assert_eq!(device.memory().get_current(), 512);
        drop(array);
        assert_eq!(device.memory().get_current(), 0);
    }

    #[test]
    fn device_out_of_memory_is_distinct_from_host() {
        let ctx = small_device(100);
        let err = Array::<u8>::zeros_on(&ctx, 101).unwrap_err();
        assert!(err.is_device_out_of_memory());
    }

    #[test]
    fn device_fill_is_visible_after_read() {
        let ctx = small_device(1 << 20);
        let array = Array::full_on(&ctx, 1000, 7i16).unwrap();
        assert!(array.get_data().iter().all(|&v| v == 7));
    }

    #[test]
    fn dropping_array_waits_for_queued_fill() {
        let ctx = small_device(1 << 20);
        let ExecutionContext::Device(device) = &ctx else {
            unreachable!()
        };
        device
            .queue()
            .submit(&[], || std::thread::sleep(std::time::Duration::from_millis(200)))
            .unwrap();

        let filled_at_release = Arc::new(AtomicUsize::new(usize::MAX));
        let seen = Arc::clone(&filled_at_release);
        let values = Box::leak(vec![0u32; 4096].into_boxed_slice());
        let mut array = unsafe {
            Array::wrap_with_deleter(values.as_mut_ptr(), 4096, move |p| {
                let values = Box::from_raw(std::ptr::slice_from_raw_parts_mut(p, 4096));
                seen.store(values.iter().filter(|&&v| v == 7).count(), Ordering::SeqCst);
            })
        };

        let event = device.fill(&mut array, 7u32).unwrap();
        assert!(!event.is_complete());
        drop(array);
        assert!(event.is_complete());
        assert_eq!(filled_at_release.load(Ordering::SeqCst), 4096);
    }

    #[test]
    fn host_memory_limit_is_enforced() {
        let ctx = ExecutionContext::host_with(ContextConfig {
            thread_count: Some(1),
            host_memory_limit: Some(64),
            ..Default::default()
        })
        .unwrap();
        assert!(Array::<u8>::zeros_on(&ctx, 64).is_ok());
        let err = Array::<u8>::zeros_on(&ctx, 65).unwrap_err();
        assert!(matches!(err, DalError::HostOutOfMemory { bytes: 65 }));
    }
}
