use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::context::MemoryTracker;
use crate::device::Event;
use crate::utils::error::DalError;

use super::stats::record_allocation;

/// Alignment of every allocation this crate makes; wide enough for AVX-512 loads.
pub(crate) const ALIGNMENT: usize = 64;

/// Where a block of memory lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Host,
    Device(usize),
}

pub(crate) enum Release {
    Global(Layout),
    Deleter(Box<dyn FnOnce(NonNull<u8>) + Send + Sync>),
    Borrowed,
}

/// One contiguous memory block shared by every [`Array`](super::Array) view
/// into it. Dropped when the last view goes away.
pub(crate) struct Allocation {
    ptr: NonNull<u8>,
    size: usize,
    location: Location,
    release: Option<Release>,
    tracker: Option<Arc<MemoryTracker>>,
    pending: Mutex<Option<Event>>,
}

// The block is plain bytes; synchronisation of element access is the job of
// the copy-on-write discipline in Array.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    pub(crate) fn empty() -> Self {
        Self {
            ptr: NonNull::<u64>::dangling().cast(),
            size: 0,
            location: Location::Host,
            release: Some(Release::Borrowed),
            tracker: None,
            pending: Mutex::new(None),
        }
    }

    /// Allocates `size` zeroed bytes, charging `tracker` first when present.
    pub(crate) fn zeroed(
        size: usize,
        location: Location,
        tracker: Option<Arc<MemoryTracker>>,
    ) -> Result<Self, DalError> {
        if let Some(tracker) = &tracker {
            tracker.allocate(size as u64)?;
        }

        if size == 0 {
            let mut empty = Self::empty();
            empty.location = location;
            empty.tracker = tracker;
            return Ok(empty);
        }

        let out_of_memory = |tracker: &Option<Arc<MemoryTracker>>| {
            if let Some(tracker) = tracker {
                tracker.deallocate(size as u64);
            }
            match location {
                Location::Host => DalError::HostOutOfMemory { bytes: size as u64 },
                Location::Device(device) => DalError::DeviceOutOfMemory {
                    device,
                    requested: size as u64,
                    available: tracker.as_ref().map(|t| t.get_available()).unwrap_or(0),
                },
            }
        };

        let layout = match Layout::from_size_align(size, ALIGNMENT) {
            Ok(layout) => layout,
            Err(_) => return Err(out_of_memory(&tracker)),
        };

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => return Err(out_of_memory(&tracker)),
        };

        record_allocation();
        trace!(bytes = size, ?location, "allocated buffer");

        Ok(Self {
            ptr,
            size,
            location,
            release: Some(Release::Global(layout)),
            tracker,
            pending: Mutex::new(None),
        })
    }

    /// Allocation of the same kind (location and tracker) as `self`.
    pub(crate) fn zeroed_like(&self, size: usize) -> Result<Self, DalError> {
        Self::zeroed(size, self.location, self.tracker.clone())
    }

    /// # Safety
    /// `ptr` must be valid for `size` bytes until `release` runs (or, for
    /// [`Release::Borrowed`], for as long as any view of this allocation lives).
    pub(crate) unsafe fn foreign(ptr: NonNull<u8>, size: usize, release: Release) -> Self {
        Self {
            ptr,
            size,
            location: Location::Host,
            release: Some(release),
            tracker: None,
            pending: Mutex::new(None),
        }
    }

    pub(crate) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(crate) fn location(&self) -> Location {
        self.location
    }

    /// Records the event a device kernel writing into this block will signal.
    pub(crate) fn set_pending(&self, event: Event) {
        *self.pending.lock().unwrap() = Some(event);
    }

    pub(crate) fn pending(&self) -> Option<Event> {
        self.pending.lock().unwrap().clone()
    }

    /// Blocks until the last recorded device write has landed.
    pub(crate) fn wait_ready(&self) {
        let pending = self.pending.lock().unwrap().take();
        if let Some(event) = pending {
            event.wait();
        }
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.wait_ready();

        match self.release.take() {
            Some(Release::Global(layout)) => unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) },
            Some(Release::Deleter(deleter)) => deleter(self.ptr),
            Some(Release::Borrowed) | None => {}
        }

        if let Some(tracker) = &self.tracker {
            tracker.deallocate(self.size as u64);
        }
    }
}
