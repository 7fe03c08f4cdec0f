use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::device::Event;
use crate::dtype::Element;
use crate::utils::checked::byte_len;
use crate::utils::error::DalError;

use super::allocation::{Allocation, Location, Release};

/// Pointer into an allocation, tagged with the access it grants.
#[derive(Clone, Copy, Debug)]
enum DataPtr {
    Mutable(NonNull<u8>),
    Immutable(NonNull<u8>),
}

impl DataPtr {
    fn raw(self) -> NonNull<u8> {
        match self {
            DataPtr::Mutable(p) | DataPtr::Immutable(p) => p,
        }
    }
}

/// Reference-counted typed buffer with copy-on-write mutation.
///
/// Clones share memory. Reads always succeed; writes require the sole strong
/// reference to a writable allocation, which [`Array::unique`] establishes by
/// deep-copying when needed.
pub struct Array<T: Element> {
    alloc: Arc<Allocation>,
    data: DataPtr,
    count: usize,
    capacity: usize,
    owning: bool,
    _marker: PhantomData<T>,
}

impl<T: Element> Array<T> {
    pub fn empty() -> Self {
        let alloc = Arc::new(Allocation::empty());
        let ptr = alloc.ptr();
        Self {
            alloc,
            data: DataPtr::Mutable(ptr),
            count: 0,
            capacity: 0,
            owning: true,
            _marker: PhantomData,
        }
    }

    pub fn zeros(count: usize) -> Result<Self, DalError> {
        let alloc = Allocation::zeroed(byte_len(count, size_of::<T>()), Location::Host, None)?;
        Ok(Self::from_allocation(Arc::new(alloc), count))
    }

    pub fn full(count: usize, value: T) -> Result<Self, DalError> {
        let mut array = Self::zeros(count)?;
        array.get_mutable_data().fill(value);
        Ok(array)
    }

    /// Zero-filled array placed where `ctx` allocates (host or device memory).
    pub fn zeros_on(ctx: &ExecutionContext, count: usize) -> Result<Self, DalError> {
        let alloc = ctx.allocate(byte_len(count, size_of::<T>()))?;
        Ok(Self::from_allocation(Arc::new(alloc), count))
    }

    pub fn full_on(ctx: &ExecutionContext, count: usize, value: T) -> Result<Self, DalError> {
        let mut array = Self::zeros_on(ctx, count)?;
        match ctx {
            ExecutionContext::Host(_) => array.get_mutable_data().fill(value),
            ExecutionContext::Device(device) => {
                device.fill(&mut array, value)?;
            }
        }
        Ok(array)
    }

    /// Takes ownership of `values` without copying.
    pub fn from_vec(values: Vec<T>) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::empty();
        }
        let mut values = std::mem::ManuallyDrop::new(values);
        let (ptr, len, cap) = (values.as_mut_ptr(), values.len(), values.capacity());
        let release = Release::Deleter(Box::new(move |p: NonNull<u8>| unsafe {
            drop(Vec::from_raw_parts(p.as_ptr() as *mut T, len, cap));
        }));
        // SAFETY: the Vec's buffer stays valid until the deleter rebuilds and drops it.
        let alloc = unsafe {
            Allocation::foreign(
                NonNull::new_unchecked(ptr as *mut u8),
                byte_len(count, size_of::<T>()),
                release,
            )
        };
        Self::from_allocation(Arc::new(alloc), count)
    }

    pub fn from_slice(values: &[T]) -> Result<Self, DalError> {
        let mut array = Self::zeros(values.len())?;
        array.get_mutable_data().copy_from_slice(values);
        Ok(array)
    }

    /// Non-owning, read-only view of foreign memory.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `count` elements for as long as any
    /// clone of the returned array lives.
    pub unsafe fn wrap(ptr: *const T, count: usize) -> Self {
        let alloc = unsafe { Self::foreign_allocation(ptr as *mut T, count, Release::Borrowed) };
        let data = DataPtr::Immutable(alloc.ptr());
        Self::from_parts(alloc, data, count, false)
    }

    /// Non-owning, writable view of foreign memory.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `count` elements for as long
    /// as any clone of the returned array lives, and nothing else may access
    /// the memory during that time.
    pub unsafe fn wrap_mut(ptr: *mut T, count: usize) -> Self {
        let alloc = unsafe { Self::foreign_allocation(ptr, count, Release::Borrowed) };
        let data = DataPtr::Mutable(alloc.ptr());
        Self::from_parts(alloc, data, count, false)
    }

    /// Owning wrapper of foreign memory; `deleter` runs exactly once, when the
    /// last reference drops.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `count` elements until
    /// `deleter` is called, and nothing else may access it meanwhile.
    pub unsafe fn wrap_with_deleter<F>(ptr: *mut T, count: usize, deleter: F) -> Self
    where
        F: FnOnce(*mut T) + Send + Sync + 'static,
    {
        let release = Release::Deleter(Box::new(move |p: NonNull<u8>| deleter(p.as_ptr() as *mut T)));
        let alloc = unsafe { Self::foreign_allocation(ptr, count, release) };
        let data = DataPtr::Mutable(alloc.ptr());
        Self::from_parts(alloc, data, count, true)
    }

    unsafe fn foreign_allocation(ptr: *mut T, count: usize, release: Release) -> Arc<Allocation> {
        let size = byte_len(count, size_of::<T>());
        let ptr = match NonNull::new(ptr as *mut u8) {
            Some(ptr) => ptr,
            None if count == 0 => NonNull::<u64>::dangling().cast(),
            None => panic!("Null pointer wrapped with non-zero count {}", count),
        };
        assert!(
            ptr.as_ptr().align_offset(align_of::<T>()) == 0,
            "Wrapped pointer is not aligned for {:?}",
            T::DATA_TYPE
        );
        Arc::new(unsafe { Allocation::foreign(ptr, size, release) })
    }

    pub(crate) fn from_allocation(alloc: Arc<Allocation>, count: usize) -> Self {
        let data = DataPtr::Mutable(alloc.ptr());
        Self::from_parts(alloc, data, count, true)
    }

    fn from_parts(alloc: Arc<Allocation>, data: DataPtr, count: usize, owning: bool) -> Self {
        Self {
            alloc,
            data,
            count,
            capacity: count,
            owning,
            _marker: PhantomData,
        }
    }

    pub fn get_count(&self) -> usize {
        self.count
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the visible elements in bytes.
    pub fn get_size(&self) -> usize {
        self.count * size_of::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_owning(&self) -> bool {
        self.owning
    }

    pub fn location(&self) -> Location {
        self.alloc.location()
    }

    pub fn as_ptr(&self) -> *const T {
        self.data.raw().as_ptr() as *const T
    }

    /// True when [`get_mutable_data`](Self::get_mutable_data) would succeed.
    pub fn has_mutable_data(&self) -> bool {
        matches!(self.data, DataPtr::Mutable(_))
            && Arc::strong_count(&self.alloc) == 1
            && Arc::weak_count(&self.alloc) == 0
    }

    pub fn get_data(&self) -> &[T] {
        if self.count == 0 {
            return &[];
        }
        self.alloc.wait_ready();
        // SAFETY: the allocation covers `count` elements starting at `data`, and
        // writers must hold the only reference, which this borrow rules out.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.count) }
    }

    /// Write access. Panics unless this array holds the sole reference to
    /// writable memory; call [`unique`](Self::unique) first.
    #[track_caller]
    pub fn get_mutable_data(&mut self) -> &mut [T] {
        assert!(
            self.has_mutable_data(),
            "Array has no mutable data: the view is read-only or shared, call unique() first"
        );
        if self.count == 0 {
            return &mut [];
        }
        self.alloc.wait_ready();
        // SAFETY: exclusivity checked above.
        unsafe { std::slice::from_raw_parts_mut(self.data.raw().as_ptr() as *mut T, self.count) }
    }

    /// Makes this array the exclusive owner of writable memory, copying the
    /// visible elements when the memory is shared or read-only. Idempotent.
    pub fn unique(&mut self) -> Result<&mut Self, DalError> {
        if self.has_mutable_data() {
            return Ok(self);
        }
        let copy = self.alloc.zeroed_like(self.get_size())?;
        if self.count > 0 {
            self.alloc.wait_ready();
            // SAFETY: both regions are valid for get_size() bytes and distinct.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.data.raw().as_ptr(),
                    copy.ptr().as_ptr(),
                    self.get_size(),
                );
            }
        }
        let count = self.count;
        *self = Self::from_allocation(Arc::new(copy), count);
        Ok(self)
    }

    /// Changes the element count. Shrinking keeps the capacity; growing past it
    /// reallocates and preserves the existing elements. New elements are zero.
    pub fn resize(&mut self, count: usize) -> Result<(), DalError> {
        if !self.owning {
            return Err(DalError::InvalidOperation(
                "Cannot resize a non-owning array".to_string(),
            ));
        }
        if count <= self.capacity {
            if count > self.count && !self.has_mutable_data() {
                // Elements past the old count are exposed; they must belong to us alone.
                self.unique()?;
                return self.resize(count);
            }
            let old = self.count;
            self.count = count;
            if count > old {
                self.get_mutable_data()[old..].fill(T::zeroed());
            }
            return Ok(());
        }

        let grown = self.alloc.zeroed_like(byte_len(count, size_of::<T>()))?;
        if self.count > 0 {
            self.alloc.wait_ready();
            // SAFETY: the new block is larger than the old visible region.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.data.raw().as_ptr(),
                    grown.ptr().as_ptr(),
                    self.get_size(),
                );
            }
        }
        *self = Self::from_allocation(Arc::new(grown), count);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.get_data().to_vec()
    }

    /// Read-only, non-owning view of `count` elements starting at `offset`.
    #[track_caller]
    pub fn view(&self, offset: usize, count: usize) -> Array<T> {
        let end = offset.checked_add(count).expect("Array view range overflows");
        assert!(
            end <= self.count,
            "Array view {}..{} out of bounds for {} elements",
            offset,
            end,
            self.count
        );
        let ptr = unsafe { self.data.raw().add(offset * size_of::<T>()) };
        Self::from_parts(self.alloc.clone(), DataPtr::Immutable(ptr), count, false)
    }

    /// Read-only view of `count` elements of type `U` starting `byte_offset`
    /// bytes into this array's memory.
    #[track_caller]
    pub(crate) fn reinterpret<U: Element>(&self, byte_offset: usize, count: usize) -> Array<U> {
        let end = byte_offset + byte_len(count, size_of::<U>());
        assert!(end <= self.get_size(), "Reinterpreted view exceeds the array");
        let ptr = unsafe { self.data.raw().add(byte_offset) };
        assert!(
            ptr.as_ptr().align_offset(align_of::<U>()) == 0,
            "Reinterpreted view is misaligned for {:?}",
            U::DATA_TYPE
        );
        Array {
            alloc: self.alloc.clone(),
            data: DataPtr::Immutable(ptr),
            count,
            capacity: count,
            owning: false,
            _marker: PhantomData,
        }
    }

    /// Byte-typed alias of this array, keeping its access tag.
    pub(crate) fn into_bytes(self) -> Array<u8> {
        let count = self.get_size();
        Array {
            alloc: self.alloc,
            data: self.data,
            count,
            capacity: self.capacity * size_of::<T>(),
            owning: self.owning,
            _marker: PhantomData,
        }
    }

    pub(crate) fn raw_ptr(&self) -> *const u8 {
        self.data.raw().as_ptr()
    }

    /// Write pointer for kernels that fill this array; the caller must hold
    /// the array exclusively (see [`has_mutable_data`](Self::has_mutable_data)).
    pub(crate) fn raw_mut_ptr(&mut self) -> *mut u8 {
        assert!(
            self.has_mutable_data(),
            "Array has no mutable data: the view is read-only or shared, call unique() first"
        );
        self.data.raw().as_ptr()
    }

    pub(crate) fn set_pending(&self, event: Event) {
        self.alloc.set_pending(event);
    }

    /// Event of the last device write into this array's memory, if any.
    pub(crate) fn pending(&self) -> Option<Event> {
        self.alloc.pending()
    }

    pub(crate) fn wait_ready(&self) {
        self.alloc.wait_ready();
    }
}

// Writes go through `&mut self` on the sole reference, so sharing views
// across threads cannot race with a writer.
unsafe impl<T: Element> Send for Array<T> {}
unsafe impl<T: Element> Sync for Array<T> {}

impl<T: Element> Clone for Array<T> {
    fn clone(&self) -> Self {
        Self {
            alloc: self.alloc.clone(),
            data: self.data,
            count: self.count,
            capacity: self.capacity,
            owning: self.owning,
            _marker: PhantomData,
        }
    }
}

impl<T: Element> Default for Array<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Element> From<Vec<T>> for Array<T> {
    fn from(values: Vec<T>) -> Self {
        Self::from_vec(values)
    }
}

impl<T: Element> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("data_type", &T::DATA_TYPE)
            .field("count", &self.count)
            .field("capacity", &self.capacity)
            .field("owning", &self.owning)
            .field("location", &self.location())
            .finish()
    }
}
