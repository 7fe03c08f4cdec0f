// Raw pointers handed to worker threads. Every task that receives one owns a
// disjoint byte range, so the wrappers may cross threads.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConstPtr(pub *const u8);
unsafe impl Send for ConstPtr {}
unsafe impl Sync for ConstPtr {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MutPtr(pub *mut u8);
unsafe impl Send for MutPtr {}
unsafe impl Sync for MutPtr {}

impl ConstPtr {
    /// Closures must call this rather than read `.0`, which would capture the
    /// bare pointer instead of the wrapper.
    pub fn get(self) -> *const u8 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// # Safety
    /// The offset must stay inside the allocation the pointer came from.
    pub unsafe fn byte_add(self, bytes: usize) -> Self {
        ConstPtr(unsafe { self.0.add(bytes) })
    }
}

impl MutPtr {
    pub fn get(self) -> *mut u8 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// # Safety
    /// The offset must stay inside the allocation the pointer came from.
    pub unsafe fn byte_add(self, bytes: usize) -> Self {
        MutPtr(unsafe { self.0.add(bytes) })
    }
}
