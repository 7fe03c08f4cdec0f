use std::cell::Cell;

thread_local! {
    static ALLOCATIONS: Cell<u64> = const { Cell::new(0) };
}

pub(crate) fn record_allocation() {
    ALLOCATIONS.with(|c| c.set(c.get() + 1));
}

/// Number of buffer allocations this crate has performed on the calling thread.
///
/// Zero-copy paths leave the counter untouched, which makes aliasing
/// observable from tests and diagnostics.
pub fn thread_allocation_count() -> u64 {
    ALLOCATIONS.with(|c| c.get())
}
