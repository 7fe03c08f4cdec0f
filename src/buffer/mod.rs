mod allocation;
mod array;
mod stats;

pub(crate) use allocation::Allocation;
pub use allocation::Location;
pub use array::Array;
pub use stats::thread_allocation_count;
