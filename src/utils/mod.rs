pub mod checked;
pub mod error;
pub mod send_ptr;

pub use send_ptr::{ConstPtr, MutPtr};
