mod config;
mod execution_context;
mod global;
mod memory_tracker;

pub use config::{ContextConfig, DeviceConfig};
pub use execution_context::{DeviceContext, ExecutionContext, HostContext, Kernel};
pub use global::{default_context, set_default_context};
pub use memory_tracker::MemoryTracker;
