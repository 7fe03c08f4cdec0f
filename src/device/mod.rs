mod info;
#[cfg(feature = "vulkan")]
mod probe;
mod queue;

pub use info::DeviceInfo;
#[cfg(feature = "vulkan")]
pub use probe::probe_devices;
pub use queue::{DeviceQueue, Event, NdRange};
