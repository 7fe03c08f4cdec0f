use thiserror::Error;

use crate::table::DataLayout;

#[derive(Error, Debug)]
pub enum DalError {
    #[error("Host memory exhausted: failed to allocate {bytes} bytes")]
    HostOutOfMemory { bytes: u64 },

    #[error(
        "Device {device} memory exhausted: requested {requested} bytes, {available} bytes available"
    )]
    DeviceOutOfMemory {
        device: usize,
        requested: u64,
        available: u64,
    },

    #[error("Unsupported layout: {0:?}")]
    UnsupportedLayout(DataLayout),

    #[error("Unsupported memory location: {0}")]
    UnsupportedLocation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Device error: {0}")]
    Device(String),

    #[cfg(feature = "vulkan")]
    #[error("Vulkan error: {0}")]
    Vulkan(String),
}

impl DalError {
    /// True for both host and device exhaustion.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            DalError::HostOutOfMemory { .. } | DalError::DeviceOutOfMemory { .. }
        )
    }

    /// Callers use this to decide on a host-only fallback.
    pub fn is_device_out_of_memory(&self) -> bool {
        matches!(self, DalError::DeviceOutOfMemory { .. })
    }
}

#[cfg(feature = "vulkan")]
impl From<vulkanalia::vk::Result> for DalError {
    fn from(r: vulkanalia::vk::Result) -> Self {
        DalError::Vulkan(format!("vk::Result: {:?}", r))
    }
}

#[cfg(feature = "vulkan")]
impl From<vulkanalia::vk::ErrorCode> for DalError {
    fn from(c: vulkanalia::vk::ErrorCode) -> Self {
        DalError::Vulkan(format!("vk::ErrorCode: {:?}", c))
    }
}
