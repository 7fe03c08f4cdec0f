use crate::device::DeviceInfo;
use crate::isa::CpuExtension;
use crate::thread_pool::default_thread_count;
use crate::utils::error::DalError;

/// Settings for a host execution context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Worker threads; `None` means one per logical CPU.
    pub thread_count: Option<usize>,
    /// Bytes the context may allocate; `None` means unlimited.
    pub host_memory_limit: Option<u64>,
    /// Caps ISA dispatch below what the CPU supports. Never raises it.
    pub max_cpu_extension: Option<CpuExtension>,
    /// Minimum rows handed to one parallel task.
    pub row_grain: usize,
}

impl ContextConfig {
    pub fn build(self) -> Result<Self, DalError> {
        if self.row_grain == 0 {
            return Err(DalError::InvalidArgument(
                "row_grain must be at least 1".to_string(),
            ));
        }
        if self.host_memory_limit == Some(0) {
            return Err(DalError::InvalidArgument(
                "host_memory_limit must be positive".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn resolved_thread_count(&self) -> usize {
        self.thread_count.unwrap_or_else(default_thread_count)
    }

    pub fn resolved_cpu_extension(&self) -> CpuExtension {
        match self.max_cpu_extension {
            Some(cap) => cap.clamp_to_detected(),
            None => crate::isa::detected(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            thread_count: None,
            host_memory_limit: None,
            max_cpu_extension: None,
            row_grain: 16,
        }
    }
}

/// Settings for a device execution context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: usize,
    pub name: String,
    pub memory_limit: u64,
    pub compute_units: usize,
    pub preferred_vector_width_bytes: usize,
}

impl DeviceConfig {
    pub fn build(self) -> Result<Self, DalError> {
        if self.compute_units == 0 {
            return Err(DalError::InvalidArgument(
                "a device needs at least one compute unit".to_string(),
            ));
        }
        if self.preferred_vector_width_bytes == 0 {
            return Err(DalError::InvalidArgument(
                "preferred_vector_width_bytes must be positive".to_string(),
            ));
        }
        Ok(self)
    }

    /// Sizes the context after a described (for instance probed) device.
    pub fn from_info(info: &DeviceInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            memory_limit: info.memory_total,
            compute_units: info.compute_units,
            preferred_vector_width_bytes: info.preferred_vector_width_bytes,
        }
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            name: self.name.clone(),
            memory_total: self.memory_limit,
            compute_units: self.compute_units,
            preferred_vector_width_bytes: self.preferred_vector_width_bytes,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: 0,
            name: "host-emulated device".to_string(),
            memory_limit: 1 << 30,
            compute_units: default_thread_count(),
            preferred_vector_width_bytes: 16,
        }
    }
}
