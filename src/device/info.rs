use crate::dtype::DataType;

/// Static description of a compute device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: usize,
    pub name: String,
    pub memory_total: u64,
    pub compute_units: usize,
    pub preferred_vector_width_bytes: usize,
}

impl DeviceInfo {
    /// Elements of `data_type` one work item handles per vector.
    pub fn preferred_vector_width(&self, data_type: DataType) -> usize {
        (self.preferred_vector_width_bytes / data_type.size_in_bytes()).max(1)
    }
}
