use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::Location;
use crate::utils::error::DalError;

/// Byte budget for one memory space.
///
/// Updates need no `&mut`; a reservation either fits entirely or is refused,
/// so concurrent allocations can never push usage past the maximum.
pub struct MemoryTracker {
    location: Location,
    maximum: u64,
    current: AtomicU64,
}

impl MemoryTracker {
    pub fn new(location: Location, maximum: u64) -> Self {
        Self {
            location,
            maximum,
            current: AtomicU64::new(0),
        }
    }

    pub fn unlimited(location: Location) -> Self {
        Self::new(location, u64::MAX)
    }

    pub fn allocate(&self, size: u64) -> Result<(), DalError> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(size)
                    .filter(|&total| total <= self.maximum)
            })
            .map(|_| ())
            .map_err(|current| match self.location {
                Location::Host => DalError::HostOutOfMemory { bytes: size },
                Location::Device(device) => DalError::DeviceOutOfMemory {
                    device,
                    requested: size,
                    available: self.maximum.saturating_sub(current),
                },
            })
    }

    pub fn deallocate(&self, size: u64) {
        self.current.fetch_sub(size, Ordering::Release);
    }

    pub fn get_current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn get_available(&self) -> u64 {
        self.maximum.saturating_sub(self.get_current())
    }

    pub fn get_maximum(&self) -> u64 {
        self.maximum
    }

    pub fn location(&self) -> Location {
        self.location
    }
}

impl std::fmt::Debug for MemoryTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTracker")
            .field("location", &self.location)
            .field("current", &self.get_current())
            .field("maximum", &self.maximum)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_allocation_past_limit() {
        let tracker = MemoryTracker::new(Location::Device(3), 100);
        tracker.allocate(60).unwrap();
        match tracker.allocate(50) {
            Err(DalError::DeviceOutOfMemory {
                device,
                requested,
                available,
            }) => {
                assert_eq!((device, requested, available), (3, 50, 40));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(tracker.get_current(), 60);
        tracker.deallocate(60);
        assert_eq!(tracker.get_available(), 100);
    }

    #[test]
    fn host_exhaustion_is_distinct() {
        let tracker = MemoryTracker::new(Location::Host, 8);
        let err = tracker.allocate(9).unwrap_err();
        assert!(err.is_out_of_memory());
        assert!(!err.is_device_out_of_memory());
    }
}
