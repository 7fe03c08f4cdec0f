use std::{ffi::CString, ptr};

use tracing::debug;
use vulkanalia::{
    Entry,
    loader::{LIBRARY, LibloadingLoader},
    vk::{self, InstanceV1_0},
};

use crate::utils::error::DalError;

use super::info::DeviceInfo;

/// Enumerates the Vulkan physical devices on this machine and describes each
/// one, so a device context can be sized after real hardware.
pub fn probe_devices() -> Result<Vec<DeviceInfo>, DalError> {
    unsafe {
        let loader =
            LibloadingLoader::new(LIBRARY).map_err(|e| DalError::Vulkan(e.to_string()))?;
        let entry = Entry::new(loader).map_err(|e| DalError::Vulkan(e.to_string()))?;

        let aname = CString::new("dal-table").map_err(|e| DalError::Vulkan(e.to_string()))?;

        let appinfo = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            next: ptr::null(),
            application_name: aname.as_ptr(),
            application_version: vk::make_version(0, 1, 0),
            engine_name: aname.as_ptr(),
            engine_version: vk::make_version(0, 1, 0),
            api_version: vk::make_version(1, 0, 0),
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            next: ptr::null(),
            flags: vk::InstanceCreateFlags::empty(),
            application_info: &appinfo,
            enabled_layer_count: 0,
            enabled_layer_names: ptr::null(),
            enabled_extension_count: 0,
            enabled_extension_names: ptr::null(),
        };

        let instance = entry.create_instance(&create_info, None)?;

        let physical_devices = match instance.enumerate_physical_devices() {
            Ok(devices) => devices,
            Err(e) => {
                instance.destroy_instance(None);
                return Err(e.into());
            }
        };

        let infos = physical_devices
            .iter()
            .enumerate()
            .map(|(id, &physical_device)| {
                let properties = instance.get_physical_device_properties(physical_device);
                let memory = instance.get_physical_device_memory_properties(physical_device);

                let name = String::from_utf8_lossy(
                    &properties
                        .device_name
                        .iter()
                        .take_while(|&&c| c != 0)
                        .map(|&c| c as u8)
                        .collect::<Vec<u8>>(),
                )
                .to_string();

                let memory_total = memory.memory_heaps[..memory.memory_heap_count as usize]
                    .iter()
                    .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                    .map(|heap| heap.size)
                    .sum();

                let compute_units = (properties.limits.max_compute_work_group_count[0] as usize)
                    .min(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

                debug!(id, name = name.as_str(), memory_total, "probed vulkan device");

                DeviceInfo {
                    id,
                    name,
                    memory_total,
                    compute_units: compute_units.max(1),
                    preferred_vector_width_bytes: 16,
                }
            })
            .collect();

        instance.destroy_instance(None);
        Ok(infos)
    }
}
