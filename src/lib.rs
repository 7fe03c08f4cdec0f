//! dal-table - dense and sparse tables over reference-counted typed buffers
//!
//! Tables hand out blocks of rows or columns in whatever element type the
//! caller asks for. A block aliases table storage when no conversion is
//! needed; otherwise a copy-convert kernel, picked at runtime for the CPU's
//! instruction set, materializes it on the host pool or a device queue.

mod accessor;

mod buffer;

mod context;

mod convert;

mod device;

mod dtype;

mod isa;

mod table;

mod thread_pool;

mod utils;

pub use accessor::{ColumnAccessor, CsrAccessor, CsrBlock, RowAccessor};
pub use buffer::{Array, Location, thread_allocation_count};
pub use context::{
    ContextConfig, DeviceConfig, DeviceContext, ExecutionContext, HostContext, Kernel,
    MemoryTracker, default_context, set_default_context,
};
pub use convert::{
    ConvertKernel, RowCopy, convert_with_extension, copy_convert, copy_convert_bytes,
    copy_convert_raw, copy_convert_rows, copy_convert_strided,
};
#[cfg(feature = "vulkan")]
pub use device::probe_devices;
pub use device::{DeviceInfo, DeviceQueue, Event, NdRange};
pub use dtype::{CastInto, DataType, Element};
pub use isa::{CpuExtension, detected as detected_cpu_extension};
pub use table::{
    CsrTable, DataLayout, FeatureType, HomogenTable, SparseIndexing, Table, TableKind,
    TableMetadata,
};
pub use thread_pool::{Job, ThreadPool, WorkFuture, WorkFutureBatch, WorkResult, default_thread_count};
pub use utils::error::DalError;
pub use utils::{ConstPtr, MutPtr};
