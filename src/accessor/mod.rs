//! Block access to tables: pull rows, columns or CSR row ranges in any
//! element type, and push them back.
//!
//! A pull aliases table storage when no conversion or relocation is needed
//! and materializes a converted copy otherwise. Pulls and pushes without an
//! explicit context run on [`default_context`](crate::context::default_context).

mod column;
mod csr;
mod row;

pub use column::ColumnAccessor;
pub use csr::{CsrAccessor, CsrBlock};
pub use row::RowAccessor;

use crate::buffer::{Array, Location};
use crate::context::{ExecutionContext, Kernel};
use crate::convert::{ConvertKernel, RowCopy};
use crate::dtype::{DataType, Element};
use crate::utils::error::DalError;
use crate::utils::{ConstPtr, MutPtr};

/// Placement of a 2-D run of elements inside an array. All quantities are in
/// elements of `data_type`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Region {
    pub data_type: DataType,
    pub offset: usize,
    /// Distance between the first elements of consecutive rows.
    pub row_pitch: usize,
    /// Distance between consecutive elements of one row.
    pub stride: usize,
}

impl Region {
    pub(crate) fn dense(data_type: DataType, offset: usize, row_pitch: usize) -> Self {
        Self {
            data_type,
            offset,
            row_pitch,
            stride: 1,
        }
    }

    pub(crate) fn strided(data_type: DataType, offset: usize, stride: usize) -> Self {
        Self {
            data_type,
            offset,
            row_pitch: 0,
            stride,
        }
    }

    fn byte_offset(&self, row: usize) -> usize {
        (self.offset + row * self.row_pitch) * self.data_type.size_in_bytes()
    }
}

/// Converts `rows` rows of `count` elements from `src_region` of `source` into
/// `dst_region` of `target`, on `ctx`.
///
/// On the host this returns once the copy is done. On a device it returns
/// after enqueueing; `target` records the launch event, so host reads of it
/// wait, and the launch itself waits for pending writes to either array.
pub(crate) fn copy_region<S: Element, D: Element>(
    ctx: &ExecutionContext,
    source: &Array<S>,
    src_region: Region,
    target: &mut Array<D>,
    dst_region: Region,
    rows: usize,
    count: usize,
) -> Result<(), DalError> {
    if rows == 0 || count == 0 {
        return Ok(());
    }
    let src_base = source.raw_ptr();
    let dst_base = target.raw_mut_ptr();
    let copies = (0..rows)
        .map(|row| unsafe {
            RowCopy {
                src: ConstPtr(src_base.add(src_region.byte_offset(row))),
                src_type: src_region.data_type,
                src_stride: src_region.stride,
                dst: MutPtr(dst_base.add(dst_region.byte_offset(row))),
                dst_type: dst_region.data_type,
                dst_stride: dst_region.stride,
            }
        })
        .collect();

    // SAFETY: the regions were derived from the arrays' shapes by the
    // accessors, and `target` is exclusively borrowed.
    let kernel = unsafe { ConvertKernel::new(copies, count) };
    match ctx {
        ExecutionContext::Host(host) => {
            source.wait_ready();
            target.wait_ready();
            kernel.run_host(host)
        }
        ExecutionContext::Device(device) => {
            let deps: Vec<_> = source.pending().into_iter().chain(target.pending()).collect();
            let event = kernel
                .retain(source.clone().into_bytes())
                .run_device(device, &deps)?;
            target.set_pending(event);
            Ok(())
        }
    }
}

/// Prepares `block` to receive `count` elements in place. False when its
/// memory cannot be reused and a fresh block is needed.
pub(crate) fn reuse_block<T: Element>(block: &mut Array<T>, count: usize, location: Location) -> bool {
    if !block.has_mutable_data() || block.location() != location {
        return false;
    }
    if block.is_owning() {
        block.get_capacity() >= count && block.resize(count).is_ok()
    } else {
        block.get_count() == count
    }
}
