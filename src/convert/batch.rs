use std::sync::Arc;

use tracing::trace;

use crate::buffer::Array;
use crate::context::{DeviceContext, HostContext, Kernel};
use crate::device::{Event, NdRange};
use crate::dtype::DataType;
use crate::isa::CpuExtension;
use crate::thread_pool::ThreadPool;
use crate::utils::error::DalError;
use crate::utils::{ConstPtr, MutPtr};

use super::check_pointers;
use super::table::ConvertTable;

const DEFAULT_ROW_GRAIN: usize = 16;

/// One row of a 2-D copy-convert: where to read, where to write, and how.
/// Strides are in elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowCopy {
    pub src: ConstPtr,
    pub src_type: DataType,
    pub src_stride: usize,
    pub dst: MutPtr,
    pub dst_type: DataType,
    pub dst_stride: usize,
}

impl RowCopy {
    /// Copy of elements `start..start + len` of this row.
    ///
    /// # Safety
    /// `start + len` must not exceed the row's element count.
    unsafe fn run_slice(&self, table: &ConvertTable, start: usize, len: usize) {
        unsafe {
            super::dispatch(
                table,
                self.src.get().add(start * self.src_stride * self.src_type.size_in_bytes()),
                self.src_type,
                self.src_stride,
                self.dst.get().add(start * self.dst_stride * self.dst_type.size_in_bytes()),
                self.dst_type,
                self.dst_stride,
                len,
            )
        }
    }

    #[track_caller]
    fn check(&self, count: usize) {
        assert!(
            self.src_stride > 0 && self.dst_stride > 0,
            "RowCopy strides must be positive"
        );
        check_pointers(self.src.get(), self.src_type, self.dst.get(), self.dst_type, count);
    }
}

/// Converts `count` elements of every row in `rows`, farming whole rows out to
/// `pool`. Blocks until all rows are done.
///
/// # Safety
/// Every row's pointers must be valid for its strided runs of `count`
/// elements, and no destination run may overlap another run of the batch.
#[track_caller]
pub unsafe fn copy_convert_rows(pool: &ThreadPool, ext: CpuExtension, rows: &[RowCopy], count: usize) {
    unsafe { convert_rows(pool, ConvertTable::for_extension(ext), DEFAULT_ROW_GRAIN, rows, count) }
}

#[track_caller]
unsafe fn convert_rows(pool: &ThreadPool, table: &ConvertTable, grain: usize, rows: &[RowCopy], count: usize) {
    if count == 0 || rows.is_empty() {
        return;
    }
    for row in rows {
        row.check(count);
    }
    pool.parallel_for(rows.len(), grain, |range| {
        for row in &rows[range] {
            unsafe { row.run_slice(table, 0, count) };
        }
    });
}

/// A batched copy-convert packaged as a [`Kernel`], so one batch runs on the
/// host pool or on a device queue.
///
/// On the host each worker converts whole rows. On a device one work item
/// handles one `(row, chunk)` pair, a chunk holding as many elements as the
/// device's preferred vector width for the wider of each row's two types.
#[derive(Clone, Debug)]
pub struct ConvertKernel {
    rows: Arc<Vec<RowCopy>>,
    count: usize,
    retained: Vec<Array<u8>>,
}

impl ConvertKernel {
    /// # Safety
    /// Same contract as [`copy_convert_rows`]. For device execution the
    /// memory must stay valid until the returned event signals; arrays
    /// passed to [`retain`](Self::retain) are kept alive that long.
    #[track_caller]
    pub unsafe fn new(rows: Vec<RowCopy>, count: usize) -> Self {
        if count > 0 {
            for row in &rows {
                row.check(count);
            }
        }
        Self {
            rows: Arc::new(rows),
            count,
            retained: Vec::new(),
        }
    }

    /// Holds a reference to `source` for as long as the kernel, including
    /// any device launch of it, is alive.
    pub fn retain(mut self, source: Array<u8>) -> Self {
        self.retained.push(source);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn chunk_len(&self, ctx: &DeviceContext) -> usize {
        self.rows
            .iter()
            .map(|row| {
                ctx.info()
                    .preferred_vector_width(DataType::wider(row.src_type, row.dst_type))
            })
            .min()
            .unwrap_or(1)
    }
}

impl Kernel for ConvertKernel {
    fn name(&self) -> &str {
        "copy_convert"
    }

    fn run_host(&self, ctx: &HostContext) -> Result<(), DalError> {
        trace!(rows = self.rows.len(), count = self.count, "host copy-convert");
        let table = ConvertTable::for_extension(ctx.cpu_extension());
        unsafe { convert_rows(ctx.pool(), table, ctx.row_grain(), &self.rows, self.count) };
        Ok(())
    }

    fn run_device(&self, ctx: &DeviceContext, deps: &[Event]) -> Result<Event, DalError> {
        let count = self.count;
        let chunk_len = self.chunk_len(ctx);
        let range = NdRange {
            rows: if count == 0 { 0 } else { self.rows.len() },
            chunks: count.div_ceil(chunk_len),
        };
        trace!(
            device = ctx.id(),
            rows = range.rows,
            chunks = range.chunks,
            "device copy-convert launched"
        );

        let rows = Arc::clone(&self.rows);
        let retained = self.retained.clone();
        ctx.queue().launch(range, deps, move |row, chunk| {
            let _ = &retained;
            let start = chunk * chunk_len;
            let len = chunk_len.min(count - start);
            unsafe { rows[row].run_slice(ConvertTable::active(), start, len) };
        })
    }
}
