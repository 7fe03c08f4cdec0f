use std::marker::PhantomData;
use std::ops::RangeBounds;

use tracing::trace;

use crate::buffer::Array;
use crate::context::{ExecutionContext, default_context};
use crate::dtype::Element;
use crate::table::{HomogenTable, Table, resolve_rows};
use crate::utils::checked::{byte_len, product};
use crate::utils::error::DalError;

use super::{Region, copy_region, reuse_block};

/// Reads and writes blocks of whole rows as `T`, in row-major order.
pub struct RowAccessor<'a, T: Element> {
    table: &'a HomogenTable,
    _marker: PhantomData<T>,
}

impl<'a, T: Element> RowAccessor<'a, T> {
    pub fn new(table: &'a HomogenTable) -> Self {
        Self {
            table,
            _marker: PhantomData,
        }
    }

    pub fn pull<R: RangeBounds<usize>>(&self, rows: R) -> Result<Array<T>, DalError> {
        self.pull_with(&default_context(), rows)
    }

    /// Rows `rows` as `rows.len() * column_count` elements. Aliases the table
    /// when `T` is the storage type and the storage already lives where `ctx`
    /// allocates; otherwise converts into a new block on `ctx`.
    pub fn pull_with<R: RangeBounds<usize>>(
        &self,
        ctx: &ExecutionContext,
        rows: R,
    ) -> Result<Array<T>, DalError> {
        let table = self.table;
        table.require_row_major()?;
        let rows = resolve_rows(rows, table.row_count());
        let cols = table.column_count();
        let count = product(rows.len(), cols);

        if table.data_type() == T::DATA_TYPE && table.location() == ctx.location() {
            trace!(start = rows.start, end = rows.end, "row block aliases table storage");
            let offset = byte_len(rows.start * cols, size_of::<T>());
            return Ok(table.storage().reinterpret(offset, count));
        }

        trace!(
            start = rows.start,
            end = rows.end,
            from = %table.data_type(),
            to = %T::DATA_TYPE,
            "row block materialized"
        );
        let mut block = Array::zeros_on(ctx, count)?;
        copy_region(
            ctx,
            table.storage(),
            Region::dense(table.data_type(), rows.start * cols, cols),
            &mut block,
            Region::dense(T::DATA_TYPE, 0, cols),
            rows.len(),
            cols,
        )?;
        Ok(block)
    }

    pub fn pull_into<R: RangeBounds<usize>>(&self, block: &mut Array<T>, rows: R) -> Result<(), DalError> {
        self.pull_into_with(&default_context(), block, rows)
    }

    /// Like [`pull_with`](Self::pull_with), but when a copy is needed it is
    /// written into `block`'s own memory if that is exclusive, large enough
    /// and placed where `ctx` allocates, so repeated pulls allocate nothing.
    pub fn pull_into_with<R: RangeBounds<usize>>(
        &self,
        ctx: &ExecutionContext,
        block: &mut Array<T>,
        rows: R,
    ) -> Result<(), DalError> {
        let table = self.table;
        table.require_row_major()?;
        let rows = resolve_rows(rows, table.row_count());
        let cols = table.column_count();
        let count = product(rows.len(), cols);

        let aliases = table.data_type() == T::DATA_TYPE && table.location() == ctx.location();
        if aliases || !reuse_block(block, count, ctx.location()) {
            *block = self.pull_with(ctx, rows)?;
            return Ok(());
        }

        trace!(start = rows.start, end = rows.end, "row block converted in place");
        copy_region(
            ctx,
            table.storage(),
            Region::dense(table.data_type(), rows.start * cols, cols),
            block,
            Region::dense(T::DATA_TYPE, 0, cols),
            rows.len(),
            cols,
        )
    }

    pub fn push<R: RangeBounds<usize>>(
        table: &mut HomogenTable,
        block: &Array<T>,
        rows: R,
    ) -> Result<(), DalError> {
        Self::push_with(&default_context(), table, block, rows)
    }

    /// Writes `block` over rows `rows`. Pushing back the exact block pulled
    /// from the same rows is a no-op. Shared storage is copied first.
    ///
    /// Panics if `block` does not hold `rows.len() * column_count` elements.
    #[track_caller]
    pub fn push_with<R: RangeBounds<usize>>(
        ctx: &ExecutionContext,
        table: &mut HomogenTable,
        block: &Array<T>,
        rows: R,
    ) -> Result<(), DalError> {
        table.require_row_major()?;
        let rows = resolve_rows(rows, table.row_count());
        let cols = table.column_count();
        let count = product(rows.len(), cols);
        assert_eq!(
            block.get_count(),
            count,
            "Pushed block holds {} elements, rows {}..{} need {}",
            block.get_count(),
            rows.start,
            rows.end,
            count
        );

        let storage_type = table.data_type();
        if storage_type == T::DATA_TYPE {
            let offset = byte_len(rows.start * cols, size_of::<T>());
            let destination = table.data_ptr().wrapping_add(offset);
            if std::ptr::eq(block.as_ptr() as *const u8, destination) {
                trace!(start = rows.start, end = rows.end, "push elided, block is the destination");
                table.record_elided_push();
                return Ok(());
            }
        }

        let storage = table.storage_mut()?;
        copy_region(
            ctx,
            block,
            Region::dense(T::DATA_TYPE, 0, cols),
            storage,
            Region::dense(storage_type, rows.start * cols, cols),
            rows.len(),
            cols,
        )?;
        table.record_applied_push();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::thread_allocation_count;
    use crate::dtype::DataType;
    use crate::table::DataLayout;

    fn sample() -> HomogenTable {
        HomogenTable::from_rows(&[[1i32, 2, 3], [4, 5, 6], [7, 8, 9], [10, 11, 12]]).unwrap()
    }

    #[test]
    fn same_type_pull_aliases_storage() {
        let table = sample();
        let before = thread_allocation_count();
        let block = RowAccessor::<i32>::new(&table).pull(1..3).unwrap();
        assert_eq!(thread_allocation_count(), before);
        assert_eq!(block.get_data(), &[4, 5, 6, 7, 8, 9]);
        assert_eq!(block.as_ptr() as *const u8, table.data_ptr().wrapping_add(3 * 4));
    }

    #[test]
    fn converting_pull_materializes() {
        let table = sample();
        let block = RowAccessor::<f64>::new(&table).pull(2..).unwrap();
        assert_eq!(block.get_data(), &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        assert!(block.is_owning());
    }

    #[test]
    fn push_of_pulled_block_is_elided() {
        let mut table = sample();
        let block = RowAccessor::<i32>::new(&table).pull(0..2).unwrap();
        RowAccessor::push(&mut table, &block, 0..2).unwrap();
        assert_eq!(table.elided_pushes(), 1);
        assert_eq!(table.applied_pushes(), 0);
    }

    #[test]
    fn converting_push_writes_rows() {
        let mut table = sample();
        let block = Array::from_vec(vec![-1.9f32, 2.9, 100.0]);
        RowAccessor::push(&mut table, &block, 3..4).unwrap();
        assert_eq!(table.applied_pushes(), 1);
        assert_eq!(
            table.get_data::<i32>().get_data(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, -1, 2, 100]
        );
    }

    #[test]
    fn push_into_shared_storage_copies_first() {
        let mut table = sample();
        let snapshot = RowAccessor::<i32>::new(&table).pull(..).unwrap();
        let block = Array::from_vec(vec![0i32; 3]);
        RowAccessor::push(&mut table, &block, 0..1).unwrap();
        assert_eq!(&snapshot.get_data()[..3], &[1, 2, 3]);
        assert_eq!(&table.get_data::<i32>().get_data()[..3], &[0, 0, 0]);
    }

    #[test]
    fn pull_into_reuses_block() {
        let table = sample();
        let mut block = Array::<f32>::zeros(6).unwrap();
        let ptr = block.as_ptr();
        let before = thread_allocation_count();
        RowAccessor::new(&table).pull_into(&mut block, 0..2).unwrap();
        assert_eq!(thread_allocation_count(), before);
        assert_eq!(block.as_ptr(), ptr);
        assert_eq!(block.get_data(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn pull_into_with_reuses_device_block() {
        let device = ExecutionContext::device(crate::context::DeviceConfig {
            id: 3,
            compute_units: 2,
            ..Default::default()
        })
        .unwrap();
        let table = sample();
        let mut block = Array::<f64>::zeros_on(&device, 9).unwrap();
        let ptr = block.as_ptr();
        RowAccessor::new(&table).pull_into_with(&device, &mut block, 1..4).unwrap();
        assert_eq!(block.as_ptr(), ptr);
        assert_eq!(block.location(), crate::buffer::Location::Device(3));
        assert_eq!(block.get_data(), &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);

        // A host block cannot receive a device pull; it is replaced.
        let mut host_block = Array::<f64>::zeros(3).unwrap();
        RowAccessor::new(&table).pull_into_with(&device, &mut host_block, 0..1).unwrap();
        assert_eq!(host_block.location(), crate::buffer::Location::Device(3));
        assert_eq!(host_block.get_data(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn column_major_is_unsupported() {
        let table =
            HomogenTable::new(Array::from_vec(vec![0f64; 6]), 3, 2, DataLayout::ColumnMajor).unwrap();
        let err = RowAccessor::<f64>::new(&table).pull(..).unwrap_err();
        assert!(matches!(err, DalError::UnsupportedLayout(DataLayout::ColumnMajor)));
        assert_eq!(table.data_type(), DataType::Float64);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn range_past_end_panics() {
        let table = sample();
        let _ = RowAccessor::<i32>::new(&table).pull(3..5);
    }

    #[test]
    #[should_panic(expected = "Pushed block holds")]
    fn short_block_panics() {
        let mut table = sample();
        let block = Array::from_vec(vec![1i32; 2]);
        let _ = RowAccessor::push(&mut table, &block, 0..1);
    }
}
