use std::marker::PhantomData;
use std::ops::{Range, RangeBounds};

use tracing::trace;

use crate::buffer::Array;
use crate::context::{ExecutionContext, default_context};
use crate::dtype::Element;
use crate::table::{HomogenTable, Table, resolve_rows};
use crate::utils::checked::byte_len;
use crate::utils::error::DalError;

use super::{Region, copy_region, reuse_block};

/// Reads and writes one column at a time as `T`.
pub struct ColumnAccessor<'a, T: Element> {
    table: &'a HomogenTable,
    _marker: PhantomData<T>,
}

#[track_caller]
fn check_column(table: &HomogenTable, column: usize) {
    assert!(
        column < table.column_count(),
        "Column {} out of bounds for {} columns",
        column,
        table.column_count()
    );
}

fn column_region(table: &HomogenTable, column: usize, rows: &Range<usize>) -> Region {
    let cols = table.column_count();
    Region::strided(table.data_type(), rows.start * cols + column, cols)
}

impl<'a, T: Element> ColumnAccessor<'a, T> {
    pub fn new(table: &'a HomogenTable) -> Self {
        Self {
            table,
            _marker: PhantomData,
        }
    }

    pub fn pull<R: RangeBounds<usize>>(&self, column: usize, rows: R) -> Result<Array<T>, DalError> {
        self.pull_with(&default_context(), column, rows)
    }

    /// `column` over `rows`, one element per row. Only a single-column table
    /// of type `T` stores a column contiguously, so only then is the result an
    /// alias; every other pull gathers a copy.
    pub fn pull_with<R: RangeBounds<usize>>(
        &self,
        ctx: &ExecutionContext,
        column: usize,
        rows: R,
    ) -> Result<Array<T>, DalError> {
        let table = self.table;
        table.require_row_major()?;
        check_column(table, column);
        let rows = resolve_rows(rows, table.row_count());

        if self.aliases(ctx) {
            trace!(column, start = rows.start, end = rows.end, "column aliases table storage");
            let offset = byte_len(rows.start, size_of::<T>());
            return Ok(table.storage().reinterpret(offset, rows.len()));
        }

        trace!(column, start = rows.start, end = rows.end, "column gathered");
        let mut block = Array::zeros_on(ctx, rows.len())?;
        copy_region(
            ctx,
            table.storage(),
            column_region(table, column, &rows),
            &mut block,
            Region::strided(T::DATA_TYPE, 0, 1),
            1,
            rows.len(),
        )?;
        Ok(block)
    }

    pub fn pull_into<R: RangeBounds<usize>>(
        &self,
        block: &mut Array<T>,
        column: usize,
        rows: R,
    ) -> Result<(), DalError> {
        self.pull_into_with(&default_context(), block, column, rows)
    }

    /// Gathers into `block`'s own memory when it can be reused; see
    /// [`RowAccessor::pull_into_with`](super::RowAccessor::pull_into_with).
    pub fn pull_into_with<R: RangeBounds<usize>>(
        &self,
        ctx: &ExecutionContext,
        block: &mut Array<T>,
        column: usize,
        rows: R,
    ) -> Result<(), DalError> {
        let table = self.table;
        table.require_row_major()?;
        check_column(table, column);
        let rows = resolve_rows(rows, table.row_count());

        if self.aliases(ctx) || !reuse_block(block, rows.len(), ctx.location()) {
            *block = self.pull_with(ctx, column, rows)?;
            return Ok(());
        }

        trace!(column, start = rows.start, end = rows.end, "column gathered in place");
        copy_region(
            ctx,
            table.storage(),
            column_region(table, column, &rows),
            block,
            Region::strided(T::DATA_TYPE, 0, 1),
            1,
            rows.len(),
        )
    }

    pub fn push<R: RangeBounds<usize>>(
        table: &mut HomogenTable,
        block: &Array<T>,
        column: usize,
        rows: R,
    ) -> Result<(), DalError> {
        Self::push_with(&default_context(), table, block, column, rows)
    }

    /// Scatters `block` into `column` over `rows`. Pushing back the block
    /// pulled from a single-column table is a no-op.
    ///
    /// Panics if `block` does not hold one element per row.
    #[track_caller]
    pub fn push_with<R: RangeBounds<usize>>(
        ctx: &ExecutionContext,
        table: &mut HomogenTable,
        block: &Array<T>,
        column: usize,
        rows: R,
    ) -> Result<(), DalError> {
        table.require_row_major()?;
        check_column(table, column);
        let rows = resolve_rows(rows, table.row_count());
        assert_eq!(
            block.get_count(),
            rows.len(),
            "Pushed column holds {} elements, rows {}..{} need {}",
            block.get_count(),
            rows.start,
            rows.end,
            rows.len()
        );

        if table.data_type() == T::DATA_TYPE && table.column_count() == 1 {
            let destination = table
                .data_ptr()
                .wrapping_add(byte_len(rows.start, size_of::<T>()));
            if std::ptr::eq(block.as_ptr() as *const u8, destination) {
                trace!(column, "push elided, block is the destination");
                table.record_elided_push();
                return Ok(());
            }
        }

        let region = column_region(table, column, &rows);
        let storage = table.storage_mut()?;
        copy_region(
            ctx,
            block,
            Region::strided(T::DATA_TYPE, 0, 1),
            storage,
            region,
            1,
            rows.len(),
        )?;
        table.record_applied_push();
        Ok(())
    }

    fn aliases(&self, ctx: &ExecutionContext) -> bool {
        self.table.data_type() == T::DATA_TYPE
            && self.table.column_count() == 1
            && self.table.location() == ctx.location()
    }
}
