use std::marker::PhantomData;
use std::ops::RangeBounds;

use tracing::trace;

use crate::buffer::Array;
use crate::context::{ExecutionContext, default_context};
use crate::dtype::{DataType, Element};
use crate::table::{CsrTable, Table, resolve_rows};
use crate::utils::checked::byte_len;
use crate::utils::error::DalError;

use super::{Region, copy_region};

/// A row range of a CSR table, in the table's indexing convention: offsets
/// start at the base and index into `values` and `column_indices`.
#[derive(Clone, Debug)]
pub struct CsrBlock<T: Element> {
    pub values: Array<T>,
    pub column_indices: Array<i64>,
    pub row_offsets: Array<i64>,
}

impl<T: Element> CsrBlock<T> {
    pub fn row_count(&self) -> usize {
        self.row_offsets.get_count().saturating_sub(1)
    }

    pub fn non_zero_count(&self) -> usize {
        self.values.get_count()
    }
}

pub struct CsrAccessor<'a, T: Element> {
    table: &'a CsrTable,
    _marker: PhantomData<T>,
}

impl<'a, T: Element> CsrAccessor<'a, T> {
    pub fn new(table: &'a CsrTable) -> Self {
        Self {
            table,
            _marker: PhantomData,
        }
    }

    pub fn pull<R: RangeBounds<usize>>(&self, rows: R) -> Result<CsrBlock<T>, DalError> {
        self.pull_with(&default_context(), rows)
    }

    /// Rows `rows` (zero-based row numbers). Values alias the table when `T`
    /// is the value type, column indices alias whenever the storage lives
    /// where `ctx` allocates, and row offsets alias only for blocks starting
    /// at the first row; everything else is copied, offsets rebased.
    pub fn pull_with<R: RangeBounds<usize>>(
        &self,
        ctx: &ExecutionContext,
        rows: R,
    ) -> Result<CsrBlock<T>, DalError> {
        let table = self.table;
        let rows = resolve_rows(rows, table.row_count());
        let base = table.indexing().base();
        let offsets = table.get_row_offsets().get_data();
        let first = (offsets[rows.start] - base) as usize;
        let last = (offsets[rows.end] - base) as usize;
        let nnz = last - first;
        let local = table.location() == ctx.location();

        let values = if local && table.data_type() == T::DATA_TYPE {
            table
                .value_storage()
                .reinterpret(byte_len(first, size_of::<T>()), nnz)
        } else {
            gather(ctx, table.value_storage(), table.data_type(), first, nnz)?
        };

        let column_indices = if local {
            table.get_column_indices().view(first, nnz)
        } else {
            gather(ctx, table.get_column_indices(), DataType::Int64, first, nnz)?
        };

        let row_offsets = if local && rows.start == 0 {
            table.get_row_offsets().view(0, rows.len() + 1)
        } else {
            let shift = offsets[rows.start] - base;
            let rebased: Vec<i64> = offsets[rows.start..=rows.end]
                .iter()
                .map(|&o| o - shift)
                .collect();
            let rebased = Array::from_vec(rebased);
            if local {
                rebased
            } else {
                gather(ctx, &rebased, DataType::Int64, 0, rows.len() + 1)?
            }
        };

        trace!(
            start = rows.start,
            end = rows.end,
            nnz,
            values_aliased = local && table.data_type() == T::DATA_TYPE,
            "csr block pulled"
        );
        Ok(CsrBlock {
            values,
            column_indices,
            row_offsets,
        })
    }
}

/// Contiguous copy of `count` elements from `offset` of `source`, converted to
/// `D`, placed on `ctx`.
fn gather<S: Element, D: Element>(
    ctx: &ExecutionContext,
    source: &Array<S>,
    source_type: DataType,
    offset: usize,
    count: usize,
) -> Result<Array<D>, DalError> {
    let mut block = Array::zeros_on(ctx, count)?;
    copy_region(
        ctx,
        source,
        Region::strided(source_type, offset, 1),
        &mut block,
        Region::strided(D::DATA_TYPE, 0, 1),
        1,
        count,
    )?;
    Ok(block)
}
