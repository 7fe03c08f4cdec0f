use crate::buffer::{Array, Location};
use crate::dtype::{DataType, Element};
use crate::utils::error::DalError;

use super::metadata::{DataLayout, TableMetadata};
use super::{Table, TableKind};

/// Numbering of CSR column indices and row offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SparseIndexing {
    ZeroBased,
    OneBased,
}

impl SparseIndexing {
    /// Value of the first row offset and of the first column index.
    pub fn base(self) -> i64 {
        match self {
            SparseIndexing::ZeroBased => 0,
            SparseIndexing::OneBased => 1,
        }
    }
}

/// Compressed sparse row table: non-zero values, their column indices, and
/// `row_count + 1` offsets delimiting each row's run of values.
#[derive(Clone, Debug)]
pub struct CsrTable {
    values: Array<u8>,
    data_type: DataType,
    column_indices: Array<i64>,
    row_offsets: Array<i64>,
    row_count: usize,
    column_count: usize,
    indexing: SparseIndexing,
    metadata: TableMetadata,
}

impl CsrTable {
    /// Validates the three arrays against each other and `indexing`.
    pub fn new<T: Element>(
        values: Array<T>,
        column_indices: Array<i64>,
        row_offsets: Array<i64>,
        column_count: usize,
        indexing: SparseIndexing,
    ) -> Result<Self, DalError> {
        validate(
            values.get_count(),
            column_indices.get_data(),
            row_offsets.get_data(),
            column_count,
            indexing,
        )?;
        let row_count = row_offsets.get_count() - 1;
        Ok(Self {
            values: values.into_bytes(),
            data_type: T::DATA_TYPE,
            column_indices,
            row_offsets,
            row_count,
            column_count,
            indexing,
            metadata: TableMetadata::homogen(T::DATA_TYPE, column_count),
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn indexing(&self) -> SparseIndexing {
        self.indexing
    }

    pub fn non_zero_count(&self) -> usize {
        self.column_indices.get_count()
    }

    pub fn location(&self) -> Location {
        self.values.location()
    }

    /// Zero-copy view of all values. Panics if `T` is not the value type.
    #[track_caller]
    pub fn get_values<T: Element>(&self) -> Array<T> {
        assert_eq!(
            T::DATA_TYPE,
            self.data_type,
            "CsrTable holds {}, not {}",
            self.data_type,
            T::DATA_TYPE
        );
        self.values.reinterpret(0, self.non_zero_count())
    }

    pub fn get_column_indices(&self) -> &Array<i64> {
        &self.column_indices
    }

    pub fn get_row_offsets(&self) -> &Array<i64> {
        &self.row_offsets
    }

    pub(crate) fn value_storage(&self) -> &Array<u8> {
        &self.values
    }
}

impl Table for CsrTable {
    fn kind(&self) -> TableKind {
        TableKind::Csr
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.column_count
    }

    fn metadata(&self) -> &TableMetadata {
        &self.metadata
    }

    /// Rows are stored one after another.
    fn layout(&self) -> DataLayout {
        DataLayout::RowMajor
    }
}

fn validate(
    value_count: usize,
    column_indices: &[i64],
    row_offsets: &[i64],
    column_count: usize,
    indexing: SparseIndexing,
) -> Result<(), DalError> {
    let invalid = |msg: String| Err(DalError::InvalidArgument(msg));
    let base = indexing.base();

    if row_offsets.is_empty() {
        return invalid("row offsets must hold row_count + 1 entries".to_string());
    }
    if column_indices.len() != value_count {
        return invalid(format!(
            "{} column indices given for {} values",
            column_indices.len(),
            value_count
        ));
    }
    if row_offsets[0] != base {
        return invalid(format!(
            "first row offset is {}, expected {} for {:?} indexing",
            row_offsets[0], base, indexing
        ));
    }
    if let Some(pos) = row_offsets.windows(2).position(|w| w[1] < w[0]) {
        return invalid(format!("row offsets decrease after row {}", pos));
    }
    let last = row_offsets[row_offsets.len() - 1];
    if last - base != value_count as i64 {
        return invalid(format!(
            "last row offset {} does not match {} values",
            last, value_count
        ));
    }
    let limit = base + column_count as i64;
    if let Some(bad) = column_indices.iter().find(|&&c| c < base || c >= limit) {
        return invalid(format!(
            "column index {} outside {}..{}",
            bad, base, limit
        ));
    }
    Ok(())
}
