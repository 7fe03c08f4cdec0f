use tracing::debug;

use crate::buffer::{Array, Location};
use crate::context::{ExecutionContext, default_context};
use crate::dtype::{DataType, Element};
use crate::utils::checked::{byte_len, product};
use crate::utils::error::DalError;

use super::metadata::{DataLayout, TableMetadata};
use super::{Table, TableKind};

/// Dense table whose columns share one data type and one backing buffer.
///
/// Clones share storage. The first push into shared storage copies it, so
/// blocks pulled earlier and other clones keep seeing the old contents.
#[derive(Clone, Debug)]
pub struct HomogenTable {
    data: Array<u8>,
    data_type: DataType,
    row_count: usize,
    column_count: usize,
    layout: DataLayout,
    metadata: TableMetadata,
    elided_pushes: u64,
    applied_pushes: u64,
}

impl HomogenTable {
    /// Builds a table over `data`, sharing it rather than copying.
    pub fn new<T: Element>(
        data: Array<T>,
        row_count: usize,
        column_count: usize,
        layout: DataLayout,
    ) -> Result<Self, DalError> {
        let expected = product(row_count, column_count);
        if data.get_count() != expected {
            return Err(DalError::InvalidArgument(format!(
                "{} elements given for a {}x{} table",
                data.get_count(),
                row_count,
                column_count
            )));
        }
        Ok(Self::from_storage(
            data.into_bytes(),
            T::DATA_TYPE,
            row_count,
            column_count,
            layout,
        ))
    }

    /// Row-major table over foreign memory; `deleter` runs once when the last
    /// view of the storage drops.
    ///
    /// # Safety
    /// Same contract as [`Array::wrap_with_deleter`] for
    /// `row_count * column_count` elements.
    pub unsafe fn wrap<T, F>(
        ptr: *mut T,
        row_count: usize,
        column_count: usize,
        deleter: F,
    ) -> Result<Self, DalError>
    where
        T: Element,
        F: FnOnce(*mut T) + Send + Sync + 'static,
    {
        let count = product(row_count, column_count);
        let data = unsafe { Array::wrap_with_deleter(ptr, count, deleter) };
        Self::new(data, row_count, column_count, DataLayout::RowMajor)
    }

    /// Zero-filled row-major table on the default context.
    pub fn empty(data_type: DataType, row_count: usize, column_count: usize) -> Result<Self, DalError> {
        Self::allocate_on(&default_context(), data_type, row_count, column_count)
    }

    /// Zero-filled row-major table allocated where `ctx` allocates.
    pub fn allocate_on(
        ctx: &ExecutionContext,
        data_type: DataType,
        row_count: usize,
        column_count: usize,
    ) -> Result<Self, DalError> {
        let bytes = byte_len(product(row_count, column_count), data_type.size_in_bytes());
        let data = Array::<u8>::zeros_on(ctx, bytes)?;
        debug!(
            %data_type,
            row_count,
            column_count,
            location = ?data.location(),
            "allocated homogen table"
        );
        Ok(Self::from_storage(
            data,
            data_type,
            row_count,
            column_count,
            DataLayout::RowMajor,
        ))
    }

    /// Copies literal rows into a new row-major host table.
    pub fn from_rows<T: Element, const N: usize>(rows: &[[T; N]]) -> Result<Self, DalError> {
        let flat: Vec<T> = rows.iter().flatten().copied().collect();
        Self::new(Array::from_slice(&flat)?, rows.len(), N, DataLayout::RowMajor)
    }

    fn from_storage(
        data: Array<u8>,
        data_type: DataType,
        row_count: usize,
        column_count: usize,
        layout: DataLayout,
    ) -> Self {
        Self {
            data,
            data_type,
            row_count,
            column_count,
            layout,
            metadata: TableMetadata::homogen(data_type, column_count),
            elided_pushes: 0,
            applied_pushes: 0,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn data_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    pub fn location(&self) -> Location {
        self.data.location()
    }

    /// Zero-copy view of the whole storage. Panics if `T` is not the
    /// storage type.
    #[track_caller]
    pub fn get_data<T: Element>(&self) -> Array<T> {
        assert_eq!(
            T::DATA_TYPE,
            self.data_type,
            "HomogenTable holds {}, not {}",
            self.data_type,
            T::DATA_TYPE
        );
        self.data
            .reinterpret(0, product(self.row_count, self.column_count))
    }

    pub fn metadata_mut(&mut self) -> &mut TableMetadata {
        &mut self.metadata
    }

    /// Pushes skipped because the block already was the destination.
    pub fn elided_pushes(&self) -> u64 {
        self.elided_pushes
    }

    /// Pushes that wrote into the storage.
    pub fn applied_pushes(&self) -> u64 {
        self.applied_pushes
    }

    pub(crate) fn require_row_major(&self) -> Result<(), DalError> {
        match self.layout {
            DataLayout::RowMajor => Ok(()),
            other => Err(DalError::UnsupportedLayout(other)),
        }
    }

    pub(crate) fn storage(&self) -> &Array<u8> {
        &self.data
    }

    /// Storage made exclusive for writing, copying it first if shared.
    pub(crate) fn storage_mut(&mut self) -> Result<&mut Array<u8>, DalError> {
        if !self.data.has_mutable_data() {
            debug!(
                bytes = self.data.get_size(),
                "homogen table storage shared, copying before write"
            );
        }
        self.data.unique()
    }

    pub(crate) fn record_elided_push(&mut self) {
        self.elided_pushes += 1;
    }

    pub(crate) fn record_applied_push(&mut self) {
        self.applied_pushes += 1;
    }
}

impl Table for HomogenTable {
    fn kind(&self) -> TableKind {
        TableKind::Homogen
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

    fn layout(&self) -> DataLayout {
        self.layout
    }
}
