mod csr;
mod homogen;
mod metadata;
mod range;

pub use csr::{CsrTable, SparseIndexing};
pub use homogen::HomogenTable;
pub use metadata::{DataLayout, FeatureType, TableMetadata};

pub(crate) use range::resolve_rows;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    Homogen,
    Csr,
}

/// Shape and metadata shared by every table kind.
pub trait Table {
    fn kind(&self) -> TableKind;

    fn row_count(&self) -> usize;

    fn column_count(&self) -> usize;

    fn metadata(&self) -> &TableMetadata;

    fn layout(&self) -> DataLayout;

    fn is_empty(&self) -> bool {
        self.row_count() == 0 || self.column_count() == 0
    }
}
