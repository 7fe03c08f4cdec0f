use dal_table::{
    ColumnAccessor, CsrAccessor, CsrTable, DalError, DeviceConfig, ExecutionContext, HomogenTable,
    RowAccessor, SparseIndexing, Table, dispatch_data_type, thread_allocation_count,
};
use tracing::info;

fn describe(table: &HomogenTable) -> String {
    dispatch_data_type!(table.data_type(), T => format!("{:?}", table.get_data::<T>().get_data()))
}

fn main() -> Result<(), DalError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(extension = %dal_table::detected_cpu_extension(), "starting");

    // - - - - Dense table, column pulls - - - -
    let mut table = HomogenTable::from_rows(&[
        [0.0f32, 6.0],
        [1.0, 7.0],
        [2.0, 8.0],
        [3.0, 9.0],
        [4.0, 10.0],
        [5.0, 11.0],
    ])?;
    info!(rows = table.row_count(), cols = table.column_count(), data = describe(&table).as_str(), "table built");

    let columns = ColumnAccessor::<f32>::new(&table);
    let mut first = dal_table::Array::<f32>::zeros(table.row_count())?;
    let before = thread_allocation_count();
    columns.pull_into(&mut first, 0, ..)?;
    info!(
        values = ?first.get_data(),
        allocations = thread_allocation_count() - before,
        "column 0 as float32"
    );

    let widened = ColumnAccessor::<f64>::new(&table).pull(0, ..)?;
    info!(values = ?widened.get_data(), "column 0 as float64");

    // - - - - Row round trip - - - -
    let block = RowAccessor::<f32>::new(&table).pull(2..4)?;
    RowAccessor::push(&mut table, &block, 2..4)?;
    info!(
        elided = table.elided_pushes(),
        applied = table.applied_pushes(),
        "pushed rows 2..4 back unchanged"
    );

    // - - - - Same pull through a device queue - - - -
    let device = ExecutionContext::device(DeviceConfig {
        compute_units: 2,
        ..Default::default()
    })?;
    let on_device = RowAccessor::<i32>::new(&table).pull_with(&device, ..)?;
    info!(location = ?on_device.location(), values = ?on_device.get_data(), "rows as int32 on device");

    // - - - - Sparse table - - - -
    let csr = CsrTable::new(
        dal_table::Array::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 1.0, 11.0, 8.0]),
        dal_table::Array::from_vec(vec![1i64, 2, 4, 3, 2, 4, 2]),
        dal_table::Array::from_vec(vec![1i64, 4, 5, 7, 8]),
        4,
        SparseIndexing::OneBased,
    )?;
    let rows = CsrAccessor::<f32>::new(&csr).pull(1..3)?;
    info!(
        values = ?rows.values.get_data(),
        column_indices = ?rows.column_indices.get_data(),
        row_offsets = ?rows.row_offsets.get_data(),
        "csr rows 2 and 3"
    );

    Ok(())
}
