//! Copy-convert throughput per access pattern and per instruction set.
//!
//! Run with:  `cargo bench`

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dal_table::{
    ConstPtr, CpuExtension, DataType, MutPtr, RowCopy, ThreadPool, convert_with_extension,
    copy_convert, copy_convert_rows, copy_convert_strided, detected_cpu_extension,
};

const COUNT: usize = 1 << 16;

fn bench_contiguous(c: &mut Criterion) {
    let src: Vec<f32> = (0..COUNT).map(|i| i as f32 * 0.5).collect();
    let mut dst = vec![0f64; COUNT];
    let mut same = vec![0f32; COUNT];

    let mut group = c.benchmark_group("contiguous");
    group.throughput(Throughput::Elements(COUNT as u64));
    group.bench_function("f32_to_f64", |b| {
        b.iter(|| copy_convert(black_box(&src), &mut dst))
    });
    group.bench_function("f32_to_f32", |b| {
        b.iter(|| copy_convert(black_box(&src), &mut same))
    });
    group.finish();
}

fn bench_extensions(c: &mut Criterion) {
    let src: Vec<i64> = (0..COUNT as i64).collect();
    let mut dst = vec![0f32; COUNT];

    let mut group = c.benchmark_group("i64_to_f32");
    group.throughput(Throughput::Elements(COUNT as u64));
    for ext in [
        CpuExtension::None,
        CpuExtension::Sse42,
        CpuExtension::Avx,
        CpuExtension::Avx2,
        CpuExtension::Avx512,
    ] {
        if ext > detected_cpu_extension() {
            continue;
        }
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", ext)), &ext, |b, &ext| {
            b.iter(|| convert_with_extension(ext, black_box(&src), 1, &mut dst, 1, COUNT))
        });
    }
    group.finish();
}

fn bench_strided(c: &mut Criterion) {
    let width = 8;
    let src: Vec<u16> = (0..COUNT * width).map(|i| i as u16).collect();
    let mut column = vec![0i32; COUNT];

    c.bench_function("gather_column_u16_to_i32", |b| {
        b.iter(|| copy_convert_strided(black_box(&src), width, &mut column, 1, COUNT))
    });
}

fn bench_rows(c: &mut Criterion) {
    let (rows, cols) = (4096, 32);
    let src: Vec<f64> = (0..rows * cols).map(|i| i as f64).collect();
    let mut dst = vec![0i32; rows * cols];
    let copies: Vec<RowCopy> = (0..rows)
        .map(|r| RowCopy {
            src: ConstPtr(src[r * cols..].as_ptr() as *const u8),
            src_type: DataType::Float64,
            src_stride: 1,
            dst: MutPtr(dst[r * cols..].as_mut_ptr() as *mut u8),
            dst_type: DataType::Int32,
            dst_stride: 1,
        })
        .collect();

    let pool = ThreadPool::new();
    let mut group = c.benchmark_group("rows_f64_to_i32");
    group.throughput(Throughput::Elements((rows * cols) as u64));
    group.bench_function("parallel", |b| {
        b.iter(|| unsafe { copy_convert_rows(&pool, detected_cpu_extension(), black_box(&copies), cols) })
    });
    let single = ThreadPool::with_threads(0);
    group.bench_function("caller_only", |b| {
        b.iter(|| unsafe { copy_convert_rows(&single, detected_cpu_extension(), black_box(&copies), cols) })
    });
    group.finish();
}

criterion_group!(benches, bench_contiguous, bench_extensions, bench_strided, bench_rows);
criterion_main!(benches);
