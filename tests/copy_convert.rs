//! Conversion results checked element by element against plain `as` casts,
//! for every type pair, access pattern and CPU extension.

use dal_table::{
    CastInto, ConstPtr, CpuExtension, DataType, Element, MutPtr, RowCopy, ThreadPool,
    convert_with_extension, copy_convert, copy_convert_bytes, copy_convert_rows,
    dispatch_data_type,
};
use proptest::prelude::*;

trait Sample: Element {
    fn samples() -> Vec<Self>;
    fn same(a: Self, b: Self) -> bool;
}

macro_rules! int_samples {
    ($($t:ty),*) => {
        $(impl Sample for $t {
            fn samples() -> Vec<Self> {
                vec![0, 1, 42, <$t>::MIN, <$t>::MAX, <$t>::MIN.wrapping_add(1), <$t>::MAX - 1, <$t>::MAX / 3]
            }

            fn same(a: Self, b: Self) -> bool {
                a == b
            }
        })*
    };
}

macro_rules! float_samples {
    ($($t:ty),*) => {
        $(impl Sample for $t {
            fn samples() -> Vec<Self> {
                vec![
                    0.0, -0.0, 3.9, -3.9, 0.5, -0.5, 255.5, 65536.25, -129.0,
                    1e10, -1e10, <$t>::MAX, <$t>::MIN, <$t>::NAN, <$t>::INFINITY,
                    <$t>::NEG_INFINITY, <$t>::EPSILON,
                ]
            }

            fn same(a: Self, b: Self) -> bool {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
        })*
    };
}

int_samples!(i8, i16, i32, i64, u8, u16, u32, u64);
float_samples!(f32, f64);

fn source_of<S: Sample>(count: usize) -> Vec<S> {
    S::samples().into_iter().cycle().take(count).collect()
}

fn check_contiguous<S: Sample + CastInto<D>, D: Sample>() {
    for count in [1, 2, 7, 16, 33, 100] {
        let src = source_of::<S>(count);
        let mut out = vec![D::zeroed(); count];
        copy_convert(&src, &mut out);
        for (i, (&s, &d)) in src.iter().zip(&out).enumerate() {
            assert!(
                D::same(s.cast(), d),
                "{} -> {} element {} of {}: {:?} became {:?}",
                S::DATA_TYPE,
                D::DATA_TYPE,
                i,
                count,
                s,
                d
            );
        }
    }
}

fn check_strided<S: Sample + CastInto<D>, D: Sample>() {
    let count = 21;
    for (src_stride, dst_stride) in [(1, 3), (4, 1), (2, 5)] {
        let src = source_of::<S>(count * src_stride);
        let sentinel = D::samples()[2];
        for ext in CpuExtension::ALL {
            let mut out = vec![sentinel; count * dst_stride];
            convert_with_extension(ext, &src, src_stride, &mut out, dst_stride, count);
            for i in 0..count * dst_stride {
                let expected = if i % dst_stride == 0 {
                    src[(i / dst_stride) * src_stride].cast()
                } else {
                    sentinel
                };
                assert!(
                    D::same(expected, out[i]),
                    "{} -> {} strides {}/{} on {}: index {}",
                    S::DATA_TYPE,
                    D::DATA_TYPE,
                    src_stride,
                    dst_stride,
                    ext,
                    i
                );
            }
        }
    }
}

fn for_each_pair(check: &dyn Fn(DataType, DataType)) {
    for src in DataType::ALL {
        for dst in DataType::ALL {
            check(src, dst);
        }
    }
}

#[test]
fn contiguous_matches_cast_for_every_pair() {
    for_each_pair(&|src, dst| {
        dispatch_data_type!(src, S => dispatch_data_type!(dst, D => check_contiguous::<S, D>()))
    });
}

#[test]
fn strided_patterns_match_cast_for_every_pair() {
    for_each_pair(&|src, dst| {
        dispatch_data_type!(src, S => dispatch_data_type!(dst, D => check_strided::<S, D>()))
    });
}

#[test]
fn truncation_follows_cast_semantics() {
    let src = [3.9f32, -3.9, 2.5e9, f32::NAN];
    let mut out = [0i32; 4];
    copy_convert(&src, &mut out);
    assert_eq!(out, [3, -3, i32::MAX, 0]);

    let wide = [300i32, -1, 65_535];
    let mut narrow = [0u8; 3];
    copy_convert(&wide, &mut narrow);
    assert_eq!(narrow, [44, 255, 255]);
}

#[test]
fn byte_entry_matches_typed_entry() {
    let src: Vec<f64> = (0..40).map(|i| i as f64 * -2.75).collect();
    let mut typed = vec![0i16; 40];
    copy_convert(&src, &mut typed);

    let mut bytes = vec![0i16; 40];
    copy_convert_bytes(
        bytemuck::cast_slice(src.as_slice()),
        DataType::Float64,
        1,
        bytemuck::cast_slice_mut(bytes.as_mut_slice()),
        DataType::Int16,
        1,
        40,
    );
    assert_eq!(typed, bytes);
}

fn rows_converted<S: Sample + CastInto<D>, D: Sample>(pool: &ThreadPool, rows: usize, width: usize) -> Vec<D> {
    let src = source_of::<S>(rows * width);
    let mut dst = vec![D::zeroed(); rows * width];
    let copies: Vec<RowCopy> = (0..rows)
        .map(|r| RowCopy {
            src: ConstPtr(src[r * width..].as_ptr() as *const u8),
            src_type: S::DATA_TYPE,
            src_stride: 1,
            dst: MutPtr(dst[r * width..].as_mut_ptr() as *mut u8),
            dst_type: D::DATA_TYPE,
            dst_stride: 1,
        })
        .collect();
    unsafe { copy_convert_rows(pool, dal_table::detected_cpu_extension(), &copies, width) };
    dst
}

fn check_threads_agree<S: Sample + CastInto<D>, D: Sample>(parallel: &ThreadPool, serial: &ThreadPool) {
    for rows in [0, 1, 15, 16, 17, 250, 2048] {
        let a = rows_converted::<S, D>(parallel, rows, 5);
        let b = rows_converted::<S, D>(serial, rows, 5);
        assert!(
            a.iter().zip(&b).all(|(&x, &y)| D::same(x, y)),
            "{} -> {} with {} rows differs between pools",
            S::DATA_TYPE,
            D::DATA_TYPE,
            rows
        );
    }
}

#[test]
fn multi_threaded_rows_match_single_threaded() {
    let parallel = ThreadPool::with_threads(4);
    let serial = ThreadPool::with_threads(0);
    for_each_pair(&|src, dst| {
        dispatch_data_type!(src, S => dispatch_data_type!(dst, D => check_threads_agree::<S, D>(&parallel, &serial)))
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_f64_to_i32_rows(values in prop::collection::vec(-1e12f64..1e12, 0..3000), width in 1usize..9) {
        let rows = values.len() / width;
        let src = &values[..rows * width];
        let mut dst = vec![0i32; src.len()];
        let copies: Vec<RowCopy> = (0..rows)
            .map(|r| RowCopy {
                src: ConstPtr(src[r * width..].as_ptr() as *const u8),
                src_type: DataType::Float64,
                src_stride: 1,
                dst: MutPtr(dst[r * width..].as_mut_ptr() as *mut u8),
                dst_type: DataType::Int32,
                dst_stride: 1,
            })
            .collect();
        let pool = ThreadPool::with_threads(3);
        unsafe { copy_convert_rows(&pool, CpuExtension::Avx512, &copies, width) };
        let expected: Vec<i32> = src.iter().map(|&v| v as i32).collect();
        prop_assert_eq!(dst, expected);
    }

    #[test]
    fn every_extension_agrees_with_scalar(values in prop::collection::vec(any::<i64>(), 0..512)) {
        let mut reference = vec![0f32; values.len()];
        convert_with_extension(CpuExtension::None, &values, 1, &mut reference, 1, values.len());
        for ext in CpuExtension::ALL {
            let mut out = vec![0f32; values.len()];
            convert_with_extension(ext, &values, 1, &mut out, 1, values.len());
            prop_assert_eq!(&out, &reference);
        }
    }
}
