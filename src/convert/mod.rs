//! Element-wise type-converting copies between strided buffers.
//!
//! Every entry point funnels into one dispatch: (source type, destination
//! type) picks a row of the strategy table for the active CPU extension, and
//! the strides pick one of four access-pattern kernels. Conversions follow
//! `as`-cast semantics; narrowing is silent by contract.

mod batch;
mod kernels;
mod table;

pub use batch::{ConvertKernel, RowCopy, copy_convert_rows};

use crate::dtype::{DataType, Element};
use crate::isa::CpuExtension;
use crate::utils::checked::strided_extent;

use table::ConvertTable;

/// Converts `src` into `dst` element by element. Lengths must match.
#[track_caller]
pub fn copy_convert<S: Element, D: Element>(src: &[S], dst: &mut [D]) {
    assert_eq!(
        src.len(),
        dst.len(),
        "copy_convert length mismatch: {} source elements, {} destination",
        src.len(),
        dst.len()
    );
    unsafe {
        dispatch(
            ConvertTable::active(),
            src.as_ptr() as *const u8,
            S::DATA_TYPE,
            1,
            dst.as_mut_ptr() as *mut u8,
            D::DATA_TYPE,
            1,
            src.len(),
        )
    }
}

/// Converts `count` elements read every `src_stride` elements of `src` into
/// every `dst_stride` elements of `dst`.
#[track_caller]
pub fn copy_convert_strided<S: Element, D: Element>(
    src: &[S],
    src_stride: usize,
    dst: &mut [D],
    dst_stride: usize,
    count: usize,
) {
    convert_with_extension(crate::isa::detected(), src, src_stride, dst, dst_stride, count);
}

/// [`copy_convert_strided`] through the kernels compiled for `ext`, lowered
/// to what this CPU supports. Returns the extension that actually ran.
#[track_caller]
pub fn convert_with_extension<S: Element, D: Element>(
    ext: CpuExtension,
    src: &[S],
    src_stride: usize,
    dst: &mut [D],
    dst_stride: usize,
    count: usize,
) -> CpuExtension {
    check_run(src.len(), src_stride, count, "source");
    check_run(dst.len(), dst_stride, count, "destination");
    let table = ConvertTable::for_extension(ext);
    unsafe {
        dispatch(
            table,
            src.as_ptr() as *const u8,
            S::DATA_TYPE,
            src_stride,
            dst.as_mut_ptr() as *mut u8,
            D::DATA_TYPE,
            dst_stride,
            count,
        )
    };
    table.extension()
}

/// Type-erased conversion over byte buffers. Strides are in elements.
/// Both buffers must be aligned for their element types and long enough
/// for the strided runs.
#[track_caller]
#[allow(clippy::too_many_arguments)]
pub fn copy_convert_bytes(
    src: &[u8],
    src_type: DataType,
    src_stride: usize,
    dst: &mut [u8],
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    assert!(src_stride > 0 && dst_stride > 0, "copy_convert strides must be positive");
    let src_extent = strided_extent(count, src_stride, src_type.size_in_bytes());
    let dst_extent = strided_extent(count, dst_stride, dst_type.size_in_bytes());
    assert!(
        src_extent <= src.len(),
        "source holds {} bytes, {} needed",
        src.len(),
        src_extent
    );
    assert!(
        dst_extent <= dst.len(),
        "destination holds {} bytes, {} needed",
        dst.len(),
        dst_extent
    );
    unsafe {
        copy_convert_raw(
            src.as_ptr(),
            src_type,
            src_stride,
            dst.as_mut_ptr(),
            dst_type,
            dst_stride,
            count,
        )
    }
}

/// Type-erased conversion over raw pointers.
///
/// # Safety
/// `src` must be valid for reads and `dst` for writes of the strided runs of
/// `count` elements, both aligned for their types, and the runs must not
/// overlap.
#[track_caller]
#[allow(clippy::too_many_arguments)]
pub unsafe fn copy_convert_raw(
    src: *const u8,
    src_type: DataType,
    src_stride: usize,
    dst: *mut u8,
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    check_pointers(src, src_type, dst, dst_type, count);
    unsafe {
        dispatch(
            ConvertTable::active(),
            src,
            src_type,
            src_stride,
            dst,
            dst_type,
            dst_stride,
            count,
        )
    }
}

#[track_caller]
fn check_run(len: usize, stride: usize, count: usize, side: &str) {
    assert!(stride > 0, "copy_convert {} stride must be positive", side);
    let needed = strided_extent(count, stride, 1);
    assert!(
        needed <= len,
        "copy_convert {} holds {} elements, {} needed for {} with stride {}",
        side,
        len,
        needed,
        count,
        stride
    );
}

#[track_caller]
pub(crate) fn check_pointers(
    src: *const u8,
    src_type: DataType,
    dst: *mut u8,
    dst_type: DataType,
    count: usize,
) {
    if count == 0 {
        return;
    }
    assert!(!src.is_null(), "copy_convert source is null with {} elements", count);
    assert!(!dst.is_null(), "copy_convert destination is null with {} elements", count);
    assert!(
        src.align_offset(src_type.size_in_bytes()) == 0,
        "copy_convert source is misaligned for {}",
        src_type
    );
    assert!(
        dst.align_offset(dst_type.size_in_bytes()) == 0,
        "copy_convert destination is misaligned for {}",
        dst_type
    );
}

#[allow(clippy::too_many_arguments)]
#[inline]
unsafe fn dispatch(
    table: &ConvertTable,
    src: *const u8,
    src_type: DataType,
    src_stride: usize,
    dst: *mut u8,
    dst_type: DataType,
    dst_stride: usize,
    count: usize,
) {
    if count == 0 {
        return;
    }
    let kernel = table.get(src_type, dst_type).select(src_stride, dst_stride);
    unsafe { kernel(src, src_stride, dst, dst_stride, count) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_toward_zero() {
        let src = [3.9f64, -3.9, 0.5, -0.5];
        let mut dst = [0i32; 4];
        copy_convert(&src, &mut dst);
        assert_eq!(dst, [3, -3, 0, 0]);
    }

    #[test]
    fn strided_both_sides() {
        let src: Vec<u16> = (0..12).collect();
        let mut dst = vec![0f32; 9];
        copy_convert_strided(&src, 4, &mut dst, 3, 3);
        assert_eq!(dst, vec![0.0, 0.0, 0.0, 4.0, 0.0, 0.0, 8.0, 0.0, 0.0]);
    }

    #[test]
    fn byte_entry_converts() {
        let src: Vec<i64> = vec![-1, 256, 70000];
        let mut dst = vec![0u16; 3];
        copy_convert_bytes(
            bytemuck::cast_slice(src.as_slice()),
            DataType::Int64,
            1,
            bytemuck::cast_slice_mut(dst.as_mut_slice()),
            DataType::UInt16,
            1,
            3,
        );
        assert_eq!(dst, vec![u16::MAX, 256, 70000u32 as u16]);
    }

    #[test]
    fn zero_count_touches_nothing() {
        let src: [f32; 0] = [];
        let mut dst: [f64; 0] = [];
        copy_convert(&src, &mut dst);
        unsafe {
            copy_convert_raw(
                std::ptr::null(),
                DataType::Float32,
                1,
                std::ptr::null_mut(),
                DataType::Float64,
                1,
                0,
            )
        };
    }

    #[test]
    #[should_panic(expected = "null")]
    fn null_with_elements_panics() {
        let mut dst = [0u8; 4];
        unsafe {
            copy_convert_raw(
                std::ptr::null(),
                DataType::UInt8,
                1,
                dst.as_mut_ptr(),
                DataType::UInt8,
                1,
                4,
            )
        };
    }

    #[test]
    #[should_panic(expected = "needed")]
    fn short_destination_panics() {
        let src = [1i8; 4];
        let mut dst = [0i8; 6];
        copy_convert_strided(&src, 1, &mut dst, 2, 4);
    }

    #[test]
    fn every_extension_matches_scalar() {
        let src: Vec<f32> = (0..257).map(|i| i as f32 * 1.37 - 100.0).collect();
        let mut reference = vec![0i16; src.len()];
        convert_with_extension(CpuExtension::None, &src, 1, &mut reference, 1, src.len());
        for ext in CpuExtension::ALL {
            let mut out = vec![0i16; src.len()];
            let used = convert_with_extension(ext, &src, 1, &mut out, 1, src.len());
            assert!(used <= ext);
            assert_eq!(out, reference, "extension {}", used);
        }
    }
}
