//! Size arithmetic used at every buffer and kernel boundary.
//!
//! Overflow here is a caller contract violation, so these helpers panic
//! instead of returning an error.

/// `count * element_size`, panicking on overflow.
#[track_caller]
pub fn byte_len(count: usize, element_size: usize) -> usize {
    match count.checked_mul(element_size) {
        Some(bytes) => bytes,
        None => panic!(
            "Size overflow: {} elements of {} bytes do not fit in usize",
            count, element_size
        ),
    }
}

/// Number of bytes a strided run of `count` elements spans.
///
/// A run of zero elements spans nothing regardless of the stride.
#[track_caller]
pub fn strided_extent(count: usize, stride: usize, element_size: usize) -> usize {
    if count == 0 {
        return 0;
    }
    let last = (count - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(1));
    match last {
        Some(elements) => byte_len(elements, element_size),
        None => panic!(
            "Size overflow: strided run of {} elements with stride {}",
            count, stride
        ),
    }
}

#[track_caller]
pub fn product(a: usize, b: usize) -> usize {
    match a.checked_mul(b) {
        Some(v) => v,
        None => panic!("Size overflow: {} * {}", a, b),
    }
}
