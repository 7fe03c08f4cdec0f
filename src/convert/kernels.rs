//! Conversion loops, one monomorphized copy per (source, destination) type
//! pair and per CPU extension.
//!
//! The loop bodies are written once, `#[inline(always)]`, and wrapped by thin
//! per-extension entry points carrying `#[target_feature]`, so the compiler
//! vectorizes each copy for the instruction set it is allowed to use.

use std::ptr;
use std::slice;

use crate::dtype::{CastInto, Element};

/// Converts `count` elements. Strides are in elements of the respective type
/// and are ignored by the contiguous variants.
pub(crate) type ConvertFn =
    unsafe fn(src: *const u8, src_stride: usize, dst: *mut u8, dst_stride: usize, count: usize);

/// The four access patterns of one type pair.
#[derive(Clone, Copy)]
pub(crate) struct ConvertKernels {
    pub contiguous: ConvertFn,
    pub contiguous_to_strided: ConvertFn,
    pub strided_to_contiguous: ConvertFn,
    pub strided: ConvertFn,
}

impl ConvertKernels {
    #[inline]
    pub(crate) fn select(&self, src_stride: usize, dst_stride: usize) -> ConvertFn {
        match (src_stride == 1, dst_stride == 1) {
            (true, true) => self.contiguous,
            (true, false) => self.contiguous_to_strided,
            (false, true) => self.strided_to_contiguous,
            (false, false) => self.strided,
        }
    }
}

#[inline(always)]
unsafe fn contiguous_body<S, D>(src: *const u8, dst: *mut u8, count: usize)
where
    S: Element + CastInto<D>,
    D: Element,
{
    if S::DATA_TYPE == D::DATA_TYPE {
        unsafe { ptr::copy_nonoverlapping(src, dst, count * size_of::<S>()) };
        return;
    }
    let src = unsafe { slice::from_raw_parts(src as *const S, count) };
    let dst = unsafe { slice::from_raw_parts_mut(dst as *mut D, count) };
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s.cast();
    }
}

#[inline(always)]
unsafe fn contiguous_to_strided_body<S, D>(src: *const u8, dst: *mut u8, dst_stride: usize, count: usize)
where
    S: Element + CastInto<D>,
    D: Element,
{
    let src = unsafe { slice::from_raw_parts(src as *const S, count) };
    let dst = dst as *mut D;
    for (i, &s) in src.iter().enumerate() {
        unsafe { dst.add(i * dst_stride).write(s.cast()) };
    }
}

#[inline(always)]
unsafe fn strided_to_contiguous_body<S, D>(src: *const u8, src_stride: usize, dst: *mut u8, count: usize)
where
    S: Element + CastInto<D>,
    D: Element,
{
    let src = src as *const S;
    let dst = unsafe { slice::from_raw_parts_mut(dst as *mut D, count) };
    for (i, d) in dst.iter_mut().enumerate() {
        *d = unsafe { src.add(i * src_stride).read() }.cast();
    }
}

#[inline(always)]
unsafe fn strided_body<S, D>(src: *const u8, src_stride: usize, dst: *mut u8, dst_stride: usize, count: usize)
where
    S: Element + CastInto<D>,
    D: Element,
{
    let src = src as *const S;
    let dst = dst as *mut D;
    for i in 0..count {
        unsafe { dst.add(i * dst_stride).write(src.add(i * src_stride).read().cast()) };
    }
}

macro_rules! isa_variant {
    ($(#[$meta:meta])* $module:ident $(, $feature:literal)?) => {
        $(#[$meta])*
        pub(crate) mod $module {
            use super::*;

            $(#[target_feature(enable = $feature)])?
            pub(crate) unsafe fn contiguous<S: Element + CastInto<D>, D: Element>(
                src: *const u8,
                _src_stride: usize,
                dst: *mut u8,
                _dst_stride: usize,
                count: usize,
            ) {
                unsafe { contiguous_body::<S, D>(src, dst, count) }
            }

            $(#[target_feature(enable = $feature)])?
            pub(crate) unsafe fn contiguous_to_strided<S: Element + CastInto<D>, D: Element>(
                src: *const u8,
                _src_stride: usize,
                dst: *mut u8,
                dst_stride: usize,
                count: usize,
            ) {
                unsafe { contiguous_to_strided_body::<S, D>(src, dst, dst_stride, count) }
            }

            $(#[target_feature(enable = $feature)])?
            pub(crate) unsafe fn strided_to_contiguous<S: Element + CastInto<D>, D: Element>(
                src: *const u8,
                src_stride: usize,
                dst: *mut u8,
                _dst_stride: usize,
                count: usize,
            ) {
                unsafe { strided_to_contiguous_body::<S, D>(src, src_stride, dst, count) }
            }

            $(#[target_feature(enable = $feature)])?
            pub(crate) unsafe fn strided<S: Element + CastInto<D>, D: Element>(
                src: *const u8,
                src_stride: usize,
                dst: *mut u8,
                dst_stride: usize,
                count: usize,
            ) {
                unsafe { strided_body::<S, D>(src, src_stride, dst, dst_stride, count) }
            }
        }
    };
}

isa_variant!(scalar);
isa_variant!(#[cfg(target_arch = "x86_64")] sse42, "sse4.2");
isa_variant!(#[cfg(target_arch = "x86_64")] avx, "avx");
isa_variant!(#[cfg(target_arch = "x86_64")] avx2, "avx2");
isa_variant!(#[cfg(target_arch = "x86_64")] avx512, "avx512f");
