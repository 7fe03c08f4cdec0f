//! Static dispatch tables: one per CPU extension, each indexed by
//! (source type, destination type).

use std::sync::OnceLock;

use tracing::debug;

use crate::dtype::DataType;
use crate::isa::{self, CpuExtension};

use super::kernels::{self, ConvertKernels};

pub(crate) struct ConvertTable {
    extension: CpuExtension,
    entries: [[ConvertKernels; DataType::COUNT]; DataType::COUNT],
}

impl ConvertTable {
    #[inline]
    pub(crate) fn get(&self, src: DataType, dst: DataType) -> &ConvertKernels {
        &self.entries[src.index()][dst.index()]
    }

    pub(crate) fn extension(&self) -> CpuExtension {
        self.extension
    }

    /// Table for `ext`, lowered to what the running CPU supports so a
    /// variant using unavailable instructions is never returned.
    pub(crate) fn for_extension(ext: CpuExtension) -> &'static ConvertTable {
        #[cfg(target_arch = "x86_64")]
        {
            match ext.clamp_to_detected() {
                CpuExtension::None => &SCALAR,
                CpuExtension::Sse42 => &SSE42,
                CpuExtension::Avx => &AVX,
                CpuExtension::Avx2 => &AVX2,
                CpuExtension::Avx512 => &AVX512,
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = ext;
            &SCALAR
        }
    }

    /// Table for the detected extension, resolved once per process.
    pub(crate) fn active() -> &'static ConvertTable {
        static ACTIVE: OnceLock<&'static ConvertTable> = OnceLock::new();
        ACTIVE.get_or_init(|| {
            let table = Self::for_extension(isa::detected());
            debug!(extension = table.extension.name(), "copy-convert dispatch table selected");
            table
        })
    }
}

macro_rules! pair {
    ($isa:ident, $S:ty, $D:ty) => {
        ConvertKernels {
            contiguous: kernels::$isa::contiguous::<$S, $D>,
            contiguous_to_strided: kernels::$isa::contiguous_to_strided::<$S, $D>,
            strided_to_contiguous: kernels::$isa::strided_to_contiguous::<$S, $D>,
            strided: kernels::$isa::strided::<$S, $D>,
        }
    };
}

// Column order follows DataType::index().
macro_rules! from_type {
    ($isa:ident, $S:ty) => {
        [
            pair!($isa, $S, i8),
            pair!($isa, $S, i16),
            pair!($isa, $S, i32),
            pair!($isa, $S, i64),
            pair!($isa, $S, u8),
            pair!($isa, $S, u16),
            pair!($isa, $S, u32),
            pair!($isa, $S, u64),
            pair!($isa, $S, f32),
            pair!($isa, $S, f64),
        ]
    };
}

macro_rules! convert_table {
    ($isa:ident, $ext:expr) => {
        ConvertTable {
            extension: $ext,
            entries: [
                from_type!($isa, i8),
                from_type!($isa, i16),
                from_type!($isa, i32),
                from_type!($isa, i64),
                from_type!($isa, u8),
                from_type!($isa, u16),
                from_type!($isa, u32),
                from_type!($isa, u64),
                from_type!($isa, f32),
                from_type!($isa, f64),
            ],
        }
    };
}

static SCALAR: ConvertTable = convert_table!(scalar, CpuExtension::None);
#[cfg(target_arch = "x86_64")]
static SSE42: ConvertTable = convert_table!(sse42, CpuExtension::Sse42);
#[cfg(target_arch = "x86_64")]
static AVX: ConvertTable = convert_table!(avx, CpuExtension::Avx);
#[cfg(target_arch = "x86_64")]
static AVX2: ConvertTable = convert_table!(avx2, CpuExtension::Avx2);
#[cfg(target_arch = "x86_64")]
static AVX512: ConvertTable = convert_table!(avx512, CpuExtension::Avx512);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_follow_data_type_order() {
        let table = ConvertTable::for_extension(CpuExtension::None);
        let src = [-2i16, 70, 300];
        for dst_type in DataType::ALL {
            let kernels = table.get(DataType::Int16, dst_type);
            let mut out = [0u64; 3];
            unsafe {
                (kernels.contiguous)(src.as_ptr() as *const u8, 1, out.as_mut_ptr() as *mut u8, 1, 3)
            };
            let first = &bytemuck::cast_slice::<u64, u8>(&out)[..dst_type.size_in_bytes()];
            let expected: Vec<u8> = match dst_type {
                DataType::Int8 => (-2i8).to_ne_bytes().to_vec(),
                DataType::Int16 => (-2i16).to_ne_bytes().to_vec(),
                DataType::Int32 => (-2i32).to_ne_bytes().to_vec(),
                DataType::Int64 => (-2i64).to_ne_bytes().to_vec(),
                DataType::UInt8 => (-2i16 as u8).to_ne_bytes().to_vec(),
                DataType::UInt16 => (-2i16 as u16).to_ne_bytes().to_vec(),
                DataType::UInt32 => (-2i16 as u32).to_ne_bytes().to_vec(),
                DataType::UInt64 => (-2i16 as u64).to_ne_bytes().to_vec(),
                DataType::Float32 => (-2.0f32).to_ne_bytes().to_vec(),
                DataType::Float64 => (-2.0f64).to_ne_bytes().to_vec(),
            };
            assert_eq!(first, expected.as_slice(), "int16 -> {}", dst_type);
        }
    }

    #[test]
    fn requested_extension_is_clamped() {
        let table = ConvertTable::for_extension(CpuExtension::Avx512);
        assert!(table.extension() <= isa::detected());
        assert_eq!(ConvertTable::active().extension(), ConvertTable::for_extension(isa::detected()).extension());
    }
}
