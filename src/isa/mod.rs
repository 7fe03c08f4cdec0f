//! CPU instruction-set detection.
//!
//! The detected extension is probed once per process and never changes. Every
//! performance kernel is compiled once per [`CpuExtension`]; callers select a
//! variant through the strategy tables built on top of this value.

use std::sync::OnceLock;

use tracing::debug;

/// SIMD extension level, ordered from least to most capable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CpuExtension {
    /// Portable scalar code, always available.
    None = 0,
    Sse42 = 1,
    Avx = 2,
    Avx2 = 3,
    Avx512 = 4,
}

impl CpuExtension {
    pub const ALL: [CpuExtension; 5] = [
        CpuExtension::None,
        CpuExtension::Sse42,
        CpuExtension::Avx,
        CpuExtension::Avx2,
        CpuExtension::Avx512,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CpuExtension::None => "scalar",
            CpuExtension::Sse42 => "sse4.2",
            CpuExtension::Avx => "avx",
            CpuExtension::Avx2 => "avx2",
            CpuExtension::Avx512 => "avx512",
        }
    }

    /// Register width in bytes of the widest vector this level provides.
    pub const fn vector_bytes(self) -> usize {
        match self {
            CpuExtension::None => 8,
            CpuExtension::Sse42 => 16,
            CpuExtension::Avx | CpuExtension::Avx2 => 32,
            CpuExtension::Avx512 => 64,
        }
    }

    /// Lowers `self` to what the running CPU supports.
    pub fn clamp_to_detected(self) -> CpuExtension {
        self.min(detected())
    }
}

impl std::fmt::Display for CpuExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

static DETECTED: OnceLock<CpuExtension> = OnceLock::new();

/// The best extension usable on this machine, probed on first call.
pub fn detected() -> CpuExtension {
    *DETECTED.get_or_init(|| {
        let ext = probe();
        debug!(extension = ext.name(), "detected cpu extension");
        ext
    })
}

#[cfg(target_arch = "x86_64")]
fn probe() -> CpuExtension {
    if is_x86_feature_detected!("avx512f") {
        CpuExtension::Avx512
    } else if is_x86_feature_detected!("avx2") {
        CpuExtension::Avx2
    } else if is_x86_feature_detected!("avx") {
        CpuExtension::Avx
    } else if is_x86_feature_detected!("sse4.2") {
        CpuExtension::Sse42
    } else {
        CpuExtension::None
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn probe() -> CpuExtension {
    CpuExtension::None
}
