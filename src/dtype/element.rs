use std::fmt::Debug;

use bytemuck::Pod;

use super::data_type::DataType;

/// A Rust scalar that can live in a table column.
pub trait Element: Pod + Debug + PartialEq + Send + Sync + 'static {
    const DATA_TYPE: DataType;
}

/// Numeric conversion with the semantics of an `as` cast: integer narrowing
/// wraps, float to integer truncates toward zero and saturates, NaN becomes 0.
pub trait CastInto<D>: Copy {
    fn cast(self) -> D;
}

macro_rules! impl_element {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(impl Element for $t {
            const DATA_TYPE: DataType = DataType::$dt;
        })*
    };
}

impl_element!(
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

macro_rules! impl_cast_from {
    ($src:ty => $($dst:ty),*) => {
        $(impl CastInto<$dst> for $src {
            #[inline(always)]
            fn cast(self) -> $dst {
                self as $dst
            }
        })*
    };
}

macro_rules! impl_cast_all {
    ($($src:ty),*) => {
        $(impl_cast_from!($src => i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);)*
    };
}

impl_cast_all!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Expands `$body` with `$T` bound to the Rust type for `$dtype`.
#[macro_export]
macro_rules! dispatch_data_type {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            $crate::DataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::DataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::DataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::DataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::DataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::DataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::DataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::DataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::DataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::DataType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}
