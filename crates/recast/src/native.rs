// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mapping between Rust primitives and their descriptors.

use crate::descriptor::{FloatType, IntegerType, TypeDescriptor};

/// A Rust scalar with a fixed little-endian layout.
pub trait Native: Copy + Send + Sync + 'static {
    /// Canonical type name, used by `DescriptorTable::register_native`.
    const NAME: &'static str;
    /// Encoded size in bytes.
    const SIZE: usize;

    fn descriptor() -> TypeDescriptor;

    /// Write `SIZE` bytes into the front of `out`.
    fn encode(&self, out: &mut [u8]);

    /// Read from the first `SIZE` bytes of `bytes`.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! native_int {
    ($($ty:ty => $name:literal, $layout:expr;)*) => {
        $(
            impl Native for $ty {
                const NAME: &'static str = $name;
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Integer($layout)
                }

                fn encode(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

native_int! {
    u8 => "u8", IntegerType::U8;
    u16 => "u16", IntegerType::U16;
    u32 => "u32", IntegerType::U32;
    u64 => "u64", IntegerType::U64;
    i8 => "i8", IntegerType::I8;
    i16 => "i16", IntegerType::I16;
    i32 => "i32", IntegerType::I32;
    i64 => "i64", IntegerType::I64;
}

impl Native for f32 {
    const NAME: &'static str = "f32";
    const SIZE: usize = 4;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Float(FloatType::F32)
    }

    fn encode(&self, out: &mut [u8]) {
        out[..4].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        f32::from_le_bytes(raw)
    }
}

impl Native for f64 {
    const NAME: &'static str = "f64";
    const SIZE: usize = 8;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Float(FloatType::F64)
    }

    fn encode(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }
}

impl Native for bool {
    const NAME: &'static str = "bool";
    const SIZE: usize = 1;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Boolean
    }

    fn encode(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Descriptor of a native type.
pub fn descriptor_of<T: Native>() -> TypeDescriptor {
    T::descriptor()
}
