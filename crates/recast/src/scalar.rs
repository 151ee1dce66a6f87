// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Leaf-level value conversion.
//!
//! The executor walks composite structure itself and hands every scalar
//! pair to a [`ScalarConverter`]. [`NativeConverter`] covers integers of
//! any width up to 64 bits, `f32`/`f64` layouts, bitfields, booleans and
//! same-size opaque blobs. Out-of-range numeric values saturate.

use crate::descriptor::{FloatType, IntegerType, TypeDescriptor};
use thiserror::Error;

/// Failure converting a single scalar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ScalarError(pub String);

impl ScalarError {
    fn unsupported(source: &TypeDescriptor, target: &TypeDescriptor) -> Self {
        Self(format!("no scalar conversion from {} to {}", source, target))
    }
}

/// Converts one scalar value between layouts.
pub trait ScalarConverter: Send + Sync {
    /// Whether [`convert_scalar`](Self::convert_scalar) wants a scratch
    /// area of `max(source size, target size)` bytes for this pair.
    fn needs_scratch(&self, _source: &TypeDescriptor, _target: &TypeDescriptor) -> bool {
        false
    }

    /// Convert the value in `source` (laid out per `source_kind`) into
    /// `target` (laid out per `target_kind`).
    fn convert_scalar(
        &self,
        source: &[u8],
        source_kind: &TypeDescriptor,
        target: &mut [u8],
        target_kind: &TypeDescriptor,
        scratch: Option<&mut [u8]>,
    ) -> Result<(), ScalarError>;
}

/// Little-endian native scalar conversions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConverter;

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i128),
    Float(f64),
}

fn check_len(bytes: &[u8], needed: usize) -> Result<(), ScalarError> {
    if bytes.len() < needed {
        return Err(ScalarError(format!(
            "need {} bytes, got {}",
            needed,
            bytes.len()
        )));
    }
    Ok(())
}

/// Sign- or zero-extend an integer stored in the low `byte_size` bytes.
pub(crate) fn decode_integer(bytes: &[u8], int: IntegerType) -> i128 {
    let n = int.byte_size().min(16).min(bytes.len());
    let mut raw = [0u8; 16];
    raw[..n].copy_from_slice(&bytes[..n]);
    let width = int.width_bits;
    let mut value = u128::from_le_bytes(raw);
    if width < 128 {
        value &= (1u128 << width) - 1;
    }
    if int.signed && width > 0 && (value >> (width - 1)) & 1 == 1 {
        (value as i128) - (1i128 << width)
    } else {
        value as i128
    }
}

/// Store `value` clamped to the range of `int`.
pub(crate) fn encode_integer(value: i128, int: IntegerType, out: &mut [u8]) {
    let clamped = value.clamp(int.min_value(), int.max_value());
    let mask = if int.width_bits >= 128 {
        u128::MAX
    } else {
        (1u128 << int.width_bits) - 1
    };
    let raw = (clamped as u128) & mask;
    let n = int.byte_size().min(out.len());
    out[..n].copy_from_slice(&raw.to_le_bytes()[..n]);
}

fn decode_float(bytes: &[u8], float: FloatType) -> Result<f64, ScalarError> {
    check_len(bytes, float.byte_size())?;
    if float == FloatType::F32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        Ok(f64::from(f32::from_le_bytes(raw)))
    } else if float == FloatType::F64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        Ok(f64::from_le_bytes(raw))
    } else {
        Err(ScalarError(format!("unsupported float layout {}", float)))
    }
}

fn encode_float(value: f64, float: FloatType, out: &mut [u8]) -> Result<(), ScalarError> {
    check_len(out, float.byte_size())?;
    if float == FloatType::F32 {
        out[..4].copy_from_slice(&(value as f32).to_le_bytes());
        Ok(())
    } else if float == FloatType::F64 {
        out[..8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    } else {
        Err(ScalarError(format!("unsupported float layout {}", float)))
    }
}

fn decode_number(bytes: &[u8], kind: &TypeDescriptor) -> Result<Number, ScalarError> {
    match kind {
        TypeDescriptor::Integer(int) => {
            check_len(bytes, int.byte_size())?;
            Ok(Number::Int(decode_integer(bytes, *int)))
        }
        TypeDescriptor::Float(float) => Ok(Number::Float(decode_float(bytes, *float)?)),
        other => Err(ScalarError(format!("{} is not numeric", other))),
    }
}

fn encode_number(value: Number, kind: &TypeDescriptor, out: &mut [u8]) -> Result<(), ScalarError> {
    match (value, kind) {
        (Number::Int(v), TypeDescriptor::Integer(int)) => {
            check_len(out, int.byte_size())?;
            encode_integer(v, *int, out);
            Ok(())
        }
        (Number::Float(v), TypeDescriptor::Integer(int)) => {
            check_len(out, int.byte_size())?;
            // `as` saturates and maps NaN to zero.
            encode_integer(v.trunc() as i128, *int, out);
            Ok(())
        }
        (Number::Int(v), TypeDescriptor::Float(float)) => encode_float(v as f64, *float, out),
        (Number::Float(v), TypeDescriptor::Float(float)) => encode_float(v, *float, out),
        (_, other) => Err(ScalarError(format!("{} is not numeric", other))),
    }
}

fn bitfield_mask(width_bits: u32) -> u64 {
    if width_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << width_bits) - 1
    }
}

impl ScalarConverter for NativeConverter {
    /// Widening bitfields are staged through zeroed scratch space.
    fn needs_scratch(&self, source: &TypeDescriptor, target: &TypeDescriptor) -> bool {
        matches!(
            (source, target),
            (TypeDescriptor::Bitfield { width_bits: s }, TypeDescriptor::Bitfield { width_bits: t })
                if t > s
        )
    }

    fn convert_scalar(
        &self,
        source: &[u8],
        source_kind: &TypeDescriptor,
        target: &mut [u8],
        target_kind: &TypeDescriptor,
        scratch: Option<&mut [u8]>,
    ) -> Result<(), ScalarError> {
        check_len(source, source_kind.byte_size())?;
        check_len(target, target_kind.byte_size())?;

        match (source_kind, target_kind) {
            (s, t) if s.is_numeric() && t.is_numeric() => {
                let value = decode_number(source, s)?;
                encode_number(value, t, target)
            }
            (TypeDescriptor::Boolean, TypeDescriptor::Boolean) => {
                target[0] = u8::from(source[0] != 0);
                Ok(())
            }
            (TypeDescriptor::Bitfield { width_bits: s }, TypeDescriptor::Bitfield { width_bits: t }) => {
                let src_len = source_kind.byte_size();
                let dst_len = target_kind.byte_size();
                let mut raw = [0u8; 8];
                if t > s {
                    let stage = scratch
                        .ok_or_else(|| ScalarError("bitfield widening needs scratch".into()))?;
                    check_len(stage, dst_len)?;
                    stage.fill(0);
                    stage[..src_len].copy_from_slice(&source[..src_len]);
                    raw[..dst_len].copy_from_slice(&stage[..dst_len]);
                } else {
                    raw[..dst_len].copy_from_slice(&source[..dst_len]);
                }
                let bits = u64::from_le_bytes(raw) & bitfield_mask(*s) & bitfield_mask(*t);
                target[..dst_len].copy_from_slice(&bits.to_le_bytes()[..dst_len]);
                Ok(())
            }
            (TypeDescriptor::Opaque { byte_length: s }, TypeDescriptor::Opaque { byte_length: t })
                if s == t =>
            {
                target[..*t].copy_from_slice(&source[..*s]);
                Ok(())
            }
            _ => Err(ScalarError::unsupported(source_kind, target_kind)),
        }
    }
}
