// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Numeric capacity and its partial order.
//!
//! Every integer or float layout maps to a [`Capacity`] triple: value bits
//! (integers exclude the sign bit, floats count stored mantissa bits),
//! exponent bits and signedness. One layout can represent every value of
//! another only if its triple is pointwise at least as large, which makes
//! the order partial: `u16` and `i16` are unordered.

use crate::descriptor::{FloatType, IntegerType, TypeDescriptor};
use std::cmp::Ordering;

/// Representational capacity of a numeric layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capacity {
    /// Value bits (excluding sign).
    pub precision: u32,
    /// Exponent bits, zero for integers.
    pub exponent: u32,
    pub signed: bool,
}

impl Capacity {
    pub fn of_integer(int: IntegerType) -> Self {
        Self {
            precision: if int.signed {
                int.width_bits.saturating_sub(1)
            } else {
                int.width_bits
            },
            exponent: 0,
            signed: int.signed,
        }
    }

    pub fn of_float(float: FloatType) -> Self {
        Self {
            precision: float.mantissa_bits,
            exponent: float.exponent_bits,
            signed: true,
        }
    }

    /// Capacity of a numeric descriptor, `None` for anything else.
    pub fn of(descriptor: &TypeDescriptor) -> Option<Self> {
        match descriptor {
            TypeDescriptor::Integer(int) => Some(Self::of_integer(*int)),
            TypeDescriptor::Float(float) => Some(Self::of_float(*float)),
            _ => None,
        }
    }

    /// Smallest capacity covering both.
    pub fn union(self, other: Self) -> Self {
        Self {
            precision: self.precision.max(other.precision),
            exponent: self.exponent.max(other.exponent),
            signed: self.signed || other.signed,
        }
    }

    /// Whether every value representable under `other` is representable here.
    pub fn covers(&self, other: &Self) -> bool {
        matches!(
            self.partial_cmp(other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

impl PartialOrd for Capacity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let parts = [
            self.precision.cmp(&other.precision),
            self.exponent.cmp(&other.exponent),
            self.signed.cmp(&other.signed),
        ];
        let less = parts.contains(&Ordering::Less);
        let greater = parts.contains(&Ordering::Greater);
        match (less, greater) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (true, true) => None,
        }
    }
}

/// Compare two numeric descriptors by capacity.
///
/// Returns `None` when either is not numeric or the pair is unordered.
pub fn compare(a: &TypeDescriptor, b: &TypeDescriptor) -> Option<Ordering> {
    Capacity::of(a)?.partial_cmp(&Capacity::of(b)?)
}

/// Whether converting `source` into `target` can lose numeric information.
///
/// Unordered pairs count as narrowing.
pub fn is_narrowing(source: &TypeDescriptor, target: &TypeDescriptor) -> bool {
    !matches!(
        compare(target, source),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(int: IntegerType) -> TypeDescriptor {
        TypeDescriptor::from(int)
    }

    #[test]
    fn test_integer_capacity_excludes_sign() {
        let c = Capacity::of_integer(IntegerType::I16);
        assert_eq!((c.precision, c.exponent, c.signed), (15, 0, true));
        assert_eq!(Capacity::of_integer(IntegerType::U16).precision, 16);
        assert_eq!(Capacity::of_integer(IntegerType::new(0, true)).precision, 0);
    }

    #[test]
    fn test_partial_order() {
        assert_eq!(
            compare(&int(IntegerType::I32), &int(IntegerType::I16)),
            Some(Ordering::Greater)
        );
        assert_eq!(compare(&int(IntegerType::U16), &int(IntegerType::I16)), None);
        assert_eq!(
            compare(&TypeDescriptor::from(FloatType::F64), &int(IntegerType::I32)),
            Some(Ordering::Greater)
        );
        // f64 cannot hold every i64, nor i64 every f64.
        assert_eq!(compare(&TypeDescriptor::from(FloatType::F64), &int(IntegerType::I64)), None);
    }

    #[test]
    fn test_narrowing() {
        assert!(!is_narrowing(&int(IntegerType::U8), &int(IntegerType::I16)));
        assert!(is_narrowing(&int(IntegerType::U16), &int(IntegerType::I16)));
        assert!(is_narrowing(&TypeDescriptor::from(FloatType::F32), &int(IntegerType::I64)));
        assert!(!is_narrowing(&int(IntegerType::I16), &TypeDescriptor::from(FloatType::F32)));
    }

    #[test]
    fn test_union() {
        let u = Capacity::of_integer(IntegerType::U8).union(Capacity::of_integer(IntegerType::I8));
        assert_eq!((u.precision, u.signed), (8, true));
        assert!(Capacity::of_integer(IntegerType::I16).covers(&u));
        assert!(!Capacity::of_integer(IntegerType::I8).covers(&u));
    }
}
