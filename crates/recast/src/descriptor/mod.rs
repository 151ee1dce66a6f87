// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptors for self-describing binary records.
//!
//! A [`TypeDescriptor`] states the exact byte layout of one record: scalar
//! widths, member offsets, array shapes and which parts live out of line.
//! Descriptors are immutable once built and share nested parts through
//! `Arc`, so cloning one is cheap.

mod builder;

pub use builder::{CompoundBuilder, EnumBuilder};

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Size of an in-line reference to out-of-line data: a `u64` handle
/// followed by a `u64` length, both little-endian.
pub const REFERENCE_SIZE: usize = 16;

/// Largest integer or bitfield width the crate handles.
pub const MAX_SCALAR_BITS: u32 = 64;

/// Coarse classification of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Boolean,
    Integer,
    Float,
    Bitfield,
    String,
    Opaque,
    Enum,
    Array,
    Variable,
    Compound,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bitfield => "bitfield",
            Self::String => "string",
            Self::Opaque => "opaque",
            Self::Enum => "enum",
            Self::Array => "array",
            Self::Variable => "variable",
            Self::Compound => "compound",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Scalars
// ============================================================================

/// Two's complement or unsigned integer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntegerType {
    pub width_bits: u32,
    pub signed: bool,
}

impl IntegerType {
    pub const U8: Self = Self::new(8, false);
    pub const U16: Self = Self::new(16, false);
    pub const U32: Self = Self::new(32, false);
    pub const U64: Self = Self::new(64, false);
    pub const I8: Self = Self::new(8, true);
    pub const I16: Self = Self::new(16, true);
    pub const I32: Self = Self::new(32, true);
    pub const I64: Self = Self::new(64, true);

    pub const fn new(width_bits: u32, signed: bool) -> Self {
        Self { width_bits, signed }
    }

    /// Storage size in bytes.
    pub fn byte_size(&self) -> usize {
        (self.width_bits as usize).div_ceil(8)
    }

    // Width clamped to what the layout can store. Zero-width layouts hold
    // only zero.
    fn value_bits(&self) -> u32 {
        self.width_bits.min(MAX_SCALAR_BITS)
    }

    /// Smallest representable value.
    pub fn min_value(&self) -> i128 {
        match self.value_bits() {
            0 => 0,
            bits if self.signed => -(1i128 << (bits - 1)),
            _ => 0,
        }
    }

    /// Largest representable value.
    pub fn max_value(&self) -> i128 {
        match self.value_bits() {
            0 => 0,
            bits if self.signed => (1i128 << (bits - 1)) - 1,
            bits => (1i128 << bits) - 1,
        }
    }

    /// Whether `value` fits this layout.
    pub fn holds(&self, value: i128) -> bool {
        value >= self.min_value() && value <= self.max_value()
    }

    fn validate(&self) -> Result<()> {
        if self.width_bits == 0 || self.width_bits > MAX_SCALAR_BITS {
            return Err(Error::invalid(format!(
                "integer width {} outside 1..={}",
                self.width_bits, MAX_SCALAR_BITS
            )));
        }
        Ok(())
    }
}

impl fmt::Display for IntegerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.signed { 'i' } else { 'u' };
        write!(f, "{}{}", sign, self.width_bits)
    }
}

/// IEEE-style floating point layout (sign bit implied).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatType {
    pub exponent_bits: u32,
    pub mantissa_bits: u32,
}

impl FloatType {
    pub const F32: Self = Self::new(8, 23);
    pub const F64: Self = Self::new(11, 52);

    pub const fn new(exponent_bits: u32, mantissa_bits: u32) -> Self {
        Self {
            exponent_bits,
            mantissa_bits,
        }
    }

    /// Storage size in bytes.
    pub fn byte_size(&self) -> usize {
        (1 + self.exponent_bits as usize + self.mantissa_bits as usize).div_ceil(8)
    }

    fn validate(&self) -> Result<()> {
        if self.exponent_bits == 0 || self.mantissa_bits == 0 {
            return Err(Error::invalid("float with empty exponent or mantissa"));
        }
        Ok(())
    }
}

impl fmt::Display for FloatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::F32 {
            f.write_str("f32")
        } else if *self == Self::F64 {
            f.write_str("f64")
        } else {
            write!(f, "float(e{},m{})", self.exponent_bits, self.mantissa_bits)
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Named ordinal of an enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

/// Ordered name/ordinal set over an integer storage type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    underlying: IntegerType,
    variants: Vec<EnumVariant>,
}

impl EnumType {
    /// Create an enum, rejecting duplicate names or ordinals and ordinals
    /// the underlying integer cannot hold.
    pub fn new(underlying: IntegerType, variants: Vec<EnumVariant>) -> Result<Self> {
        underlying.validate()?;
        let mut names = HashSet::new();
        let mut values = HashSet::new();
        for v in &variants {
            if !names.insert(v.name.as_str()) {
                return Err(Error::invalid(format!("duplicate enum name '{}'", v.name)));
            }
            if !values.insert(v.value) {
                return Err(Error::invalid(format!("duplicate enum value {}", v.value)));
            }
            if !underlying.holds(i128::from(v.value)) {
                return Err(Error::invalid(format!(
                    "enum value {} does not fit {}",
                    v.value, underlying
                )));
            }
        }
        Ok(Self {
            underlying,
            variants,
        })
    }

    pub fn underlying(&self) -> IntegerType {
        self.underlying
    }

    pub fn variants(&self) -> &[EnumVariant] {
        &self.variants
    }

    /// Ordinal for a name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value)
    }

    /// Name for an ordinal.
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.name.as_str())
    }

    /// Whether every name of `other` is also a name here.
    pub fn names_cover(&self, other: &EnumType) -> bool {
        other
            .variants
            .iter()
            .all(|v| self.value_of(&v.name).is_some())
    }
}

// ============================================================================
// Aggregates
// ============================================================================

/// Fixed-shape multi-dimensional array, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayType {
    element: Arc<TypeDescriptor>,
    dims: Vec<usize>,
}

impl ArrayType {
    pub fn new(element: impl Into<Arc<TypeDescriptor>>, dims: Vec<usize>) -> Result<Self> {
        if dims.is_empty() {
            return Err(Error::invalid("array without dimensions"));
        }
        if dims.contains(&0) {
            return Err(Error::invalid(format!("array with empty dimension {:?}", dims)));
        }
        Ok(Self {
            element: element.into(),
            dims,
        })
    }

    pub fn element(&self) -> &TypeDescriptor {
        &self.element
    }

    pub fn element_arc(&self) -> &Arc<TypeDescriptor> {
        &self.element
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements (product of the dimensions).
    pub fn count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Named member of a compound at a fixed byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub name: String,
    pub offset: usize,
    pub descriptor: Arc<TypeDescriptor>,
}

impl Member {
    pub fn new(name: impl Into<String>, offset: usize, descriptor: impl Into<Arc<TypeDescriptor>>) -> Self {
        Self {
            name: name.into(),
            offset,
            descriptor: descriptor.into(),
        }
    }

    /// One past the last byte this member occupies.
    pub fn end(&self) -> usize {
        self.offset + self.descriptor.byte_size()
    }
}

/// Record of named members. Members may appear in any offset order but
/// never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundType {
    members: Vec<Member>,
    byte_size: usize,
}

impl CompoundType {
    /// Create a compound whose size is the furthest member extent.
    pub fn new(members: Vec<Member>) -> Result<Self> {
        let extent = members.iter().map(Member::end).max().unwrap_or(0);
        Self::with_size(members, extent)
    }

    /// Create a compound with trailing padding up to `byte_size`.
    pub fn with_size(members: Vec<Member>, byte_size: usize) -> Result<Self> {
        let mut names = HashSet::new();
        for m in &members {
            if !names.insert(m.name.as_str()) {
                return Err(Error::invalid(format!("duplicate member name '{}'", m.name)));
            }
            m.descriptor.validate()?;
            if m.end() > byte_size {
                return Err(Error::invalid(format!(
                    "member '{}' ends at {} past compound size {}",
                    m.name,
                    m.end(),
                    byte_size
                )));
            }
        }

        let mut spans: Vec<(usize, usize, &str)> = members
            .iter()
            .filter(|m| m.descriptor.byte_size() > 0)
            .map(|m| (m.offset, m.end(), m.name.as_str()))
            .collect();
        spans.sort_unstable();
        for pair in spans.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(Error::invalid(format!(
                    "members '{}' and '{}' overlap",
                    pair[0].2, pair[1].2
                )));
            }
        }

        Ok(Self { members, byte_size })
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// Complete layout of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Single byte, zero is false.
    Boolean,
    Integer(IntegerType),
    Float(FloatType),
    /// Raw bit pattern with no numeric meaning.
    Bitfield { width_bits: u32 },
    /// NUL-padded string of exactly `byte_length` bytes.
    FixedString { byte_length: usize },
    /// Reference to an out-of-line NUL-terminated string.
    VariableString,
    /// Uninterpreted bytes.
    Opaque { byte_length: usize },
    Enum(EnumType),
    Array(ArrayType),
    /// Reference to an out-of-line sequence of elements.
    Variable(Arc<TypeDescriptor>),
    Compound(CompoundType),
}

impl TypeDescriptor {
    pub fn integer(width_bits: u32, signed: bool) -> Self {
        Self::Integer(IntegerType::new(width_bits, signed))
    }

    pub fn float(exponent_bits: u32, mantissa_bits: u32) -> Self {
        Self::Float(FloatType::new(exponent_bits, mantissa_bits))
    }

    pub fn bitfield(width_bits: u32) -> Self {
        Self::Bitfield { width_bits }
    }

    pub fn fixed_string(byte_length: usize) -> Self {
        Self::FixedString { byte_length }
    }

    pub fn opaque(byte_length: usize) -> Self {
        Self::Opaque { byte_length }
    }

    /// Array of `element` with the given dimensions.
    pub fn array(element: impl Into<Arc<TypeDescriptor>>, dims: &[usize]) -> Result<Self> {
        Ok(Self::Array(ArrayType::new(element, dims.to_vec())?))
    }

    /// Variable-length sequence of `element`.
    pub fn variable(element: impl Into<Arc<TypeDescriptor>>) -> Self {
        Self::Variable(element.into())
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Boolean => Kind::Boolean,
            Self::Integer(_) => Kind::Integer,
            Self::Float(_) => Kind::Float,
            Self::Bitfield { .. } => Kind::Bitfield,
            Self::FixedString { .. } | Self::VariableString => Kind::String,
            Self::Opaque { .. } => Kind::Opaque,
            Self::Enum(_) => Kind::Enum,
            Self::Array(_) => Kind::Array,
            Self::Variable(_) => Kind::Variable,
            Self::Compound(_) => Kind::Compound,
        }
    }

    /// Size of the flat (in-line) representation in bytes.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Boolean => 1,
            Self::Integer(int) => int.byte_size(),
            Self::Float(float) => float.byte_size(),
            Self::Bitfield { width_bits } => (*width_bits as usize).div_ceil(8),
            Self::FixedString { byte_length } | Self::Opaque { byte_length } => *byte_length,
            Self::VariableString | Self::Variable(_) => REFERENCE_SIZE,
            Self::Enum(e) => e.underlying.byte_size(),
            Self::Array(array) => array.element.byte_size() * array.count(),
            Self::Compound(compound) => compound.byte_size,
        }
    }

    /// Integer or float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    /// Whether values of this descriptor can own out-of-line data.
    pub fn has_out_of_line(&self) -> bool {
        match self {
            Self::VariableString | Self::Variable(_) => true,
            Self::Array(array) => array.element.has_out_of_line(),
            Self::Compound(compound) => compound
                .members
                .iter()
                .any(|m| m.descriptor.has_out_of_line()),
            _ => false,
        }
    }

    /// Member lookup on compounds.
    pub fn member(&self, name: &str) -> Option<&Member> {
        match self {
            Self::Compound(compound) => compound.member(name),
            _ => None,
        }
    }

    /// Check structural invariants recursively.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Integer(int) => int.validate(),
            Self::Float(float) => float.validate(),
            Self::Bitfield { width_bits } => {
                if *width_bits == 0 || *width_bits > MAX_SCALAR_BITS {
                    return Err(Error::invalid(format!("bitfield width {}", width_bits)));
                }
                Ok(())
            }
            Self::FixedString { byte_length } if *byte_length == 0 => {
                Err(Error::invalid("fixed string of length 0"))
            }
            Self::Array(array) => array.element.validate(),
            Self::Variable(element) => element.validate(),
            // Enum and compound constructors already validated their parts.
            _ => Ok(()),
        }
    }
}

impl From<IntegerType> for TypeDescriptor {
    fn from(int: IntegerType) -> Self {
        Self::Integer(int)
    }
}

impl From<FloatType> for TypeDescriptor {
    fn from(float: FloatType) -> Self {
        Self::Float(float)
    }
}

impl From<EnumType> for TypeDescriptor {
    fn from(e: EnumType) -> Self {
        Self::Enum(e)
    }
}

impl From<ArrayType> for TypeDescriptor {
    fn from(array: ArrayType) -> Self {
        Self::Array(array)
    }
}

impl From<CompoundType> for TypeDescriptor {
    fn from(compound: CompoundType) -> Self {
        Self::Compound(compound)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("bool"),
            Self::Integer(int) => write!(f, "{}", int),
            Self::Float(float) => write!(f, "{}", float),
            Self::Bitfield { width_bits } => write!(f, "b{}", width_bits),
            Self::FixedString { byte_length } => write!(f, "str[{}]", byte_length),
            Self::VariableString => f.write_str("str"),
            Self::Opaque { byte_length } => write!(f, "opaque[{}]", byte_length),
            Self::Enum(e) => {
                write!(f, "enum<{}>{{", e.underlying)?;
                for (i, v) in e.variants.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", v.name, v.value)?;
                }
                f.write_str("}")
            }
            Self::Array(array) => {
                let dims: Vec<String> = array.dims.iter().map(ToString::to_string).collect();
                write!(f, "[{}]{}", dims.join("x"), array.element)
            }
            Self::Variable(element) => write!(f, "vlen<{}>", element),
            Self::Compound(compound) => {
                f.write_str("{")?;
                for (i, m) in compound.members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {} @{}", m.name, m.descriptor, m.offset)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(TypeDescriptor::from(IntegerType::U8).byte_size(), 1);
        assert_eq!(TypeDescriptor::integer(12, true).byte_size(), 2);
        assert_eq!(TypeDescriptor::from(FloatType::F32).byte_size(), 4);
        assert_eq!(TypeDescriptor::from(FloatType::F64).byte_size(), 8);
        assert_eq!(TypeDescriptor::bitfield(24).byte_size(), 3);
        assert_eq!(TypeDescriptor::VariableString.byte_size(), REFERENCE_SIZE);
        assert_eq!(TypeDescriptor::Boolean.byte_size(), 1);
    }

    #[test]
    fn test_integer_range() {
        assert_eq!(IntegerType::I8.min_value(), -128);
        assert_eq!(IntegerType::I8.max_value(), 127);
        assert_eq!(IntegerType::U64.max_value(), u64::MAX as i128);
        assert!(!IntegerType::U8.holds(-1));

        let empty = IntegerType::new(0, true);
        assert_eq!((empty.min_value(), empty.max_value()), (0, 0));
        assert_eq!(IntegerType::new(200, false).max_value(), u64::MAX as i128);
    }

    #[test]
    fn test_array_size_and_count() {
        let array = TypeDescriptor::array(TypeDescriptor::from(IntegerType::I16), &[2, 3])
            .expect("valid array");
        assert_eq!(array.byte_size(), 12);
        assert!(TypeDescriptor::array(TypeDescriptor::Boolean, &[]).is_err());
        assert!(TypeDescriptor::array(TypeDescriptor::Boolean, &[2, 0]).is_err());
    }

    #[test]
    fn test_compound_rejects_overlap() {
        let u16d = Arc::new(TypeDescriptor::from(IntegerType::U16));
        let result = CompoundType::new(vec![
            Member::new("a", 0, u16d.clone()),
            Member::new("b", 1, u16d),
        ]);
        assert!(matches!(result, Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_compound_rejects_duplicate_names() {
        let u8d = Arc::new(TypeDescriptor::from(IntegerType::U8));
        let result = CompoundType::new(vec![
            Member::new("a", 0, u8d.clone()),
            Member::new("a", 1, u8d),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_compound_padding() {
        let u8d = Arc::new(TypeDescriptor::from(IntegerType::U8));
        let compound = CompoundType::with_size(vec![Member::new("a", 2, u8d)], 8)
            .expect("padded compound");
        assert_eq!(compound.byte_size(), 8);
        assert!(CompoundType::with_size(compound.members().to_vec(), 2).is_err());
    }

    #[test]
    fn test_enum_validation() {
        let ok = EnumType::new(
            IntegerType::U8,
            vec![
                EnumVariant { name: "A".into(), value: 0 },
                EnumVariant { name: "B".into(), value: 255 },
            ],
        );
        assert!(ok.is_ok());

        let too_big = EnumType::new(
            IntegerType::U8,
            vec![EnumVariant { name: "A".into(), value: 256 }],
        );
        assert!(too_big.is_err());

        let dup = EnumType::new(
            IntegerType::U8,
            vec![
                EnumVariant { name: "A".into(), value: 0 },
                EnumVariant { name: "B".into(), value: 0 },
            ],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_out_of_line_detection() {
        let inner = TypeDescriptor::array(TypeDescriptor::VariableString, &[2]).expect("array");
        assert!(inner.has_out_of_line());
        assert!(!TypeDescriptor::from(IntegerType::U32).has_out_of_line());
    }

    #[test]
    fn test_display() {
        let array = TypeDescriptor::array(TypeDescriptor::from(IntegerType::U8), &[2, 3])
            .expect("array");
        assert_eq!(array.to_string(), "[2x3]u8");
        assert_eq!(TypeDescriptor::variable(TypeDescriptor::from(FloatType::F32)).to_string(), "vlen<f32>");
    }
}
