// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builders for compound and enum descriptors.

use super::{CompoundType, EnumType, EnumVariant, IntegerType, Member, TypeDescriptor};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Builder for compound descriptors.
///
/// Members added with [`member`](Self::member) are packed left to right
/// after the current extent. [`member_at`](Self::member_at) places a member
/// at an explicit offset.
#[derive(Debug, Default)]
pub struct CompoundBuilder {
    members: Vec<Member>,
    extent: usize,
    byte_size: Option<usize>,
}

impl CompoundBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member right after the furthest member so far.
    pub fn member(self, name: impl Into<String>, descriptor: impl Into<Arc<TypeDescriptor>>) -> Self {
        let offset = self.extent;
        self.member_at(name, offset, descriptor)
    }

    /// Add a member at an explicit byte offset.
    pub fn member_at(
        mut self,
        name: impl Into<String>,
        offset: usize,
        descriptor: impl Into<Arc<TypeDescriptor>>,
    ) -> Self {
        let member = Member::new(name, offset, descriptor);
        self.extent = self.extent.max(member.end());
        self.members.push(member);
        self
    }

    /// Pad the compound to `byte_size` bytes.
    pub fn size(mut self, byte_size: usize) -> Self {
        self.byte_size = Some(byte_size);
        self
    }

    /// Build the descriptor.
    pub fn build(self) -> Result<TypeDescriptor> {
        let compound = match self.byte_size {
            Some(size) => CompoundType::with_size(self.members, size)?,
            None => CompoundType::new(self.members)?,
        };
        Ok(TypeDescriptor::Compound(compound))
    }
}

/// Builder for enum descriptors.
#[derive(Debug)]
pub struct EnumBuilder {
    underlying: IntegerType,
    variants: Vec<EnumVariant>,
    // None once an explicit value of i64::MAX leaves no successor.
    next_value: Option<i64>,
    overflowed: Option<String>,
}

impl EnumBuilder {
    /// Create a new enum builder over `underlying` storage.
    pub fn new(underlying: IntegerType) -> Self {
        Self {
            underlying,
            variants: Vec::new(),
            next_value: Some(0),
            overflowed: None,
        }
    }

    /// Add a variant with auto-incrementing value.
    pub fn variant(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match self.next_value {
            Some(value) => {
                self.variants.push(EnumVariant { name, value });
                self.next_value = value.checked_add(1);
            }
            None => {
                self.overflowed.get_or_insert(name);
            }
        }
        self
    }

    /// Add a variant with explicit value.
    pub fn variant_value(mut self, name: impl Into<String>, value: i64) -> Self {
        self.variants.push(EnumVariant {
            name: name.into(),
            value,
        });
        self.next_value = value.checked_add(1);
        self
    }

    /// Build the descriptor.
    pub fn build(self) -> Result<TypeDescriptor> {
        if let Some(name) = self.overflowed {
            return Err(Error::invalid(format!(
                "enum name '{}' has no value after {}",
                name,
                i64::MAX
            )));
        }
        Ok(TypeDescriptor::Enum(EnumType::new(self.underlying, self.variants)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FloatType;

    #[test]
    fn test_packs_left_to_right() {
        let desc = CompoundBuilder::new()
            .member("a", TypeDescriptor::from(IntegerType::U8))
            .member("b", TypeDescriptor::from(FloatType::F64))
            .member("c", TypeDescriptor::from(IntegerType::U16))
            .build()
            .expect("compound");

        let offsets: Vec<usize> = match &desc {
            TypeDescriptor::Compound(c) => c.members().iter().map(|m| m.offset).collect(),
            _ => unreachable!(),
        };
        assert_eq!(offsets, vec![0, 1, 9]);
        assert_eq!(desc.byte_size(), 11);
    }

    #[test]
    fn test_explicit_offsets_and_padding() {
        let desc = CompoundBuilder::new()
            .member_at("hi", 4, TypeDescriptor::from(IntegerType::U32))
            .member_at("lo", 0, TypeDescriptor::from(IntegerType::U32))
            .size(16)
            .build()
            .expect("compound");
        assert_eq!(desc.byte_size(), 16);
        assert_eq!(desc.member("hi").map(|m| m.offset), Some(4));
    }

    #[test]
    fn test_enum_auto_values() {
        let desc = EnumBuilder::new(IntegerType::I8)
            .variant("Red")
            .variant_value("Green", 10)
            .variant("Blue")
            .build()
            .expect("enum");
        let TypeDescriptor::Enum(e) = desc else {
            panic!("expected enum");
        };
        assert_eq!(e.value_of("Red"), Some(0));
        assert_eq!(e.value_of("Blue"), Some(11));
        assert_eq!(e.name_of(10), Some("Green"));
    }

    #[test]
    fn test_enum_value_at_i64_max() {
        let desc = EnumBuilder::new(IntegerType::I64)
            .variant_value("Min", i64::MIN)
            .variant_value("Max", i64::MAX)
            .build()
            .expect("enum");
        let TypeDescriptor::Enum(e) = &desc else {
            unreachable!()
        };
        assert_eq!(e.variants().len(), 2);

        let err = EnumBuilder::new(IntegerType::I64)
            .variant_value("Max", i64::MAX)
            .variant("After")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'After'"), "{}", err);
    }
}
