// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name registries.
//!
//! [`TypeIdRegistry`] hands out dense numeric identifiers for application
//! type names and can be frozen into an enum descriptor, so that records
//! can carry a type tag that itself converts between schema versions.
//! [`DescriptorTable`] maps type names to descriptor factories.

use crate::descriptor::{EnumType, EnumVariant, IntegerType, TypeDescriptor};
use crate::error::{Error, Result};
use crate::native::Native;
use std::collections::{BTreeMap, HashMap};

/// Identifier assigned by a [`TypeIdRegistry`].
pub type TypeId = u16;

/// Reserved identifier meaning "no type". Never assigned.
pub const NULL_ID: TypeId = u16::MAX;

// ---------------------------------------------------------------------------
// TypeIdRegistry
// ---------------------------------------------------------------------------

/// Dense name-to-id table that is open for registration until sealed.
#[derive(Debug, Clone, Default)]
pub struct TypeIdRegistry {
    names: Vec<String>,
    ids: HashMap<String, TypeId>,
    sealed: bool,
}

impl TypeIdRegistry {
    /// Create an empty, open registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next identifier to `name`.
    ///
    /// Ids start at 0 and increase by one per registration.
    pub fn register(&mut self, name: &str) -> Result<TypeId> {
        if self.sealed {
            return Err(Error::RegistrySealed);
        }
        if self.ids.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        let id = TypeId::try_from(self.names.len())
            .ok()
            .filter(|id| *id != NULL_ID)
            .ok_or(Error::RegistryFull)?;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        log::trace!("[registry] {} -> {}", name, id);
        Ok(id)
    }

    /// Identifier of `name`.
    pub fn id(&self, name: &str) -> Result<TypeId> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    /// Name registered under `id`.
    pub fn name(&self, id: TypeId) -> Result<&str> {
        self.names
            .get(usize::from(id))
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownName(format!("#{}", id)))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Refuse further registrations. Idempotent.
    pub fn seal(&mut self) {
        if !self.sealed {
            log::debug!("[registry] sealed with {} names", self.names.len());
        }
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seal the registry and describe it as a `u16` enum whose ordinals
    /// are the assigned ids.
    pub fn enum_descriptor(&mut self) -> Result<TypeDescriptor> {
        self.seal();
        let variants = self
            .names
            .iter()
            .enumerate()
            .map(|(id, name)| EnumVariant {
                name: name.clone(),
                value: id as i64,
            })
            .collect();
        Ok(EnumType::new(IntegerType::U16, variants)?.into())
    }
}

// ---------------------------------------------------------------------------
// DescriptorTable
// ---------------------------------------------------------------------------

/// Factory producing the descriptor of one application type.
pub type DescriptorFn = fn() -> TypeDescriptor;

/// Registration table from type names to descriptor factories.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    entries: BTreeMap<String, DescriptorFn>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with every [`Native`] primitive.
    pub fn with_natives() -> Self {
        let natives: [(&str, DescriptorFn); 11] = [
            (bool::NAME, bool::descriptor),
            (u8::NAME, u8::descriptor),
            (u16::NAME, u16::descriptor),
            (u32::NAME, u32::descriptor),
            (u64::NAME, u64::descriptor),
            (i8::NAME, i8::descriptor),
            (i16::NAME, i16::descriptor),
            (i32::NAME, i32::descriptor),
            (i64::NAME, i64::descriptor),
            (f32::NAME, f32::descriptor),
            (f64::NAME, f64::descriptor),
        ];
        let mut table = Self::new();
        for (name, factory) in natives {
            let previous = table.entries.insert(name.to_string(), factory);
            debug_assert!(previous.is_none(), "native name '{}' registered twice", name);
        }
        table
    }

    /// Register `factory` under `name`.
    pub fn register(&mut self, name: &str, factory: DescriptorFn) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        self.entries.insert(name.to_string(), factory);
        Ok(())
    }

    /// Register a native primitive under its canonical name.
    pub fn register_native<T: Native>(&mut self) -> Result<()> {
        self.register(T::NAME, T::descriptor)
    }

    /// Build the descriptor registered under `name`.
    pub fn descriptor(&self, name: &str) -> Result<TypeDescriptor> {
        self.entries
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CompoundBuilder;

    #[test]
    fn test_dense_ids() {
        let mut reg = TypeIdRegistry::new();
        assert_eq!(reg.register("Pose").expect("register"), 0);
        assert_eq!(reg.register("Twist").expect("register"), 1);
        assert_eq!(reg.id("Twist").expect("id"), 1);
        assert_eq!(reg.name(0).expect("name"), "Pose");
        assert_eq!(reg.len(), 2);
        assert!(matches!(reg.id("Odom"), Err(Error::UnknownName(_))));
        assert!(matches!(reg.name(7), Err(Error::UnknownName(_))));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut reg = TypeIdRegistry::new();
        reg.register("Pose").expect("register");
        assert!(matches!(reg.register("Pose"), Err(Error::DuplicateName(_))));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_sealed_rejects_registration() {
        let mut reg = TypeIdRegistry::new();
        reg.register("Pose").expect("register");
        reg.seal();
        assert!(reg.is_sealed());
        assert!(matches!(reg.register("Twist"), Err(Error::RegistrySealed)));
        // Lookups still work.
        assert_eq!(reg.id("Pose").expect("id"), 0);
    }

    #[test]
    fn test_enum_descriptor_seals() {
        let mut reg = TypeIdRegistry::new();
        reg.register("Pose").expect("register");
        reg.register("Twist").expect("register");
        let desc = reg.enum_descriptor().expect("enum");
        assert!(reg.is_sealed());

        let TypeDescriptor::Enum(e) = &desc else {
            panic!("expected enum, got {}", desc);
        };
        assert_eq!(e.underlying(), IntegerType::U16);
        assert_eq!(e.value_of("Twist"), Some(1));
        assert_eq!(e.name_of(0), Some("Pose"));
    }

    #[test]
    fn test_registry_full() {
        let mut reg = TypeIdRegistry::new();
        for i in 0..usize::from(NULL_ID) {
            reg.register(&format!("T{}", i)).expect("register");
        }
        assert!(matches!(reg.register("overflow"), Err(Error::RegistryFull)));
        assert_eq!(reg.len(), usize::from(NULL_ID));
    }

    fn point() -> TypeDescriptor {
        CompoundBuilder::new()
            .member("x", f32::descriptor())
            .member("y", f32::descriptor())
            .build()
            .expect("point")
    }

    #[test]
    fn test_descriptor_table() {
        let mut table = DescriptorTable::with_natives();
        assert!(table.contains("u16"));
        assert_eq!(table.descriptor("f64").expect("f64"), f64::descriptor());
        assert_eq!(table.names().count(), 11);
        assert!(matches!(
            table.register_native::<u8>(),
            Err(Error::DuplicateName(_))
        ));

        table.register("Point", point).expect("register");
        assert_eq!(table.descriptor("Point").expect("point").byte_size(), 8);
        assert!(matches!(
            table.register("Point", point),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(table.descriptor("Line"), Err(Error::UnknownName(_))));
        assert!(table.names().any(|n| n == "Point"));
    }
}
