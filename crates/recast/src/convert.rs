// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conversion of a buffer into another descriptor.
//!
//! A conversion first runs the compatibility check and refuses to start if
//! the report is rejected by the criteria. It then recurses over both
//! descriptors in step: compound members are matched by name, arrays by
//! row-major position, variable sequences element by element into a fresh
//! payload arena, strings by content and enums by name. Every scalar pair
//! goes to a [`ScalarConverter`].
//!
//! The result owns its own payloads. If a step fails, the partially built
//! result is dropped and its allocations go with it.

use crate::buffer::Buffer;
use crate::compat::{self, CompatibilityReport, ConversionCriteria};
use crate::descriptor::{EnumType, IntegerType, TypeDescriptor};
use crate::error::{Error, Result};
use crate::heap::{self, Heap, Reference};
use crate::scalar::{NativeConverter, ScalarConverter};
use crate::walk::{FieldPath, Segment};
use std::sync::Arc;

/// Reusable conversion between a fixed source and target descriptor.
///
/// The compatibility report is computed once at construction.
#[derive(Debug)]
pub struct Converter<S: ScalarConverter = NativeConverter> {
    source: Arc<TypeDescriptor>,
    target: Arc<TypeDescriptor>,
    report: CompatibilityReport,
    scalar: S,
}

impl Converter<NativeConverter> {
    pub fn new(
        source: impl Into<Arc<TypeDescriptor>>,
        target: impl Into<Arc<TypeDescriptor>>,
    ) -> Result<Self> {
        Self::with_scalar(source, target, NativeConverter)
    }
}

impl<S: ScalarConverter> Converter<S> {
    /// Use a custom scalar converter for leaf values.
    pub fn with_scalar(
        source: impl Into<Arc<TypeDescriptor>>,
        target: impl Into<Arc<TypeDescriptor>>,
        scalar: S,
    ) -> Result<Self> {
        let source = source.into();
        let target = target.into();
        source.validate()?;
        target.validate()?;
        let report = compat::check(&source, &target);
        Ok(Self {
            source,
            target,
            report,
            scalar,
        })
    }

    pub fn source(&self) -> &TypeDescriptor {
        &self.source
    }

    pub fn target(&self) -> &TypeDescriptor {
        &self.target
    }

    pub fn report(&self) -> &CompatibilityReport {
        &self.report
    }

    pub fn is_valid(&self, criteria: &ConversionCriteria) -> bool {
        self.report.accept(criteria)
    }

    /// Convert `buffer`, which must carry this converter's source descriptor.
    pub fn convert(&self, buffer: &Buffer, criteria: &ConversionCriteria) -> Result<Buffer> {
        if buffer.descriptor() != &*self.source {
            return Err(Error::invalid(format!(
                "buffer holds {}, converter expects {}",
                buffer.descriptor(),
                self.source
            )));
        }
        if !self.report.accept(criteria) {
            log::warn!(
                "[convert] rejected {} -> {}:\n{}",
                self.source,
                self.target,
                self.report.violations(criteria)
            );
            return Err(Error::IncompatibleSchema {
                report: Box::new(self.report.clone()),
            });
        }

        if self.source == self.target {
            log::trace!("[convert] identical descriptors, deep copy");
            return buffer.try_clone();
        }

        let mut bytes = vec![0u8; self.target.byte_size()];
        let mut target_heap = Heap::with_stats(buffer.stats().cloned());
        let mut exec = Executor {
            scalar: &self.scalar,
            source_heap: buffer.heap(),
            target_heap: &mut target_heap,
            path: FieldPath::root(),
        };
        exec.value(&self.source, buffer.bytes(), &self.target, &mut bytes)?;

        log::debug!(
            "[convert] {} -> {} ({} payloads)",
            self.source,
            self.target,
            target_heap.live()
        );
        Ok(Buffer::from_raw(self.target.clone(), bytes, target_heap))
    }
}

/// Convert `source` into `target` with the native scalar converter.
pub fn convert(
    source: &Buffer,
    target: impl Into<Arc<TypeDescriptor>>,
    criteria: &ConversionCriteria,
) -> Result<Buffer> {
    convert_with(source, target, criteria, NativeConverter)
}

/// Convert `source` into `target` with a custom scalar converter.
pub fn convert_with<S: ScalarConverter>(
    source: &Buffer,
    target: impl Into<Arc<TypeDescriptor>>,
    criteria: &ConversionCriteria,
    scalar: S,
) -> Result<Buffer> {
    Converter::with_scalar(source.descriptor_arc().clone(), target, scalar)?.convert(source, criteria)
}

impl Buffer {
    /// Shorthand for [`convert`].
    pub fn convert_to(
        &self,
        target: impl Into<Arc<TypeDescriptor>>,
        criteria: &ConversionCriteria,
    ) -> Result<Buffer> {
        convert(self, target, criteria)
    }
}

// ============================================================================
// Executor
// ============================================================================

struct Executor<'a, S: ScalarConverter> {
    scalar: &'a S,
    source_heap: &'a Heap,
    target_heap: &'a mut Heap,
    path: FieldPath,
}

impl<S: ScalarConverter> Executor<'_, S> {
    fn scalar_error(&self, reason: impl ToString) -> Error {
        Error::Scalar {
            path: self.path.to_string(),
            reason: reason.to_string(),
        }
    }

    fn value(
        &mut self,
        source_kind: &TypeDescriptor,
        source: &[u8],
        target_kind: &TypeDescriptor,
        target: &mut [u8],
    ) -> Result<()> {
        use TypeDescriptor as T;

        match (source_kind, target_kind) {
            (T::Compound(s), T::Compound(t)) => {
                for tm in t.members() {
                    // Unknown members stay zero-filled.
                    let Some(sm) = s.member(&tm.name) else {
                        continue;
                    };
                    self.path.push(Segment::Member(tm.name.clone()));
                    self.value(
                        &sm.descriptor,
                        &source[sm.offset..sm.end()],
                        &tm.descriptor,
                        &mut target[tm.offset..tm.end()],
                    )?;
                    self.path.pop();
                }
                Ok(())
            }
            (T::Array(s), T::Array(t)) => {
                let (ss, ts) = (s.element().byte_size(), t.element().byte_size());
                self.path.push(Segment::Element);
                for i in 0..t.count().min(s.count()) {
                    self.value(
                        s.element(),
                        &source[i * ss..(i + 1) * ss],
                        t.element(),
                        &mut target[i * ts..(i + 1) * ts],
                    )?;
                }
                self.path.pop();
                Ok(())
            }
            (T::Variable(s), T::Variable(t)) => self.sequence(s, source, t, target),
            (T::FixedString { .. } | T::VariableString, T::FixedString { .. } | T::VariableString) => {
                self.string(source_kind, source, target_kind, target)
            }
            (T::Enum(s), T::Enum(t)) => self.enumeration(s, source, t, target),
            _ => self.leaf(source_kind, source, target_kind, target),
        }
    }

    fn sequence(
        &mut self,
        source_element: &TypeDescriptor,
        source: &[u8],
        target_element: &TypeDescriptor,
        target: &mut [u8],
    ) -> Result<()> {
        let reference = Reference::read(source)?;
        if reference.is_null() {
            return Ok(());
        }
        let count = reference.len as usize;
        let (ss, ts) = (source_element.byte_size(), target_element.byte_size());
        let source_heap = self.source_heap;
        let payload = source_heap.get(reference.handle)?;
        if payload.len() != count * ss {
            return Err(Error::SizeMismatch {
                expected: count * ss,
                actual: payload.len(),
            });
        }

        let mut converted = vec![0u8; count * ts];
        self.path.push(Segment::Element);
        for i in 0..count {
            self.value(
                source_element,
                &payload[i * ss..(i + 1) * ss],
                target_element,
                &mut converted[i * ts..(i + 1) * ts],
            )?;
        }
        self.path.pop();

        let handle = self.target_heap.alloc(converted);
        Reference {
            handle,
            len: reference.len,
        }
        .write(target)
    }

    fn string(
        &mut self,
        source_kind: &TypeDescriptor,
        source: &[u8],
        target_kind: &TypeDescriptor,
        target: &mut [u8],
    ) -> Result<()> {
        let source_heap = self.source_heap;
        let content: &[u8] = match source_kind {
            TypeDescriptor::VariableString => {
                let reference = Reference::read(source)?;
                if reference.is_null() {
                    // Null stays null in a variable target, empty in a fixed one.
                    return Ok(());
                }
                let payload = source_heap.get(reference.handle)?;
                payload
                    .get(..reference.len as usize)
                    .ok_or(Error::SizeMismatch {
                        expected: reference.len as usize + 1,
                        actual: payload.len(),
                    })?
            }
            _ => {
                let end = source.iter().position(|b| *b == 0).unwrap_or(source.len());
                &source[..end]
            }
        };

        match target_kind {
            TypeDescriptor::FixedString { byte_length } => {
                let n = content.len().min(*byte_length);
                target[..n].copy_from_slice(&content[..n]);
                Ok(())
            }
            _ => heap::store_string(target, self.target_heap, content),
        }
    }

    fn enumeration(
        &mut self,
        source_enum: &EnumType,
        source: &[u8],
        target_enum: &EnumType,
        target: &mut [u8],
    ) -> Result<()> {
        let wide = TypeDescriptor::Integer(IntegerType::I64);
        let mut raw = [0u8; 8];
        self.scalar
            .convert_scalar(
                source,
                &TypeDescriptor::Integer(source_enum.underlying()),
                &mut raw,
                &wide,
                None,
            )
            .map_err(|e| self.scalar_error(e))?;
        let value = i64::from_le_bytes(raw);

        let unknown = || Error::UnknownEnumValue {
            path: self.path.to_string(),
            value,
        };
        let name = source_enum.name_of(value).ok_or_else(unknown)?;
        let mapped = target_enum.value_of(name).ok_or_else(unknown)?;

        self.scalar
            .convert_scalar(
                &mapped.to_le_bytes(),
                &wide,
                target,
                &TypeDescriptor::Integer(target_enum.underlying()),
                None,
            )
            .map_err(|e| self.scalar_error(e))
    }

    fn leaf(
        &mut self,
        source_kind: &TypeDescriptor,
        source: &[u8],
        target_kind: &TypeDescriptor,
        target: &mut [u8],
    ) -> Result<()> {
        let mut scratch = self
            .scalar
            .needs_scratch(source_kind, target_kind)
            .then(|| vec![0u8; source_kind.byte_size().max(target_kind.byte_size())]);
        self.scalar
            .convert_scalar(source, source_kind, target, target_kind, scratch.as_deref_mut())
            .map_err(|e| self.scalar_error(e))
    }
}
