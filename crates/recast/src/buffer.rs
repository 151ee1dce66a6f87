// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owned record buffers.
//!
//! A [`Buffer`] pairs a descriptor with flat bytes and the [`Heap`] that
//! owns whatever those bytes reference out of line. Dropping the buffer
//! frees everything exactly once. [`Buffer::split`] hands the flat bytes
//! and the reclaim capability to separate owners, and
//! [`Buffer::from_parts`] puts them back together.
//!
//! Member paths used by the writers are member names joined with `.`, with
//! `[i]` selecting the i-th (row-major) element of an array: `grid[4].x`.

use crate::descriptor::{Kind, TypeDescriptor, REFERENCE_SIZE};
use crate::error::{Error, Result};
use crate::heap::{self, AllocStats, Heap, Reference, Sites};
use crate::native::Native;
use crate::scalar::{decode_integer, encode_integer, NativeConverter, ScalarConverter};
use std::sync::Arc;

// ============================================================================
// Path resolution
// ============================================================================

fn unknown(path: &str) -> Error {
    Error::UnknownMember(path.to_string())
}

/// Byte offset and descriptor of `path` within `descriptor`.
pub(crate) fn resolve<'d>(descriptor: &'d TypeDescriptor, path: &str) -> Result<(usize, &'d TypeDescriptor)> {
    let mut offset = 0;
    let mut current = descriptor;
    if path.is_empty() {
        return Ok((offset, current));
    }

    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            let member = current.member(name).ok_or_else(|| unknown(path))?;
            offset += member.offset;
            current = &*member.descriptor;
        }
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(unknown(path));
            }
            let close = rest.find(']').ok_or_else(|| unknown(path))?;
            let index: usize = rest[1..close].parse().map_err(|_| unknown(path))?;
            let TypeDescriptor::Array(array) = current else {
                return Err(unknown(path));
            };
            if index >= array.count() {
                return Err(Error::IndexOutOfBounds {
                    index,
                    length: array.count(),
                });
            }
            offset += index * array.element().byte_size();
            current = array.element();
            rest = &rest[close + 1..];
        }
    }
    Ok((offset, current))
}

/// Numeric layout used for raw reads and writes; enums act as their
/// underlying integer.
fn numeric_layout(descriptor: &TypeDescriptor) -> TypeDescriptor {
    match descriptor {
        TypeDescriptor::Enum(e) => TypeDescriptor::Integer(e.underlying()),
        other => other.clone(),
    }
}

fn scalar_error(path: &str, reason: impl ToString) -> Error {
    Error::Scalar {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Write a native value into a slot of layout `target`.
fn encode_native<T: Native>(value: T, target: &TypeDescriptor, out: &mut [u8], path: &str) -> Result<()> {
    let native = T::descriptor();
    let target = numeric_layout(target);
    if native == target {
        value.encode(out);
        return Ok(());
    }
    let mut raw = vec![0u8; T::SIZE];
    value.encode(&mut raw);
    let converter = NativeConverter;
    let mut scratch = vec![0u8; T::SIZE.max(target.byte_size())];
    let scratch = converter
        .needs_scratch(&native, &target)
        .then_some(scratch.as_mut_slice());
    converter
        .convert_scalar(&raw, &native, out, &target, scratch)
        .map_err(|e| scalar_error(path, e))
}

/// Swap the sequence reference at `offset` for a freshly allocated payload,
/// releasing the previous one. A zero `len` leaves the reference null.
fn store_sequence(
    bytes: &mut [u8],
    heap: &mut Heap,
    offset: usize,
    slot: &TypeDescriptor,
    payload: Vec<u8>,
    len: usize,
) -> Result<()> {
    let reference_bytes = &mut bytes[offset..offset + REFERENCE_SIZE];
    heap::release(reference_bytes, &Sites::of(slot), heap)?;
    if len == 0 {
        return Ok(());
    }
    let handle = heap.alloc(payload);
    Reference {
        handle,
        len: len as u64,
    }
    .write(reference_bytes)
}

// ============================================================================
// Split halves
// ============================================================================

/// Flat half of a split buffer. References inside it resolve only against
/// the matching [`Reclaim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBytes {
    descriptor: Arc<TypeDescriptor>,
    bytes: Vec<u8>,
}

impl FlatBytes {
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Capability to free the out-of-line payloads of a split buffer.
///
/// Dropping it frees them; the flat half must not be read through them
/// afterwards.
#[derive(Debug)]
pub struct Reclaim {
    heap: Heap,
}

impl Reclaim {
    /// Payloads still owned.
    pub fn live(&self) -> usize {
        self.heap.live()
    }

    /// Free every payload now and report how many there were.
    pub fn release(self) -> usize {
        let count = self.heap.live();
        log::debug!("[buffer] releasing {} out-of-line payloads", count);
        count
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// A typed record owning its flat bytes and out-of-line payloads.
#[derive(Debug)]
pub struct Buffer {
    descriptor: Arc<TypeDescriptor>,
    bytes: Vec<u8>,
    heap: Heap,
}

impl Buffer {
    /// All-zero record: numbers are zero, references are null.
    pub fn zeroed(descriptor: impl Into<Arc<TypeDescriptor>>) -> Result<Self> {
        Self::zeroed_with_stats(descriptor, None::<AllocStats>)
    }

    /// Like [`zeroed`](Self::zeroed) but counting allocations in `stats`.
    pub fn zeroed_with_stats(
        descriptor: impl Into<Arc<TypeDescriptor>>,
        stats: impl Into<Option<AllocStats>>,
    ) -> Result<Self> {
        let descriptor = descriptor.into();
        descriptor.validate()?;
        let bytes = vec![0u8; descriptor.byte_size()];
        Ok(Self {
            descriptor,
            bytes,
            heap: Heap::with_stats(stats.into()),
        })
    }

    /// Wrap existing flat bytes. Every reference in them must be null.
    pub fn from_bytes(descriptor: impl Into<Arc<TypeDescriptor>>, bytes: Vec<u8>) -> Result<Self> {
        let descriptor = descriptor.into();
        descriptor.validate()?;
        if bytes.len() != descriptor.byte_size() {
            return Err(Error::SizeMismatch {
                expected: descriptor.byte_size(),
                actual: bytes.len(),
            });
        }
        let heap = Heap::new();
        heap::verify(&bytes, &Sites::of(&descriptor), &heap)?;
        Ok(Self {
            descriptor,
            bytes,
            heap,
        })
    }

    /// Single native value.
    pub fn from_native<T: Native>(value: T) -> Self {
        let mut bytes = vec![0u8; T::SIZE];
        value.encode(&mut bytes);
        Self {
            descriptor: Arc::new(T::descriptor()),
            bytes,
            heap: Heap::new(),
        }
    }

    pub(crate) fn from_raw(descriptor: Arc<TypeDescriptor>, bytes: Vec<u8>, heap: Heap) -> Self {
        Self {
            descriptor,
            bytes,
            heap,
        }
    }

    /// Reassemble a split buffer.
    pub fn from_parts(flat: FlatBytes, reclaim: Reclaim) -> Result<Self> {
        heap::verify(&flat.bytes, &Sites::of(&flat.descriptor), &reclaim.heap)?;
        Ok(Self {
            descriptor: flat.descriptor,
            bytes: flat.bytes,
            heap: reclaim.heap,
        })
    }

    /// Separate the flat bytes from the capability that frees their
    /// out-of-line payloads.
    pub fn split(self) -> (FlatBytes, Reclaim) {
        (
            FlatBytes {
                descriptor: self.descriptor,
                bytes: self.bytes,
            },
            Reclaim { heap: self.heap },
        )
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn descriptor_arc(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stats(&self) -> Option<&AllocStats> {
        self.heap.stats()
    }

    /// Out-of-line payloads currently owned.
    pub fn live_payloads(&self) -> usize {
        self.heap.live()
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView {
            descriptor: &self.descriptor,
            bytes: &self.bytes,
            heap: &self.heap,
        }
    }

    /// Deep copy with independently owned payloads.
    pub fn try_clone(&self) -> Result<Self> {
        let mut bytes = self.bytes.clone();
        let mut heap = Heap::with_stats(self.heap.stats().cloned());
        heap::deep_copy(&mut bytes, &Sites::of(&self.descriptor), &self.heap, &mut heap)?;
        Ok(Self {
            descriptor: self.descriptor.clone(),
            bytes,
            heap,
        })
    }

    /// Free all payloads and zero the record.
    pub fn reset(&mut self) -> Result<()> {
        heap::release(&mut self.bytes, &Sites::of(&self.descriptor), &mut self.heap)?;
        self.bytes.fill(0);
        Ok(())
    }

    /// Structural equality: same descriptor and equal values, comparing
    /// out-of-line contents rather than handles.
    pub fn value_eq(&self, other: &Buffer) -> bool {
        self.view().value_eq(&other.view())
    }

    // ------------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------------

    /// Store a native number or boolean at `path`, converting to the slot's
    /// layout. Enum slots take the raw ordinal.
    pub fn set<T: Native>(&mut self, path: &str, value: T) -> Result<()> {
        let (offset, slot) = resolve(&self.descriptor, path)?;
        if slot.has_out_of_line() || matches!(slot.kind(), Kind::Compound | Kind::Array) {
            return Err(Error::KindMismatch {
                expected: T::descriptor().kind(),
                found: slot.kind(),
            });
        }
        let size = slot.byte_size();
        encode_native(value, slot, &mut self.bytes[offset..offset + size], path)
    }

    /// Store an enum value by name.
    pub fn set_enum(&mut self, path: &str, name: &str) -> Result<()> {
        let (offset, slot) = resolve(&self.descriptor, path)?;
        let TypeDescriptor::Enum(e) = slot else {
            return Err(Error::KindMismatch {
                expected: Kind::Enum,
                found: slot.kind(),
            });
        };
        let value = e.value_of(name).ok_or_else(|| unknown(name))?;
        let size = slot.byte_size();
        encode_integer(i128::from(value), e.underlying(), &mut self.bytes[offset..offset + size]);
        Ok(())
    }

    /// Copy raw bytes into an in-line slot (bitfields, opaque blobs).
    pub fn set_bytes(&mut self, path: &str, raw: &[u8]) -> Result<()> {
        let (offset, slot) = resolve(&self.descriptor, path)?;
        if slot.has_out_of_line() {
            return Err(Error::KindMismatch {
                expected: Kind::Opaque,
                found: slot.kind(),
            });
        }
        if raw.len() != slot.byte_size() {
            return Err(Error::SizeMismatch {
                expected: slot.byte_size(),
                actual: raw.len(),
            });
        }
        self.bytes[offset..offset + raw.len()].copy_from_slice(raw);
        Ok(())
    }

    /// Store a string. Fixed slots are truncated or NUL-padded; variable
    /// slots get a fresh payload and free the old one.
    pub fn set_string(&mut self, path: &str, value: &str) -> Result<()> {
        let (offset, slot) = resolve(&self.descriptor, path)?;
        match slot {
            TypeDescriptor::FixedString { byte_length } => {
                let target = &mut self.bytes[offset..offset + byte_length];
                target.fill(0);
                let n = value.len().min(*byte_length);
                target[..n].copy_from_slice(&value.as_bytes()[..n]);
                Ok(())
            }
            TypeDescriptor::VariableString => heap::store_string(
                &mut self.bytes[offset..offset + REFERENCE_SIZE],
                &mut self.heap,
                value.as_bytes(),
            ),
            other => Err(Error::KindMismatch {
                expected: Kind::String,
                found: other.kind(),
            }),
        }
    }

    /// Replace the variable sequence at `path` with deep copies of
    /// `elements`, each of which must carry the sequence's element
    /// descriptor. An empty slice stores a null reference.
    pub fn set_sequence(&mut self, path: &str, elements: &[Buffer]) -> Result<()> {
        let (offset, slot) = resolve(&self.descriptor, path)?;
        let TypeDescriptor::Variable(element) = slot else {
            return Err(Error::KindMismatch {
                expected: Kind::Variable,
                found: slot.kind(),
            });
        };
        let size = element.byte_size();
        let element_sites = Sites::of(element);

        if let Some((i, item)) = elements
            .iter()
            .enumerate()
            .find(|(_, item)| item.descriptor() != &**element)
        {
            return Err(Error::invalid(format!(
                "sequence element {} is {}, expected {}",
                i,
                item.descriptor(),
                element
            )));
        }

        let mut payload = vec![0u8; size * elements.len()];
        for (i, item) in elements.iter().enumerate() {
            let chunk = &mut payload[i * size..(i + 1) * size];
            chunk.copy_from_slice(&item.bytes);
            if let Err(err) = heap::deep_copy(chunk, &element_sites, &item.heap, &mut self.heap) {
                for done in payload[..i * size].chunks_exact_mut(size.max(1)) {
                    heap::release(done, &element_sites, &mut self.heap)?;
                }
                return Err(err);
            }
        }
        store_sequence(&mut self.bytes, &mut self.heap, offset, slot, payload, elements.len())
    }

    /// Replace the variable sequence at `path` with native values,
    /// converting each to the element layout.
    pub fn set_native_sequence<T: Native>(&mut self, path: &str, values: &[T]) -> Result<()> {
        let (offset, slot) = resolve(&self.descriptor, path)?;
        let TypeDescriptor::Variable(element) = slot else {
            return Err(Error::KindMismatch {
                expected: Kind::Variable,
                found: slot.kind(),
            });
        };
        let scalar = matches!(
            element.kind(),
            Kind::Integer | Kind::Float | Kind::Boolean | Kind::Enum | Kind::Bitfield
        );
        if !scalar {
            return Err(Error::KindMismatch {
                expected: T::descriptor().kind(),
                found: element.kind(),
            });
        }
        let size = element.byte_size();
        let mut payload = vec![0u8; size * values.len()];
        for (i, value) in values.iter().enumerate() {
            encode_native(*value, element, &mut payload[i * size..(i + 1) * size], path)?;
        }
        store_sequence(&mut self.bytes, &mut self.heap, offset, slot, payload, values.len())
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    /// Read the scalar at `path` as `T`, converting when layouts differ.
    pub fn get<T: Native>(&self, path: &str) -> Result<T> {
        self.view().at(path)?.read()
    }

    /// Read the string at `path`.
    pub fn get_string(&self, path: &str) -> Result<String> {
        self.view().at(path)?.string()
    }
}

// ============================================================================
// Views
// ============================================================================

/// Borrowed, read-only view of a value inside a buffer.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    descriptor: &'a TypeDescriptor,
    bytes: &'a [u8],
    heap: &'a Heap,
}

impl<'a> BufferView<'a> {
    pub fn descriptor(&self) -> &'a TypeDescriptor {
        self.descriptor
    }

    /// Flat bytes of this value.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    fn sub(&self, descriptor: &'a TypeDescriptor, offset: usize) -> Result<BufferView<'a>> {
        let end = offset + descriptor.byte_size();
        let bytes = self.bytes.get(offset..end).ok_or(Error::SizeMismatch {
            expected: end,
            actual: self.bytes.len(),
        })?;
        Ok(BufferView {
            descriptor,
            bytes,
            heap: self.heap,
        })
    }

    /// Compound member by name.
    pub fn member(&self, name: &str) -> Result<BufferView<'a>> {
        let TypeDescriptor::Compound(compound) = self.descriptor else {
            return Err(Error::KindMismatch {
                expected: Kind::Compound,
                found: self.descriptor.kind(),
            });
        };
        let member = compound.member(name).ok_or_else(|| unknown(name))?;
        self.sub(&member.descriptor, member.offset)
    }

    /// Array element by row-major index.
    pub fn element(&self, index: usize) -> Result<BufferView<'a>> {
        let TypeDescriptor::Array(array) = self.descriptor else {
            return Err(Error::KindMismatch {
                expected: Kind::Array,
                found: self.descriptor.kind(),
            });
        };
        if index >= array.count() {
            return Err(Error::IndexOutOfBounds {
                index,
                length: array.count(),
            });
        }
        self.sub(array.element(), index * array.element().byte_size())
    }

    /// Value at a member path such as `grid[4].x`.
    pub fn at(&self, path: &str) -> Result<BufferView<'a>> {
        let (offset, descriptor) = resolve(self.descriptor, path)?;
        self.sub(descriptor, offset)
    }

    /// String bytes without padding or terminator. A null variable string
    /// reads as empty.
    pub fn string_bytes(&self) -> Result<&'a [u8]> {
        match self.descriptor {
            TypeDescriptor::FixedString { .. } => {
                let end = self
                    .bytes
                    .iter()
                    .position(|b| *b == 0)
                    .unwrap_or(self.bytes.len());
                Ok(&self.bytes[..end])
            }
            TypeDescriptor::VariableString => {
                let reference = Reference::read(self.bytes)?;
                if reference.is_null() {
                    return Ok(&[]);
                }
                let payload = self.heap.get(reference.handle)?;
                payload
                    .get(..reference.len as usize)
                    .ok_or(Error::SizeMismatch {
                        expected: reference.len as usize + 1,
                        actual: payload.len(),
                    })
            }
            other => Err(Error::KindMismatch {
                expected: Kind::String,
                found: other.kind(),
            }),
        }
    }

    /// String contents, invalid UTF-8 replaced.
    pub fn string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.string_bytes()?).into_owned())
    }

    /// Elements of a variable sequence.
    pub fn sequence(&self) -> Result<SequenceView<'a>> {
        let TypeDescriptor::Variable(element) = self.descriptor else {
            return Err(Error::KindMismatch {
                expected: Kind::Variable,
                found: self.descriptor.kind(),
            });
        };
        let reference = Reference::read(self.bytes)?;
        if reference.is_null() {
            return Ok(SequenceView {
                element: &**element,
                payload: &[],
                heap: self.heap,
                len: 0,
            });
        }
        let payload = self.heap.get(reference.handle)?;
        let len = reference.len as usize;
        if payload.len() != len * element.byte_size() {
            return Err(Error::SizeMismatch {
                expected: len * element.byte_size(),
                actual: payload.len(),
            });
        }
        Ok(SequenceView {
            element: &**element,
            payload,
            heap: self.heap,
            len,
        })
    }

    /// Name of the enum value stored here.
    pub fn enum_name(&self) -> Result<&'a str> {
        let TypeDescriptor::Enum(e) = self.descriptor else {
            return Err(Error::KindMismatch {
                expected: Kind::Enum,
                found: self.descriptor.kind(),
            });
        };
        let value = decode_integer(self.bytes, e.underlying()) as i64;
        e.name_of(value).ok_or(Error::UnknownEnumValue {
            path: String::new(),
            value,
        })
    }

    /// Read a scalar as `T`, converting when the layout differs. Enums read
    /// as their ordinal.
    pub fn read<T: Native>(&self) -> Result<T> {
        let native = T::descriptor();
        let layout = numeric_layout(self.descriptor);
        if layout == native {
            return Ok(T::decode(self.bytes));
        }
        let mut out = vec![0u8; T::SIZE];
        let converter = NativeConverter;
        let mut scratch = vec![0u8; T::SIZE.max(layout.byte_size())];
        let scratch = converter
            .needs_scratch(&layout, &native)
            .then_some(scratch.as_mut_slice());
        converter
            .convert_scalar(self.bytes, &layout, &mut out, &native, scratch)
            .map_err(|e| scalar_error("", e))?;
        Ok(T::decode(&out))
    }

    /// Structural equality, comparing out-of-line contents.
    pub fn value_eq(&self, other: &BufferView<'_>) -> bool {
        if self.descriptor != other.descriptor {
            return false;
        }
        match self.descriptor {
            TypeDescriptor::VariableString => {
                matches!((self.string_bytes(), other.string_bytes()), (Ok(a), Ok(b)) if a == b)
            }
            TypeDescriptor::Variable(_) => match (self.sequence(), other.sequence()) {
                (Ok(a), Ok(b)) => {
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.value_eq(&y))
                }
                _ => false,
            },
            TypeDescriptor::Array(array) if array.element().has_out_of_line() => (0..array.count())
                .all(|i| match (self.element(i), other.element(i)) {
                    (Ok(a), Ok(b)) => a.value_eq(&b),
                    _ => false,
                }),
            TypeDescriptor::Compound(compound) if self.descriptor.has_out_of_line() => {
                compound.members().iter().all(|m| {
                    match (self.member(&m.name), other.member(&m.name)) {
                        (Ok(a), Ok(b)) => a.value_eq(&b),
                        _ => false,
                    }
                })
            }
            _ => self.bytes == other.bytes,
        }
    }
}

/// Borrowed elements of a variable sequence.
#[derive(Debug, Clone, Copy)]
pub struct SequenceView<'a> {
    element: &'a TypeDescriptor,
    payload: &'a [u8],
    heap: &'a Heap,
    len: usize,
}

impl<'a> SequenceView<'a> {
    pub fn element_descriptor(&self) -> &'a TypeDescriptor {
        self.element
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Result<BufferView<'a>> {
        if index >= self.len {
            return Err(Error::IndexOutOfBounds {
                index,
                length: self.len,
            });
        }
        let size = self.element.byte_size();
        Ok(BufferView {
            descriptor: self.element,
            bytes: &self.payload[index * size..(index + 1) * size],
            heap: self.heap,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = BufferView<'a>> + '_ {
        (0..self.len).filter_map(move |i| self.get(i).ok())
    }
}
