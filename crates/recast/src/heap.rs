// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Out-of-line payload storage.
//!
//! Variable strings and sequences keep a 16-byte [`Reference`] in the flat
//! record and their contents in a [`Heap`]. Handles are never zero, so an
//! all-zero reference is null. [`Sites`] lists every reference
//! slot of a descriptor, and [`deep_copy`] and [`release`] are driven by it.

use crate::descriptor::{TypeDescriptor, REFERENCE_SIZE};
use crate::error::{Error, Result};
use crate::walk::{Visit, Walk};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// References
// ============================================================================

/// In-line reference to out-of-line data.
///
/// `len` is the element count for sequences and the byte length (without
/// the NUL terminator) for strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reference {
    pub handle: u64,
    pub len: u64,
}

impl Reference {
    pub const NULL: Self = Self { handle: 0, len: 0 };

    pub fn is_null(&self) -> bool {
        self.handle == 0
    }

    /// Decode from the first [`REFERENCE_SIZE`] bytes of `bytes`.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < REFERENCE_SIZE {
            return Err(Error::SizeMismatch {
                expected: REFERENCE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut handle = [0u8; 8];
        let mut len = [0u8; 8];
        handle.copy_from_slice(&bytes[..8]);
        len.copy_from_slice(&bytes[8..REFERENCE_SIZE]);
        Ok(Self {
            handle: u64::from_le_bytes(handle),
            len: u64::from_le_bytes(len),
        })
    }

    /// Encode into the first [`REFERENCE_SIZE`] bytes of `bytes`.
    pub fn write(&self, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() < REFERENCE_SIZE {
            return Err(Error::SizeMismatch {
                expected: REFERENCE_SIZE,
                actual: bytes.len(),
            });
        }
        bytes[..8].copy_from_slice(&self.handle.to_le_bytes());
        bytes[8..REFERENCE_SIZE].copy_from_slice(&self.len.to_le_bytes());
        Ok(())
    }
}

// ============================================================================
// Allocation accounting
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    allocations: AtomicU64,
    releases: AtomicU64,
    bytes: AtomicU64,
}

/// Shared allocation counters.
///
/// Attach to a buffer with `Buffer::zeroed_with_stats`; buffers converted
/// or cloned from it report into the same counters.
#[derive(Debug, Clone, Default)]
pub struct AllocStats {
    inner: Arc<Counters>,
}

impl AllocStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocations(&self) -> u64 {
        self.inner.allocations.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.inner.releases.load(Ordering::Relaxed)
    }

    /// Payloads allocated and not yet released.
    pub fn live(&self) -> u64 {
        self.allocations().saturating_sub(self.releases())
    }

    /// Total payload bytes ever allocated.
    pub fn bytes_allocated(&self) -> u64 {
        self.inner.bytes.load(Ordering::Relaxed)
    }

    fn on_alloc(&self, len: usize) {
        self.inner.allocations.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(len as u64, Ordering::Relaxed);
    }

    fn on_release(&self, count: u64) {
        self.inner.releases.fetch_add(count, Ordering::Relaxed);
    }
}

// ============================================================================
// Heap
// ============================================================================

/// Arena owning the out-of-line payloads of one record.
///
/// A handle packs a slot generation (high 32 bits) with the slot index plus
/// one (low 32 bits). Freed slots are reused under a new generation, so a
/// stale handle fails with [`Error::DanglingHandle`] instead of aliasing
/// new data.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<usize>,
    live: usize,
    stats: Option<AllocStats>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    payload: Option<Box<[u8]>>,
}

fn pack(index: usize, generation: u32) -> u64 {
    (u64::from(generation) << 32) | (index as u64 + 1)
}

fn unpack(handle: u64) -> Option<(usize, u32)> {
    let index = (handle & 0xffff_ffff).checked_sub(1)?;
    Some((index as usize, (handle >> 32) as u32))
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: Option<AllocStats>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            stats,
        }
    }

    pub fn stats(&self) -> Option<&AllocStats> {
        self.stats.as_ref()
    }

    /// Number of payloads currently held.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots ever handed out, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store a payload and return its handle.
    pub fn alloc(&mut self, payload: Vec<u8>) -> u64 {
        if let Some(stats) = &self.stats {
            stats.on_alloc(payload.len());
        }
        let payload = Some(payload.into_boxed_slice());
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation = slot.generation.wrapping_add(1);
                slot.payload = payload;
                pack(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    payload,
                });
                pack(self.slots.len() - 1, 0)
            }
        };
        self.live += 1;
        log::trace!("[heap] alloc handle={:#x} live={}", handle, self.live);
        handle
    }

    fn index(&self, handle: u64) -> Result<usize> {
        unpack(handle)
            .filter(|(index, generation)| {
                self.slots
                    .get(*index)
                    .is_some_and(|slot| slot.generation == *generation && slot.payload.is_some())
            })
            .map(|(index, _)| index)
            .ok_or(Error::DanglingHandle { handle })
    }

    pub fn get(&self, handle: u64) -> Result<&[u8]> {
        let index = self.index(handle)?;
        self.slots[index]
            .payload
            .as_deref()
            .ok_or(Error::DanglingHandle { handle })
    }

    pub fn get_mut(&mut self, handle: u64) -> Result<&mut [u8]> {
        let index = self.index(handle)?;
        self.slots[index]
            .payload
            .as_deref_mut()
            .ok_or(Error::DanglingHandle { handle })
    }

    /// Remove a payload from the arena. Its handle dangles afterwards.
    pub fn take(&mut self, handle: u64) -> Result<Box<[u8]>> {
        let index = self.index(handle)?;
        let payload = self.slots[index]
            .payload
            .take()
            .ok_or(Error::DanglingHandle { handle })?;
        self.free.push(index);
        self.live -= 1;
        if let Some(stats) = &self.stats {
            stats.on_release(1);
        }
        log::trace!("[heap] release handle={:#x} live={}", handle, self.live);
        Ok(payload)
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if self.live > 0 {
            if let Some(stats) = &self.stats {
                stats.on_release(self.live as u64);
            }
        }
    }
}

// ============================================================================
// Reference sites
// ============================================================================

/// A variable sequence slot and the sites inside each of its elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSite {
    pub offset: usize,
    pub element_size: usize,
    pub element: Sites,
}

/// Offsets of every in-line reference in a flat record.
///
/// Array elements are expanded, so a `[3]str` yields three string offsets.
/// Sites inside sequence elements are kept per sequence, relative to the
/// element start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sites {
    strings: Vec<usize>,
    sequences: Vec<SequenceSite>,
}

impl Sites {
    /// Collect the reference sites of `descriptor`.
    pub fn of(descriptor: &TypeDescriptor) -> Self {
        let mut sites = Self::default();
        if !descriptor.has_out_of_line() {
            return sites;
        }

        let mut walk = Walk::new(descriptor);
        while let Some(step) = walk.next() {
            match (step.visit(), step.descriptor()) {
                (Visit::Leaf, TypeDescriptor::VariableString) => {
                    sites.strings.push(step.offset());
                }
                (Visit::Enter, TypeDescriptor::Variable(element)) => {
                    sites.sequences.push(SequenceSite {
                        offset: step.offset(),
                        element_size: element.byte_size(),
                        element: Self::of(element),
                    });
                    walk.skip_children();
                }
                (Visit::Enter, TypeDescriptor::Array(array)) => {
                    let inner = Self::of(array.element());
                    let stride = array.element().byte_size();
                    if !inner.is_empty() {
                        for i in 0..array.count() {
                            sites.extend_shifted(&inner, step.offset() + i * stride);
                        }
                    }
                    walk.skip_children();
                }
                _ => {}
            }
        }
        sites
    }

    fn extend_shifted(&mut self, other: &Sites, base: usize) {
        self.strings.extend(other.strings.iter().map(|o| o + base));
        self.sequences
            .extend(other.sequences.iter().map(|s| SequenceSite {
                offset: s.offset + base,
                ..s.clone()
            }));
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty() && self.sequences.is_empty()
    }

    pub fn strings(&self) -> &[usize] {
        &self.strings
    }

    pub fn sequences(&self) -> &[SequenceSite] {
        &self.sequences
    }
}

// ============================================================================
// Deep copy and release
// ============================================================================

fn reference_slot(flat: &mut [u8], offset: usize) -> Result<&mut [u8]> {
    let actual = flat.len();
    flat.get_mut(offset..offset + REFERENCE_SIZE)
        .ok_or(Error::SizeMismatch {
            expected: offset + REFERENCE_SIZE,
            actual,
        })
}

/// Copy every payload `flat` refers to from `from` into `to` and rewrite
/// the references in `flat` to the new handles.
///
/// On error every payload this call placed in `to` is freed again and
/// `flat` must be treated as garbage.
pub fn deep_copy(flat: &mut [u8], sites: &Sites, from: &Heap, to: &mut Heap) -> Result<()> {
    let mut allocated = Vec::new();
    let result = copy_sites(flat, sites, from, to, &mut allocated);
    if result.is_err() {
        log::debug!("[heap] deep copy failed, unwinding {} payloads", allocated.len());
        for handle in allocated {
            to.take(handle)?;
        }
    }
    result
}

fn copy_sites(
    flat: &mut [u8],
    sites: &Sites,
    from: &Heap,
    to: &mut Heap,
    allocated: &mut Vec<u64>,
) -> Result<()> {
    for &offset in &sites.strings {
        let slot = reference_slot(flat, offset)?;
        let reference = Reference::read(slot)?;
        if reference.is_null() {
            continue;
        }
        let payload = from.get(reference.handle)?.to_vec();
        let handle = to.alloc(payload);
        allocated.push(handle);
        Reference { handle, ..reference }.write(slot)?;
    }

    for site in &sites.sequences {
        let slot = reference_slot(flat, site.offset)?;
        let reference = Reference::read(slot)?;
        if reference.is_null() {
            continue;
        }
        let mut payload = from.get(reference.handle)?.to_vec();
        if !site.element.is_empty() {
            for i in 0..reference.len as usize {
                let start = i * site.element_size;
                let element = payload
                    .get_mut(start..start + site.element_size)
                    .ok_or(Error::DanglingHandle {
                        handle: reference.handle,
                    })?;
                copy_sites(element, &site.element, from, to, allocated)?;
            }
        }
        let handle = to.alloc(payload);
        allocated.push(handle);
        Reference { handle, ..reference }.write(slot)?;
    }
    Ok(())
}

/// Free every payload `flat` refers to, nested ones included, and null the
/// references. Returns the number of payloads freed.
pub fn release(flat: &mut [u8], sites: &Sites, heap: &mut Heap) -> Result<usize> {
    let mut freed = 0;

    for &offset in &sites.strings {
        let slot = reference_slot(flat, offset)?;
        let reference = Reference::read(slot)?;
        if reference.is_null() {
            continue;
        }
        heap.take(reference.handle)?;
        Reference::NULL.write(slot)?;
        freed += 1;
    }

    for site in &sites.sequences {
        let slot = reference_slot(flat, site.offset)?;
        let reference = Reference::read(slot)?;
        if reference.is_null() {
            continue;
        }
        let mut payload = heap.take(reference.handle)?;
        if !site.element.is_empty() {
            for element in payload
                .chunks_exact_mut(site.element_size.max(1))
                .take(reference.len as usize)
            {
                freed += release(element, &site.element, heap)?;
            }
        }
        Reference::NULL.write(slot)?;
        freed += 1;
    }
    Ok(freed)
}

/// Check that every non-null reference in `flat` resolves in `heap`.
pub fn verify(flat: &[u8], sites: &Sites, heap: &Heap) -> Result<()> {
    for &offset in &sites.strings {
        let reference = Reference::read(flat.get(offset..).unwrap_or_default())?;
        if !reference.is_null() {
            heap.get(reference.handle)?;
        }
    }
    for site in &sites.sequences {
        let reference = Reference::read(flat.get(site.offset..).unwrap_or_default())?;
        if reference.is_null() {
            continue;
        }
        let payload = heap.get(reference.handle)?;
        if !site.element.is_empty() {
            for element in payload
                .chunks_exact(site.element_size.max(1))
                .take(reference.len as usize)
            {
                verify(element, &site.element, heap)?;
            }
        }
    }
    Ok(())
}

/// Replace the out-of-line value at `slot` with a copy of `bytes` plus a NUL
/// terminator, freeing the previous payload.
pub(crate) fn store_string(slot: &mut [u8], heap: &mut Heap, bytes: &[u8]) -> Result<()> {
    let previous = Reference::read(slot)?;
    if !previous.is_null() {
        heap.take(previous.handle)?;
    }
    let mut payload = Vec::with_capacity(bytes.len() + 1);
    payload.extend_from_slice(bytes);
    payload.push(0);
    let handle = heap.alloc(payload);
    Reference {
        handle,
        len: bytes.len() as u64,
    }
    .write(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{CompoundBuilder, IntegerType};

    fn record() -> TypeDescriptor {
        let inner = CompoundBuilder::new()
            .member("id", TypeDescriptor::from(IntegerType::U32))
            .member("label", TypeDescriptor::VariableString)
            .build()
            .expect("inner");
        CompoundBuilder::new()
            .member("name", TypeDescriptor::VariableString)
            .member(
                "tags",
                TypeDescriptor::array(TypeDescriptor::VariableString, &[2]).expect("tags"),
            )
            .member("items", TypeDescriptor::variable(inner))
            .build()
            .expect("record")
    }

    #[test]
    fn test_reference_codec() {
        let mut raw = [0u8; REFERENCE_SIZE];
        let r = Reference { handle: 7, len: 3 };
        r.write(&mut raw).expect("write");
        assert_eq!(Reference::read(&raw).expect("read"), r);
        assert!(Reference::read(&raw[..4]).is_err());
    }

    #[test]
    fn test_sites_expand_arrays() {
        let sites = Sites::of(&record());
        assert_eq!(sites.strings(), &[0, 16, 32]);
        assert_eq!(sites.sequences().len(), 1);
        let items = &sites.sequences()[0];
        assert_eq!(items.offset, 48);
        assert_eq!(items.element_size, 20);
        assert_eq!(items.element.strings(), &[4]);
    }

    #[test]
    fn test_heap_handles() {
        let mut heap = Heap::new();
        let h = heap.alloc(vec![1, 2, 3]);
        assert_eq!(heap.get(h).expect("payload"), &[1, 2, 3]);
        heap.take(h).expect("take");
        assert!(matches!(heap.get(h), Err(Error::DanglingHandle { .. })));
        assert!(heap.take(h).is_err());
        assert!(heap.get(0).is_err());
    }

    #[test]
    fn test_freed_slots_are_reused_under_new_generation() {
        let mut heap = Heap::new();
        let stale = heap.alloc(vec![1]);
        heap.take(stale).expect("take");
        let fresh = heap.alloc(vec![2]);
        assert_ne!(stale, fresh);
        assert_eq!(heap.capacity(), 1);
        assert!(matches!(heap.get(stale), Err(Error::DanglingHandle { .. })));
        assert_eq!(heap.get(fresh).expect("fresh"), &[2]);
    }

    #[test]
    fn test_rewrites_keep_slot_count_bounded() {
        let mut heap = Heap::new();
        let mut slot = [0u8; REFERENCE_SIZE];
        for i in 0..100u8 {
            store_string(&mut slot, &mut heap, &[b'a' + i % 26]).expect("store");
        }
        assert_eq!(heap.live(), 1);
        assert_eq!(heap.capacity(), 1);
    }

    #[test]
    fn test_failed_deep_copy_frees_partial_copies() {
        let desc = record();
        let sites = Sites::of(&desc);
        let stats = AllocStats::new();
        let mut source = Heap::with_stats(Some(stats.clone()));
        let mut flat = vec![0u8; desc.byte_size()];
        store_string(&mut flat[0..16], &mut source, b"alpha").expect("name");
        // Items point at a payload the source heap does not hold.
        Reference { handle: 99, len: 1 }
            .write(&mut flat[48..64])
            .expect("items");

        let mut target = Heap::with_stats(Some(stats.clone()));
        let err = deep_copy(&mut flat, &sites, &source, &mut target).unwrap_err();
        assert!(matches!(err, Error::DanglingHandle { handle: 99 }));
        assert!(target.is_empty());
        assert_eq!(stats.allocations(), 2);
        assert_eq!(stats.live(), 1);
    }

    #[test]
    fn test_deep_copy_then_release() {
        let desc = record();
        let sites = Sites::of(&desc);
        let stats = AllocStats::new();
        let mut source = Heap::with_stats(Some(stats.clone()));
        let mut flat = vec![0u8; desc.byte_size()];

        store_string(&mut flat[0..16], &mut source, b"alpha").expect("name");
        let mut element = vec![0u8; 20];
        store_string(&mut element[4..20], &mut source, b"x").expect("label");
        let handle = source.alloc(element);
        Reference { handle, len: 1 }
            .write(&mut flat[48..64])
            .expect("items");
        assert_eq!(source.live(), 3);

        let mut copy = flat.clone();
        let mut target = Heap::with_stats(Some(stats.clone()));
        deep_copy(&mut copy, &sites, &source, &mut target).expect("deep copy");
        assert_eq!(target.live(), 3);
        verify(&copy, &sites, &target).expect("copy resolves");

        let name = Reference::read(&copy[0..16]).expect("name ref");
        assert_eq!(name.len, 5);
        assert_eq!(target.get(name.handle).expect("name"), b"alpha\0");

        let freed = release(&mut copy, &sites, &mut target).expect("release");
        assert_eq!(freed, 3);
        assert!(target.is_empty());
        assert!(Reference::read(&copy[48..64]).expect("items").is_null());

        drop(source);
        drop(target);
        assert_eq!(stats.live(), 0);
        assert_eq!(stats.allocations(), 6);
    }
}
