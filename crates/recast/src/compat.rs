// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compatibility checking between a source and a target descriptor.
//!
//! [`check`] classifies every difference between two descriptors into
//! impossible, narrowing, reordered, discarded and unknown paths. A
//! [`ConversionCriteria`] then decides which of those are tolerable.

use crate::descriptor::TypeDescriptor;
use crate::precision;
use crate::walk::{FieldPath, Segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

/// Which lossy or structural differences a conversion tolerates.
///
/// Impossible conversions are never tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionCriteria {
    /// Permit conversions that may lose numeric range or string length.
    pub allow_narrowing: bool,
    /// Permit arrays with equal element count but different dimensions.
    pub allow_reordering: bool,
    /// Permit source members that the target drops.
    pub allow_discarding: bool,
    /// Permit target members with no source counterpart (zero-filled).
    pub allow_unknown: bool,
}

impl Default for ConversionCriteria {
    fn default() -> Self {
        Self {
            allow_narrowing: true,
            allow_reordering: false,
            allow_discarding: false,
            allow_unknown: false,
        }
    }
}

impl ConversionCriteria {
    /// Rejects every difference.
    pub fn strict() -> Self {
        Self {
            allow_narrowing: false,
            ..Self::default()
        }
    }

    /// Tolerates every difference except impossible ones.
    pub fn permissive() -> Self {
        Self {
            allow_narrowing: true,
            allow_reordering: true,
            allow_discarding: true,
            allow_unknown: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Source and target descriptors at a reported path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePair {
    pub source: TypeDescriptor,
    pub target: TypeDescriptor,
}

/// Classification of the differences between two descriptors.
///
/// Built once by [`check`] and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityReport {
    impossible: BTreeMap<FieldPath, TypePair>,
    narrowing: BTreeMap<FieldPath, TypePair>,
    reordered: BTreeMap<FieldPath, TypePair>,
    discarded: BTreeSet<FieldPath>,
    unknown: BTreeSet<FieldPath>,
}

impl CompatibilityReport {
    pub fn impossible(&self) -> &BTreeMap<FieldPath, TypePair> {
        &self.impossible
    }

    pub fn narrowing(&self) -> &BTreeMap<FieldPath, TypePair> {
        &self.narrowing
    }

    pub fn reordered(&self) -> &BTreeMap<FieldPath, TypePair> {
        &self.reordered
    }

    /// Source members absent from the target.
    pub fn discarded(&self) -> &BTreeSet<FieldPath> {
        &self.discarded
    }

    /// Target members absent from the source.
    pub fn unknown(&self) -> &BTreeSet<FieldPath> {
        &self.unknown
    }

    /// No differences at all.
    pub fn is_empty(&self) -> bool {
        self.impossible.is_empty()
            && self.narrowing.is_empty()
            && self.reordered.is_empty()
            && self.discarded.is_empty()
            && self.unknown.is_empty()
    }

    /// Whether a conversion under `criteria` may proceed.
    pub fn accept(&self, criteria: &ConversionCriteria) -> bool {
        self.impossible.is_empty()
            && (criteria.allow_narrowing || self.narrowing.is_empty())
            && (criteria.allow_reordering || self.reordered.is_empty())
            && (criteria.allow_discarding || self.discarded.is_empty())
            && (criteria.allow_unknown || self.unknown.is_empty())
    }

    /// Text blocks for every category `criteria` rejects. Empty if accepted.
    pub fn violations(&self, criteria: &ConversionCriteria) -> String {
        let mut out = String::new();
        render_pairs(&mut out, "Impossible conversions:", &self.impossible);
        if !criteria.allow_narrowing {
            render_pairs(&mut out, "Narrowing conversions:", &self.narrowing);
        }
        if !criteria.allow_reordering {
            render_pairs(&mut out, "Reordered arrays:", &self.reordered);
        }
        if !criteria.allow_discarding {
            render_paths(&mut out, "Discarded compound members:", &self.discarded);
        }
        if !criteria.allow_unknown {
            render_paths(&mut out, "Unknown compound members:", &self.unknown);
        }
        out
    }

    /// Text blocks for every non-empty category.
    pub fn render(&self) -> String {
        let mut out = String::new();
        render_pairs(&mut out, "Impossible conversions:", &self.impossible);
        render_pairs(&mut out, "Narrowing conversions:", &self.narrowing);
        render_pairs(&mut out, "Reordered arrays:", &self.reordered);
        render_paths(&mut out, "Discarded compound members:", &self.discarded);
        render_paths(&mut out, "Unknown compound members:", &self.unknown);
        out
    }

    fn record(
        map: &mut BTreeMap<FieldPath, TypePair>,
        path: &FieldPath,
        source: &TypeDescriptor,
        target: &TypeDescriptor,
    ) {
        map.insert(
            path.clone(),
            TypePair {
                source: source.clone(),
                target: target.clone(),
            },
        );
    }

    fn visit(&mut self, path: &mut FieldPath, source: &TypeDescriptor, target: &TypeDescriptor) {
        use TypeDescriptor as T;

        // Containers are validated element by element as the walk descends.
        let malformed = |d: &TypeDescriptor| {
            !matches!(d, T::Array(_) | T::Variable(_) | T::Compound(_)) && d.validate().is_err()
        };
        if malformed(source) || malformed(target) {
            Self::record(&mut self.impossible, path, source, target);
            return;
        }

        match (source, target) {
            (s, t) if s.is_numeric() && t.is_numeric() => {
                if precision::is_narrowing(s, t) {
                    Self::record(&mut self.narrowing, path, s, t);
                }
            }
            (T::Boolean, T::Boolean) => {}
            (T::Bitfield { width_bits: s }, T::Bitfield { width_bits: t }) => {
                if t < s {
                    Self::record(&mut self.narrowing, path, source, target);
                }
            }
            (T::FixedString { byte_length: s }, T::FixedString { byte_length: t }) => {
                if t < s {
                    Self::record(&mut self.narrowing, path, source, target);
                }
            }
            // Arbitrary length into a bounded slot.
            (T::VariableString, T::FixedString { .. }) => {
                Self::record(&mut self.narrowing, path, source, target);
            }
            (T::FixedString { .. } | T::VariableString, T::VariableString) => {}
            (T::Opaque { byte_length: s }, T::Opaque { byte_length: t }) if s == t => {}
            (T::Enum(s), T::Enum(t)) => {
                if !t.names_cover(s) {
                    Self::record(&mut self.impossible, path, source, target);
                }
            }
            (T::Array(s), T::Array(t)) => {
                if s.count() != t.count() {
                    Self::record(&mut self.impossible, path, source, target);
                    return;
                }
                if s.dims() != t.dims() {
                    Self::record(&mut self.reordered, path, source, target);
                }
                path.push(Segment::Element);
                self.visit(path, s.element(), t.element());
                path.pop();
            }
            (T::Variable(s), T::Variable(t)) => {
                path.push(Segment::Element);
                self.visit(path, s, t);
                path.pop();
            }
            (T::Compound(s), T::Compound(t)) => {
                for sm in s.members() {
                    path.push(Segment::Member(sm.name.clone()));
                    match t.member(&sm.name) {
                        Some(tm) => self.visit(path, &sm.descriptor, &tm.descriptor),
                        None => {
                            self.discarded.insert(path.clone());
                        }
                    }
                    path.pop();
                }
                for tm in t.members() {
                    if s.member(&tm.name).is_none() {
                        self.unknown
                            .insert(path.clone().member(tm.name.clone()));
                    }
                }
            }
            _ => Self::record(&mut self.impossible, path, source, target),
        }
    }
}

fn render_pairs(out: &mut String, title: &str, entries: &BTreeMap<FieldPath, TypePair>) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}", title);
    for (path, pair) in entries {
        let _ = writeln!(out, "    {}: {} -> {}", path, pair.source, pair.target);
    }
}

fn render_paths(out: &mut String, title: &str, entries: &BTreeSet<FieldPath>) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}", title);
    for path in entries {
        let _ = writeln!(out, "    {}", path);
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compare `source` against `target` and classify every difference.
pub fn check(source: &TypeDescriptor, target: &TypeDescriptor) -> CompatibilityReport {
    let mut report = CompatibilityReport::default();
    let mut path = FieldPath::root();
    report.visit(&mut path, source, target);
    log::debug!(
        "[compat] {} -> {}: {} impossible, {} narrowing, {} reordered, {} discarded, {} unknown",
        source,
        target,
        report.impossible.len(),
        report.narrowing.len(),
        report.reordered.len(),
        report.discarded.len(),
        report.unknown.len()
    );
    report
}

/// Whether `report` passes `criteria`.
pub fn accept(report: &CompatibilityReport, criteria: &ConversionCriteria) -> bool {
    report.accept(criteria)
}
