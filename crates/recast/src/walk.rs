// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Depth-first traversal of a descriptor tree.
//!
//! [`Walk`] yields one [`Step`] per node in pre-order. Compounds, arrays and
//! variable sequences produce an `Enter` step, their children, then an `Exit`
//! step. Arrays and sequences have a single child: the representative
//! element at relative offset zero. Elements of a variable sequence live out
//! of line, so their offsets restart at zero and their steps report
//! `is_in_line() == false`.

use crate::descriptor::{
    ArrayType, CompoundType, EnumType, FloatType, IntegerType, Kind, TypeDescriptor,
};
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Field paths
// ============================================================================

/// One component of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    /// Compound member by name.
    Member(String),
    /// Element of an array or variable sequence.
    Element,
}

/// Location of a node relative to the root descriptor.
///
/// Rendered as member names joined with `.`, with `[]` appended for each
/// array or sequence element, e.g. `points[].x`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Extend with a member segment.
    pub fn member(mut self, name: impl Into<String>) -> Self {
        self.0.push(Segment::Member(name.into()));
        self
    }

    /// Extend with an element segment.
    pub fn element(mut self) -> Self {
        self.0.push(Segment::Element);
        self
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn pop(&mut self) -> Option<Segment> {
        self.0.pop()
    }

    /// Name of the last member segment, if any.
    pub fn last_member(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|s| match s {
            Segment::Member(name) => Some(name.as_str()),
            Segment::Element => None,
        })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            match segment {
                Segment::Member(name) => {
                    if !first {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Segment::Element => f.write_str("[]")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = Infallible;

    /// Parse the rendered form back (`a.b[].c`); `""` is the root.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut path = Self::root();
        if s.is_empty() {
            return Ok(path);
        }
        for part in s.split('.') {
            let mut name = part;
            let mut elements = 0;
            while let Some(stripped) = name.strip_suffix("[]") {
                name = stripped;
                elements += 1;
            }
            if !name.is_empty() {
                path.push(Segment::Member(name.to_string()));
            }
            for _ in 0..elements {
                path.push(Segment::Element);
            }
        }
        Ok(path)
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Whether a step is a leaf or opens/closes a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visit {
    Leaf,
    Enter,
    Exit,
}

/// Totally ordered position within one traversal.
///
/// Positions from walks over different roots are unordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    root: usize,
    key: Vec<usize>,
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.root != other.root {
            return None;
        }
        Some(self.key.cmp(&other.key))
    }
}

/// One node of a traversal.
#[derive(Debug, Clone)]
pub struct Step<'a> {
    descriptor: &'a TypeDescriptor,
    visit: Visit,
    path: FieldPath,
    depth: usize,
    offset: usize,
    nested_offset: usize,
    in_line: bool,
    position: Position,
}

impl<'a> Step<'a> {
    pub fn descriptor(&self) -> &'a TypeDescriptor {
        self.descriptor
    }

    pub fn kind(&self) -> Kind {
        self.descriptor.kind()
    }

    pub fn visit(&self) -> Visit {
        self.visit
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Dotted name of the node, e.g. `outer.inner[].x`.
    pub fn full_name(&self) -> String {
        self.path.to_string()
    }

    /// Number of enclosing composites.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Byte offset from the start of the enclosing flat buffer (or of the
    /// element payload when inside a variable sequence). Exit steps report
    /// the end of the composite.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte offset relative to the immediately enclosing composite.
    pub fn nested_offset(&self) -> usize {
        self.nested_offset
    }

    /// False when the node lives inside a variable sequence payload.
    pub fn is_in_line(&self) -> bool {
        self.in_line
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    fn mismatch(&self, expected: Kind) -> Error {
        Error::KindMismatch {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_integer(&self) -> Result<IntegerType> {
        match self.descriptor {
            TypeDescriptor::Integer(int) => Ok(*int),
            _ => Err(self.mismatch(Kind::Integer)),
        }
    }

    pub fn as_float(&self) -> Result<FloatType> {
        match self.descriptor {
            TypeDescriptor::Float(float) => Ok(*float),
            _ => Err(self.mismatch(Kind::Float)),
        }
    }

    /// Bitfield width in bits.
    pub fn as_bitfield(&self) -> Result<u32> {
        match self.descriptor {
            TypeDescriptor::Bitfield { width_bits } => Ok(*width_bits),
            _ => Err(self.mismatch(Kind::Bitfield)),
        }
    }

    /// Fixed length, or `None` for a variable string.
    pub fn as_string(&self) -> Result<Option<usize>> {
        match self.descriptor {
            TypeDescriptor::FixedString { byte_length } => Ok(Some(*byte_length)),
            TypeDescriptor::VariableString => Ok(None),
            _ => Err(self.mismatch(Kind::String)),
        }
    }

    pub fn as_opaque(&self) -> Result<usize> {
        match self.descriptor {
            TypeDescriptor::Opaque { byte_length } => Ok(*byte_length),
            _ => Err(self.mismatch(Kind::Opaque)),
        }
    }

    pub fn as_enum(&self) -> Result<&'a EnumType> {
        match self.descriptor {
            TypeDescriptor::Enum(e) => Ok(e),
            _ => Err(self.mismatch(Kind::Enum)),
        }
    }

    pub fn as_array(&self) -> Result<&'a ArrayType> {
        match self.descriptor {
            TypeDescriptor::Array(array) => Ok(array),
            _ => Err(self.mismatch(Kind::Array)),
        }
    }

    /// Element descriptor of a variable sequence.
    pub fn as_variable(&self) -> Result<&'a TypeDescriptor> {
        match self.descriptor {
            TypeDescriptor::Variable(element) => Ok(&**element),
            _ => Err(self.mismatch(Kind::Variable)),
        }
    }

    pub fn as_compound(&self) -> Result<&'a CompoundType> {
        match self.descriptor {
            TypeDescriptor::Compound(compound) => Ok(compound),
            _ => Err(self.mismatch(Kind::Compound)),
        }
    }
}

// ============================================================================
// Walk
// ============================================================================

#[derive(Debug, Clone)]
struct Frame<'a> {
    descriptor: &'a TypeDescriptor,
    path: FieldPath,
    key: Vec<usize>,
    offset: usize,
    nested_offset: usize,
    in_line: bool,
    next: usize,
}

impl<'a> Frame<'a> {
    fn len(&self) -> usize {
        match self.descriptor {
            TypeDescriptor::Compound(compound) => compound.members().len(),
            _ => 1,
        }
    }

    fn child(&self, index: usize) -> (&'a TypeDescriptor, usize, Segment, bool) {
        match self.descriptor {
            TypeDescriptor::Compound(compound) => {
                let m = &compound.members()[index];
                (
                    &*m.descriptor,
                    self.offset + m.offset,
                    Segment::Member(m.name.clone()),
                    self.in_line,
                )
            }
            TypeDescriptor::Array(array) => {
                (array.element(), self.offset, Segment::Element, self.in_line)
            }
            TypeDescriptor::Variable(element) => (&**element, 0, Segment::Element, false),
            // Only composites are pushed as frames.
            leaf => (leaf, self.offset, Segment::Element, self.in_line),
        }
    }
}

/// Restartable pre-order iterator over a descriptor.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    root: &'a TypeDescriptor,
    started: bool,
    stack: Vec<Frame<'a>>,
}

impl<'a> Walk<'a> {
    pub fn new(root: &'a TypeDescriptor) -> Self {
        Self {
            root,
            started: false,
            stack: Vec::new(),
        }
    }

    pub fn root(&self) -> &'a TypeDescriptor {
        self.root
    }

    /// Rewind to before the root step.
    pub fn restart(&mut self) {
        self.started = false;
        self.stack.clear();
    }

    /// After an `Enter` step, skip straight to the matching `Exit`.
    pub fn skip_children(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.next = frame.len();
        }
    }

    /// Skip the rest of the innermost compound so its `Exit` comes next.
    /// Outside any compound the walk ends.
    pub fn skip_to_exit(&mut self) {
        while let Some(frame) = self.stack.last_mut() {
            if let TypeDescriptor::Compound(compound) = frame.descriptor {
                frame.next = compound.members().len();
                return;
            }
            self.stack.pop();
        }
        self.started = true;
    }

    /// Only the leaf steps.
    pub fn leaves(self) -> impl Iterator<Item = Step<'a>> {
        self.filter(|step| step.visit == Visit::Leaf)
    }

    fn root_id(&self) -> usize {
        self.root as *const TypeDescriptor as usize
    }

    fn visit(
        &mut self,
        descriptor: &'a TypeDescriptor,
        offset: usize,
        nested_offset: usize,
        path: FieldPath,
        key: Vec<usize>,
        in_line: bool,
    ) -> Step<'a> {
        let depth = self.stack.len();
        let composite = matches!(
            descriptor,
            TypeDescriptor::Compound(_) | TypeDescriptor::Array(_) | TypeDescriptor::Variable(_)
        );
        if !composite {
            return Step {
                descriptor,
                visit: Visit::Leaf,
                path,
                depth,
                offset,
                nested_offset,
                in_line,
                position: Position {
                    root: self.root_id(),
                    key,
                },
            };
        }

        let mut enter_key = key.clone();
        enter_key.push(0);
        self.stack.push(Frame {
            descriptor,
            path: path.clone(),
            key,
            offset,
            nested_offset,
            in_line,
            next: 0,
        });
        Step {
            descriptor,
            visit: Visit::Enter,
            path,
            depth,
            offset,
            nested_offset,
            in_line,
            position: Position {
                root: self.root_id(),
                key: enter_key,
            },
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = Step<'a>;

    fn next(&mut self) -> Option<Step<'a>> {
        if !self.started {
            self.started = true;
            return Some(self.visit(self.root, 0, 0, FieldPath::root(), Vec::new(), true));
        }

        let frame = self.stack.last_mut()?;
        if frame.next < frame.len() {
            let index = frame.next;
            frame.next += 1;
            let (descriptor, offset, segment, in_line) = frame.child(index);
            let nested_offset = offset.saturating_sub(frame.offset);
            let mut path = frame.path.clone();
            path.push(segment);
            let mut key = frame.key.clone();
            key.push(index + 1);
            return Some(self.visit(descriptor, offset, nested_offset, path, key, in_line));
        }

        let frame = self.stack.pop()?;
        let size = frame.descriptor.byte_size();
        let mut key = frame.key;
        key.push(usize::MAX);
        Some(Step {
            descriptor: frame.descriptor,
            visit: Visit::Exit,
            path: frame.path,
            depth: self.stack.len(),
            offset: frame.offset + size,
            nested_offset: frame.nested_offset + size,
            in_line: frame.in_line,
            position: Position {
                root: self.root_id(),
                key,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CompoundBuilder;

    fn sample() -> TypeDescriptor {
        let inner = CompoundBuilder::new()
            .member("x", TypeDescriptor::from(IntegerType::I32))
            .member("y", TypeDescriptor::from(FloatType::F64))
            .build()
            .expect("inner");
        CompoundBuilder::new()
            .member("id", TypeDescriptor::from(IntegerType::U16))
            .member("points", TypeDescriptor::variable(inner.clone()))
            .member("grid", TypeDescriptor::array(TypeDescriptor::from(IntegerType::U8), &[2, 2]).expect("grid"))
            .member("origin", inner)
            .build()
            .expect("outer")
    }

    #[test]
    fn test_preorder_paths_and_visits() {
        let desc = sample();
        let steps: Vec<(String, Visit)> = Walk::new(&desc)
            .map(|s| (s.full_name(), s.visit()))
            .collect();
        let expected = vec![
            ("", Visit::Enter),
            ("id", Visit::Leaf),
            ("points", Visit::Enter),
            ("points[]", Visit::Enter),
            ("points[].x", Visit::Leaf),
            ("points[].y", Visit::Leaf),
            ("points[]", Visit::Exit),
            ("points", Visit::Exit),
            ("grid", Visit::Enter),
            ("grid[]", Visit::Leaf),
            ("grid", Visit::Exit),
            ("origin", Visit::Enter),
            ("origin.x", Visit::Leaf),
            ("origin.y", Visit::Leaf),
            ("origin", Visit::Exit),
            ("", Visit::Exit),
        ];
        let expected: Vec<(String, Visit)> = expected
            .into_iter()
            .map(|(p, v)| (p.to_string(), v))
            .collect();
        assert_eq!(steps, expected);
    }

    #[test]
    fn test_offsets() {
        let desc = sample();
        let walk: Vec<Step<'_>> = Walk::new(&desc).collect();
        let find = |name: &str| {
            walk.iter()
                .find(|s| s.full_name() == name && s.visit() != Visit::Exit)
                .expect("step")
                .clone()
        };
        assert_eq!(find("id").offset(), 0);
        assert_eq!(find("points").offset(), 2);
        // Sequence elements are out of line, offsets restart.
        assert_eq!(find("points[].y").offset(), 4);
        assert!(!find("points[].y").is_in_line());
        assert_eq!(find("grid").offset(), 18);
        assert_eq!(find("origin.y").offset(), 26);
        assert_eq!(find("origin.y").nested_offset(), 4);
        assert_eq!(find("origin").depth(), 1);
        assert_eq!(find("origin.x").depth(), 2);
    }

    #[test]
    fn test_positions_ordered_and_restartable() {
        let desc = sample();
        let first: Vec<Step<'_>> = Walk::new(&desc).collect();
        for pair in first.windows(2) {
            assert!(pair[0].position() < pair[1].position());
        }

        let mut walk = Walk::new(&desc);
        let _ = walk.by_ref().take(5).count();
        walk.restart();
        let again: Vec<Position> = walk.map(|s| s.position().clone()).collect();
        let original: Vec<Position> = first.iter().map(|s| s.position().clone()).collect();
        assert_eq!(again, original);
    }

    #[test]
    fn test_positions_across_roots_unordered() {
        let a = sample();
        let b = sample();
        let pa = Walk::new(&a).next().expect("root").position().clone();
        let pb = Walk::new(&b).next().expect("root").position().clone();
        assert_eq!(pa.partial_cmp(&pb), None);
    }

    #[test]
    fn test_accessor_kind_mismatch() {
        let desc = sample();
        let id = Walk::new(&desc).nth(1).expect("id");
        assert_eq!(id.as_integer().expect("integer"), IntegerType::U16);
        assert!(matches!(
            id.as_float(),
            Err(Error::KindMismatch {
                expected: Kind::Float,
                found: Kind::Integer
            })
        ));
    }

    #[test]
    fn test_skip_to_exit() {
        let desc = sample();
        let mut walk = Walk::new(&desc);
        let _ = walk.next(); // root enter
        let _ = walk.next(); // id
        walk.skip_to_exit();
        let exit = walk.next().expect("root exit");
        assert_eq!(exit.visit(), Visit::Exit);
        assert!(exit.path().is_root());
        assert_eq!(exit.offset(), desc.byte_size());
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_skip_children() {
        let desc = sample();
        let mut walk = Walk::new(&desc);
        let _ = walk.next();
        let _ = walk.next();
        let points = walk.next().expect("points");
        assert_eq!(points.visit(), Visit::Enter);
        walk.skip_children();
        let exit = walk.next().expect("points exit");
        assert_eq!((exit.full_name(), exit.visit()), ("points".to_string(), Visit::Exit));
    }

    #[test]
    fn test_path_parse() {
        let path: FieldPath = "points[].x".parse().expect("infallible");
        assert_eq!(path, FieldPath::root().member("points").element().member("x"));
        assert_eq!(path.to_string(), "points[].x");
        assert_eq!(path.last_member(), Some("x"));

        let root: FieldPath = "".parse().expect("infallible");
        assert_eq!(root, FieldPath::root());
        assert_eq!(root.to_string(), "");
    }
}
