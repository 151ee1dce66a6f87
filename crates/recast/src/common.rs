// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Smallest descriptor that every input converts into without loss.
//!
//! Numeric inputs combine their capacities and pick the first native
//! layout that covers the result. Compounds need identical member names
//! and are repacked left to right; enums take the union of their names,
//! renumbered from zero.

use crate::descriptor::{
    CompoundBuilder, EnumBuilder, FloatType, IntegerType, Kind, TypeDescriptor,
};
use crate::error::{Error, Result};
use crate::precision::Capacity;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Native numeric layouts in order of preference.
const NUMERIC_CANDIDATES: [TypeDescriptor; 10] = [
    TypeDescriptor::Integer(IntegerType::U8),
    TypeDescriptor::Integer(IntegerType::I8),
    TypeDescriptor::Integer(IntegerType::U16),
    TypeDescriptor::Integer(IntegerType::I16),
    TypeDescriptor::Integer(IntegerType::I32),
    TypeDescriptor::Integer(IntegerType::U32),
    TypeDescriptor::Integer(IntegerType::U64),
    TypeDescriptor::Integer(IntegerType::I64),
    TypeDescriptor::Float(FloatType::F32),
    TypeDescriptor::Float(FloatType::F64),
];

/// Bitfield widths in order of preference.
const BITFIELD_WIDTHS: [u32; 4] = [8, 16, 32, 64];

fn no_common(reason: impl Into<String>) -> Error {
    Error::NoCommonDescriptor(reason.into())
}

/// Resolve the common descriptor of `descriptors`.
pub fn common<'a, I>(descriptors: I) -> Result<TypeDescriptor>
where
    I: IntoIterator<Item = &'a TypeDescriptor>,
{
    let inputs: Vec<&TypeDescriptor> = descriptors.into_iter().collect();
    let first = *inputs.first().ok_or_else(|| no_common("no descriptors"))?;
    for d in &inputs {
        d.validate()?;
    }

    let result = match first.kind() {
        Kind::Integer | Kind::Float => common_numeric(inputs.iter().copied()),
        Kind::Bitfield => {
            let widths = inputs
                .iter()
                .map(|d| match d {
                    TypeDescriptor::Bitfield { width_bits } => Ok(*width_bits),
                    other => Err(mixed(first, other)),
                })
                .collect::<Result<Vec<u32>>>()?;
            Ok(TypeDescriptor::bitfield(common_bitfield(widths)?))
        }
        Kind::String => common_string(inputs.iter().copied()),
        Kind::Boolean => {
            same_kind(&inputs, first)?;
            Ok(TypeDescriptor::Boolean)
        }
        Kind::Opaque => {
            if inputs.iter().any(|d| *d != first) {
                return Err(no_common(format!("opaque blobs differ from {}", first)));
            }
            Ok(first.clone())
        }
        Kind::Enum => common_enum(&inputs),
        Kind::Array => common_array(&inputs),
        Kind::Variable => {
            let elements = inputs
                .iter()
                .map(|d| match d {
                    TypeDescriptor::Variable(element) => Ok(&**element),
                    other => Err(mixed(first, other)),
                })
                .collect::<Result<Vec<&TypeDescriptor>>>()?;
            Ok(TypeDescriptor::variable(common(elements)?))
        }
        Kind::Compound => common_compound(&inputs),
    }?;

    log::debug!("[common] {} inputs -> {}", inputs.len(), result);
    Ok(result)
}

fn mixed(first: &TypeDescriptor, other: &TypeDescriptor) -> Error {
    no_common(format!("{} and {} have different kinds", first, other))
}

fn same_kind(inputs: &[&TypeDescriptor], first: &TypeDescriptor) -> Result<()> {
    match inputs.iter().find(|d| d.kind() != first.kind()) {
        Some(other) => Err(mixed(first, other)),
        None => Ok(()),
    }
}

/// Smallest native number covering every integer or float input.
pub fn common_numeric<'a, I>(descriptors: I) -> Result<TypeDescriptor>
where
    I: IntoIterator<Item = &'a TypeDescriptor>,
{
    let mut needed: Option<Capacity> = None;
    for d in descriptors {
        let capacity =
            Capacity::of(d).ok_or_else(|| no_common(format!("{} is not numeric", d)))?;
        needed = Some(needed.map_or(capacity, |n| n.union(capacity)));
    }
    let needed = needed.ok_or_else(|| no_common("no descriptors"))?;

    NUMERIC_CANDIDATES
        .iter()
        .find(|candidate| Capacity::of(candidate).is_some_and(|c| c.covers(&needed)))
        .cloned()
        .ok_or_else(|| {
            no_common(format!(
                "no native number holds precision {}, exponent {}, signed {}",
                needed.precision, needed.exponent, needed.signed
            ))
        })
}

/// Smallest native bitfield width holding every input width.
pub fn common_bitfield<I>(widths: I) -> Result<u32>
where
    I: IntoIterator<Item = u32>,
{
    let widest = widths.into_iter().max().ok_or_else(|| no_common("no bitfields"))?;
    BITFIELD_WIDTHS
        .iter()
        .copied()
        .find(|w| *w >= widest)
        .ok_or_else(|| no_common(format!("bitfield of {} bits", widest)))
}

/// Variable if any input is variable, else the longest fixed length.
pub fn common_string<'a, I>(descriptors: I) -> Result<TypeDescriptor>
where
    I: IntoIterator<Item = &'a TypeDescriptor>,
{
    let mut longest: Option<usize> = None;
    for d in descriptors {
        match d {
            TypeDescriptor::VariableString => return Ok(TypeDescriptor::VariableString),
            TypeDescriptor::FixedString { byte_length } => {
                longest = Some(longest.map_or(*byte_length, |l| l.max(*byte_length)));
            }
            other => return Err(no_common(format!("{} is not a string", other))),
        }
    }
    longest
        .map(TypeDescriptor::fixed_string)
        .ok_or_else(|| no_common("no strings"))
}

fn common_enum(inputs: &[&TypeDescriptor]) -> Result<TypeDescriptor> {
    let mut names: Vec<&str> = Vec::new();
    let mut seen = BTreeSet::new();
    let mut underlying = Vec::new();
    for d in inputs {
        let TypeDescriptor::Enum(e) = d else {
            return Err(mixed(inputs[0], d));
        };
        underlying.push(TypeDescriptor::Integer(e.underlying()));
        for v in e.variants() {
            if seen.insert(v.name.as_str()) {
                names.push(v.name.as_str());
            }
        }
    }

    // The renumbered ordinals 0..n must fit as well.
    let highest = names.len().saturating_sub(1) as u64;
    let ordinal_bits = (u64::BITS - highest.leading_zeros()).max(1);
    underlying.push(TypeDescriptor::integer(ordinal_bits, false));

    let TypeDescriptor::Integer(storage) = common_numeric(&underlying)? else {
        return Err(no_common("enum storage resolved to a float"));
    };
    names
        .into_iter()
        .fold(EnumBuilder::new(storage), |builder, name| builder.variant(name))
        .build()
}

fn common_array(inputs: &[&TypeDescriptor]) -> Result<TypeDescriptor> {
    let first = inputs[0];
    let mut elements = Vec::with_capacity(inputs.len());
    let mut dims: Option<&[usize]> = None;
    for d in inputs {
        let TypeDescriptor::Array(array) = d else {
            return Err(mixed(first, d));
        };
        match dims {
            Some(expected) if expected != array.dims() => {
                return Err(no_common(format!(
                    "array shapes {:?} and {:?} differ",
                    expected,
                    array.dims()
                )));
            }
            _ => dims = Some(array.dims()),
        }
        elements.push(array.element());
    }
    let element = common(elements)?;
    TypeDescriptor::array(element, dims.unwrap_or(&[]))
}

fn common_compound(inputs: &[&TypeDescriptor]) -> Result<TypeDescriptor> {
    let first = inputs[0];
    let TypeDescriptor::Compound(reference) = first else {
        return Err(mixed(first, first));
    };
    let expected: BTreeSet<&str> = reference.members().iter().map(|m| m.name.as_str()).collect();

    let mut compounds = Vec::with_capacity(inputs.len());
    for d in inputs {
        let TypeDescriptor::Compound(compound) = d else {
            return Err(mixed(first, d));
        };
        let names: BTreeSet<&str> = compound.members().iter().map(|m| m.name.as_str()).collect();
        if names != expected {
            return Err(no_common(format!(
                "member names {:?} and {:?} differ",
                expected, names
            )));
        }
        compounds.push(compound);
    }

    let mut builder = CompoundBuilder::new();
    for member in reference.members() {
        let mut parts = Vec::with_capacity(compounds.len());
        for compound in &compounds {
            if let Some(m) = compound.member(&member.name) {
                parts.push(&*m.descriptor);
            }
        }
        let resolved = common(parts)?;
        builder = builder.member(member.name.clone(), Arc::new(resolved));
    }
    builder.build()
}
