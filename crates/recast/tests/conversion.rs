// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability over pedantic
#![allow(clippy::float_cmp)] // Test assertions with exact constants
#![allow(clippy::cast_possible_truncation)] // Test data generation
#![allow(clippy::too_many_lines)] // Scenario tests

//! End-to-end conversion tests
//!
//! Builds records for two schema versions, converts between them and
//! checks values, reports and payload ownership.

use recast::walk::FieldPath;
use recast::{
    check, common, convert, AllocStats, Buffer, CompoundBuilder, ConversionCriteria, EnumBuilder,
    Error, IntegerType, Native, TypeDescriptor,
};

fn gear() -> TypeDescriptor {
    EnumBuilder::new(IntegerType::U8)
        .variant("Park")
        .variant("Drive")
        .variant("Reverse")
        .build()
        .unwrap()
}

/// Same names, other ordinals and storage.
fn wide_gear() -> TypeDescriptor {
    EnumBuilder::new(IntegerType::I32)
        .variant_value("Reverse", -1)
        .variant("Park")
        .variant("Drive")
        .build()
        .unwrap()
}

/// Compact layout.
fn sample_v1() -> TypeDescriptor {
    let wheel = CompoundBuilder::new()
        .member("label", TypeDescriptor::VariableString)
        .member("rpm", i16::descriptor())
        .build()
        .unwrap();
    CompoundBuilder::new()
        .member("id", u8::descriptor())
        .member("temp", f32::descriptor())
        .member("gear", gear())
        .member("code", TypeDescriptor::fixed_string(8))
        .member("history", TypeDescriptor::variable(u8::descriptor()))
        .member("wheels", TypeDescriptor::variable(wheel))
        .member(
            "grid",
            TypeDescriptor::array(i8::descriptor(), &[2, 3]).unwrap(),
        )
        .build()
        .unwrap()
}

/// Same members, every one widened, declared in another order.
fn sample_v2() -> TypeDescriptor {
    let wheel = CompoundBuilder::new()
        .member("rpm", i32::descriptor())
        .member("label", TypeDescriptor::VariableString)
        .build()
        .unwrap();
    CompoundBuilder::new()
        .member(
            "grid",
            TypeDescriptor::array(i16::descriptor(), &[2, 3]).unwrap(),
        )
        .member("wheels", TypeDescriptor::variable(wheel))
        .member("code", TypeDescriptor::VariableString)
        .member("history", TypeDescriptor::variable(u16::descriptor()))
        .member("gear", wide_gear())
        .member("temp", f64::descriptor())
        .member("id", u32::descriptor())
        .build()
        .unwrap()
}

fn random_text(rng: &mut fastrand::Rng, max: usize) -> String {
    let len = rng.usize(0..=max);
    (0..len).map(|_| rng.alphanumeric()).collect()
}

fn random_sample(rng: &mut fastrand::Rng, stats: &AllocStats) -> Buffer {
    let desc = sample_v1();
    let wheel = match &desc {
        TypeDescriptor::Compound(c) => match &*c.member("wheels").unwrap().descriptor {
            TypeDescriptor::Variable(element) => element.clone(),
            other => panic!("unexpected {}", other),
        },
        other => panic!("unexpected {}", other),
    };

    let mut record = Buffer::zeroed_with_stats(desc, stats.clone()).unwrap();
    record.set("id", rng.u8(..)).unwrap();
    record.set("temp", rng.i16(..) as f32 / 4.0).unwrap();
    record
        .set_enum("gear", ["Park", "Drive", "Reverse"][rng.usize(0..3)])
        .unwrap();
    record.set_string("code", &random_text(rng, 8)).unwrap();

    let history: Vec<u8> = (0..rng.usize(0..6)).map(|_| rng.u8(..)).collect();
    record.set_native_sequence("history", &history).unwrap();

    let mut wheels = Vec::new();
    for _ in 0..rng.usize(0..4) {
        let mut w = Buffer::zeroed_with_stats(wheel.clone(), stats.clone()).unwrap();
        w.set_string("label", &random_text(rng, 12)).unwrap();
        w.set("rpm", rng.i16(..)).unwrap();
        wheels.push(w);
    }
    record.set_sequence("wheels", &wheels).unwrap();

    for i in 0..6 {
        record.set(&format!("grid[{}]", i), rng.i8(..)).unwrap();
    }
    record
}

fn path(s: &str) -> FieldPath {
    s.parse().unwrap()
}

// ============================================================
// Identity and round trips
// ============================================================

#[test]
fn test_same_descriptor_is_identity() {
    let mut rng = fastrand::Rng::with_seed(7);
    let stats = AllocStats::new();
    for _ in 0..32 {
        let record = random_sample(&mut rng, &stats);
        assert!(check(record.descriptor(), record.descriptor()).is_empty());
        let copy = convert(&record, sample_v1(), &ConversionCriteria::strict()).unwrap();
        assert!(copy.value_eq(&record));
        assert_eq!(copy.live_payloads(), record.live_payloads());
    }
    assert_eq!(stats.live(), 0);
}

#[test]
fn test_widen_then_narrow_restores_values() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    let stats = AllocStats::new();
    let widening = check(&sample_v1(), &sample_v2());
    assert!(widening.is_empty(), "{}", widening.render());

    let narrowing = check(&sample_v2(), &sample_v1());
    assert!(narrowing.impossible().is_empty());
    // Variable code back into a fixed slot, plus every numeric member.
    assert!(narrowing.narrowing().contains_key(&path("code")));
    assert!(narrowing.narrowing().contains_key(&path("wheels[].rpm")));

    for _ in 0..32 {
        let original = random_sample(&mut rng, &stats);
        let wide = original
            .convert_to(sample_v2(), &ConversionCriteria::strict())
            .unwrap();
        assert_eq!(
            wide.get::<u32>("id").unwrap(),
            u32::from(original.get::<u8>("id").unwrap())
        );
        assert_eq!(
            wide.get_string("code").unwrap(),
            original.get_string("code").unwrap()
        );
        assert_eq!(
            wide.view().at("gear").unwrap().enum_name().unwrap(),
            original.view().at("gear").unwrap().enum_name().unwrap()
        );

        let back = wide
            .convert_to(sample_v1(), &ConversionCriteria::default())
            .unwrap();
        assert!(back.value_eq(&original));
    }
    assert_eq!(stats.live(), 0);
    assert_eq!(stats.allocations(), stats.releases());
}

#[test]
fn test_widening_into_common_is_never_narrowing() {
    let numerics = [
        u8::descriptor(),
        i8::descriptor(),
        u16::descriptor(),
        i16::descriptor(),
        u32::descriptor(),
        i32::descriptor(),
        u64::descriptor(),
        f32::descriptor(),
        f64::descriptor(),
        TypeDescriptor::integer(12, true),
    ];
    let strict = ConversionCriteria::strict();
    for a in &numerics {
        for b in &numerics {
            let Ok(shared) = common([a, b]) else {
                continue;
            };
            assert!(check(a, &shared).accept(&strict), "{} into {}", a, shared);
            assert!(check(b, &shared).accept(&strict), "{} into {}", b, shared);
            assert_eq!(common([b, a]).unwrap(), shared);
        }
    }
}

// ============================================================
// Structural differences
// ============================================================

#[test]
fn test_renamed_member_is_discard_plus_unknown() {
    let source = CompoundBuilder::new()
        .member("x", f32::descriptor())
        .member("y", f32::descriptor())
        .build()
        .unwrap();
    let target = CompoundBuilder::new()
        .member("x", f32::descriptor())
        .member("z", f32::descriptor())
        .build()
        .unwrap();

    let report = check(&source, &target);
    assert!(report.impossible().is_empty());
    assert!(report.narrowing().is_empty());
    assert_eq!(report.discarded().iter().collect::<Vec<_>>(), [&path("y")]);
    assert_eq!(report.unknown().iter().collect::<Vec<_>>(), [&path("z")]);

    let mut record = Buffer::zeroed(source).unwrap();
    record.set("x", 1.5f32).unwrap();
    record.set("y", 2.5f32).unwrap();
    assert!(record
        .convert_to(target.clone(), &ConversionCriteria::default())
        .is_err());

    let out = record
        .convert_to(target, &ConversionCriteria::permissive())
        .unwrap();
    assert_eq!(out.get::<f32>("x").unwrap(), 1.5);
    assert_eq!(out.get::<f32>("z").unwrap(), 0.0);
}

#[test]
fn test_dropped_member_without_narrowing() {
    let source = CompoundBuilder::new()
        .member("a", u8::descriptor())
        .member("b", u8::descriptor())
        .build()
        .unwrap();
    let target = CompoundBuilder::new()
        .member("a", i16::descriptor())
        .build()
        .unwrap();

    let report = check(&source, &target);
    assert!(report.narrowing().is_empty());
    assert_eq!(report.discarded().len(), 1);
    assert!(report.discarded().contains(&path("b")));

    let mut record = Buffer::zeroed(source).unwrap();
    record.set("a", 255u8).unwrap();

    let err = record
        .convert_to(target.clone(), &ConversionCriteria::default())
        .unwrap_err();
    assert!(matches!(err, Error::IncompatibleSchema { .. }));
    assert!(err.to_string().contains("Discarded compound members:"));

    let criteria = ConversionCriteria {
        allow_discarding: true,
        ..ConversionCriteria::strict()
    };
    let out = record.convert_to(target, &criteria).unwrap();
    assert_eq!(out.get::<i16>("a").unwrap(), 255);
}

#[test]
fn test_reshaped_array_keeps_element_order() {
    let source = TypeDescriptor::array(u16::descriptor(), &[2, 3]).unwrap();
    let target = TypeDescriptor::array(u32::descriptor(), &[3, 2]).unwrap();

    let report = check(&source, &target);
    assert_eq!(report.reordered().len(), 1);
    assert!(report.reordered().contains_key(&FieldPath::root()));

    let mut record = Buffer::zeroed(source).unwrap();
    for i in 0..6 {
        record.set(&format!("[{}]", i), (i as u16 + 1) * 10).unwrap();
    }

    assert!(record
        .convert_to(target.clone(), &ConversionCriteria::default())
        .is_err());
    let criteria = ConversionCriteria {
        allow_reordering: true,
        ..ConversionCriteria::default()
    };
    let out = record.convert_to(target, &criteria).unwrap();
    let values: Vec<u32> = (0..6)
        .map(|i| out.get::<u32>(&format!("[{}]", i)).unwrap())
        .collect();
    assert_eq!(values, [10, 20, 30, 40, 50, 60]);
}

#[test]
fn test_different_element_count_is_impossible() {
    let source = TypeDescriptor::array(u8::descriptor(), &[4]).unwrap();
    let target = TypeDescriptor::array(u8::descriptor(), &[5]).unwrap();
    let report = check(&source, &target);
    assert_eq!(report.impossible().len(), 1);

    let record = Buffer::zeroed(source).unwrap();
    assert!(record
        .convert_to(target, &ConversionCriteria::permissive())
        .unwrap_err()
        .is_policy_rejection());
}

// ============================================================
// Ownership
// ============================================================

#[test]
fn test_allocation_accounting_balances() {
    let mut rng = fastrand::Rng::with_seed(1234);
    let stats = AllocStats::new();
    let mut expected_live = 0u64;
    let mut kept = Vec::new();

    for _ in 0..16 {
        let record = random_sample(&mut rng, &stats);
        let wide = record
            .convert_to(sample_v2(), &ConversionCriteria::strict())
            .unwrap();
        // Every source payload has exactly one converted counterpart, except
        // an empty fixed code which becomes an empty variable payload.
        assert!(wide.live_payloads() >= record.live_payloads());
        expected_live += (record.live_payloads() + wide.live_payloads()) as u64;
        kept.push(record);
        kept.push(wide);
        assert_eq!(stats.live(), expected_live);
    }

    let clones: Vec<Buffer> = kept.iter().map(|b| b.try_clone().unwrap()).collect();
    assert_eq!(stats.live(), expected_live * 2);
    drop(kept);
    assert_eq!(stats.live(), expected_live);
    drop(clones);
    assert_eq!(stats.live(), 0);
    assert_eq!(stats.allocations(), stats.releases());
}

#[test]
fn test_rejected_conversion_allocates_nothing() {
    let mut rng = fastrand::Rng::with_seed(99);
    let stats = AllocStats::new();
    let record = random_sample(&mut rng, &stats);
    let before = stats.allocations();

    let err = convert(
        &record,
        TypeDescriptor::variable(u8::descriptor()),
        &ConversionCriteria::permissive(),
    )
    .unwrap_err();
    assert!(err.is_policy_rejection());
    assert_eq!(stats.allocations(), before);
}

#[test]
fn test_failure_mid_conversion_frees_partial_result() {
    let mut rng = fastrand::Rng::with_seed(3);
    let stats = AllocStats::new();
    let mut record = random_sample(&mut rng, &stats);
    record.set_string("code", "abc").unwrap();
    // Raw ordinal with no name.
    record.set("gear", 9u8).unwrap();
    let live = stats.live();
    let before = stats.allocations();

    let err = record
        .convert_to(sample_v2(), &ConversionCriteria::strict())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEnumValue { value: 9, .. }));
    // Members ahead of the enum were converted, then dropped with the result.
    assert!(stats.allocations() > before);
    assert_eq!(stats.live(), live);
}
