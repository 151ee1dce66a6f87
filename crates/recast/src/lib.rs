// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Recast: schema-driven conversion of binary records
//!
//! A record is a flat byte buffer laid out according to a
//! [`TypeDescriptor`], plus out-of-line payloads for variable-length
//! strings and sequences. Recast compares two descriptors, reports every
//! difference, and converts records from one layout to the other when
//! the caller's [`ConversionCriteria`] accept those differences.
//!
//! # Features
//!
//! - **Descriptors**: integers and floats of arbitrary width, bitfields,
//!   booleans, fixed and variable strings, opaque blobs, enums, arrays,
//!   variable sequences and compounds
//! - **Compatibility reports**: impossible, narrowing, reordered,
//!   discarded and unknown field paths
//! - **Conversion**: members matched by name, enums by name, arrays by
//!   position, payloads deep-copied into the result
//! - **Common descriptors**: the narrowest layout every input widens into
//! - **Registries**: dense type ids frozen into an enum descriptor
//!
//! # Quick Start
//!
//! ```
//! use recast::{Buffer, CompoundBuilder, ConversionCriteria, Native};
//!
//! # fn main() -> recast::Result<()> {
//! let v1 = CompoundBuilder::new()
//!     .member("id", u8::descriptor())
//!     .member("speed", f32::descriptor())
//!     .build()?;
//! let v2 = CompoundBuilder::new()
//!     .member("speed", f64::descriptor())
//!     .member("id", u32::descriptor())
//!     .build()?;
//!
//! let mut record = Buffer::zeroed(v1)?;
//! record.set("id", 7u8)?;
//! record.set("speed", 1.5f32)?;
//!
//! let upgraded = record.convert_to(v2, &ConversionCriteria::strict())?;
//! assert_eq!(upgraded.get::<u32>("id")?, 7);
//! assert_eq!(upgraded.get::<f64>("speed")?, 1.5);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File
//!
//! With the `config` feature (on by default), named policies can be
//! loaded from TOML:
//!
//! ```toml
//! [criteria]
//! allow_narrowing = false
//!
//! [policies.lenient]
//! allow_discarding = true
//! allow_unknown = true
//! ```

pub mod buffer;
pub mod common;
pub mod compat;
#[cfg(feature = "config")]
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod heap;
pub mod native;
pub mod precision;
pub mod registry;
pub mod scalar;
pub mod walk;


pub use buffer::{Buffer, BufferView, FlatBytes, Reclaim, SequenceView};
pub use common::{common, common_bitfield, common_numeric, common_string};
pub use compat::{accept, check, CompatibilityReport, ConversionCriteria, TypePair};
#[cfg(feature = "config")]
pub use config::{ConfigError, EngineConfig};
pub use convert::{convert, convert_with, Converter};
pub use descriptor::{
    ArrayType, CompoundBuilder, CompoundType, EnumBuilder, EnumType, EnumVariant, FloatType,
    IntegerType, Kind, Member, TypeDescriptor,
};
pub use error::{Error, Result};
pub use heap::AllocStats;
pub use native::{descriptor_of, Native};
pub use registry::{DescriptorTable, TypeId, TypeIdRegistry, NULL_ID};
pub use scalar::{NativeConverter, ScalarConverter, ScalarError};
pub use walk::{FieldPath, Position, Segment, Step, Visit, Walk};
