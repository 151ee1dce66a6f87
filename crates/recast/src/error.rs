// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.

use crate::compat::CompatibilityReport;
use crate::descriptor::Kind;
use thiserror::Error;

#[cfg(feature = "config")]
use crate::config::ConfigError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by descriptor handling, conversion and the registries.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Programmer errors
    // ========================================================================
    /// A kind-specific accessor was used on a traversal step of another kind.
    #[error("Kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        /// Kind the accessor requires.
        expected: Kind,
        /// Kind of the current step.
        found: Kind,
    },

    /// A descriptor violates a structural invariant.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Flat bytes do not match the descriptor's byte size.
    #[error("Size mismatch: descriptor needs {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A member path did not resolve against the descriptor.
    #[error("No such member: {0}")]
    UnknownMember(String),

    /// Array or sequence index past the end.
    #[error("Index out of bounds: {index} >= {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// An in-line reference does not resolve in the owning payload arena.
    #[error("Dangling out-of-line handle {handle}")]
    DanglingHandle { handle: u64 },

    // ========================================================================
    // Conversion errors
    // ========================================================================
    /// The compatibility report was rejected by the conversion criteria.
    #[error("Incompatible schema:\n{}", .report.render())]
    IncompatibleSchema { report: Box<CompatibilityReport> },

    /// The scalar converter failed on a leaf.
    #[error("Scalar conversion failed at '{path}': {reason}")]
    Scalar { path: String, reason: String },

    /// A source enum ordinal has no name in the source enum.
    #[error("Unknown enum value {value} at '{path}'")]
    UnknownEnumValue { path: String, value: i64 },

    /// No lossless common representation exists.
    #[error("No common descriptor: {0}")]
    NoCommonDescriptor(String),

    // ========================================================================
    // Registry errors
    // ========================================================================
    /// The registry no longer accepts new names.
    #[error("Registry is sealed")]
    RegistrySealed,

    /// All identifiers are in use.
    #[error("Registry is full")]
    RegistryFull,

    /// The name is already registered.
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// The name (or id) is not registered.
    #[error("Unknown name: {0}")]
    UnknownName(String),

    // ========================================================================
    // Configuration
    // ========================================================================
    /// Loading or validating a configuration failed.
    #[cfg(feature = "config")]
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    /// Whether the caller can recover by choosing another policy or target.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::IncompatibleSchema { .. })
    }
}
