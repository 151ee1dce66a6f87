// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conversion policy configuration.
//!
//! Policies can be built in code or loaded from TOML:
//!
//! ```toml
//! [criteria]
//! allow_narrowing = false
//!
//! [policies.lenient]
//! allow_discarding = true
//! allow_unknown = true
//! ```

use crate::compat::ConversionCriteria;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Name under which the `[criteria]` table is also reachable.
pub const DEFAULT_POLICY: &str = "default";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration: a default policy plus named policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Criteria used when no policy is named.
    #[serde(default)]
    pub criteria: ConversionCriteria,

    /// Named policies selectable by callers.
    #[serde(default)]
    pub policies: BTreeMap<String, ConversionCriteria>,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("[config] loading {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Add or replace a named policy.
    pub fn with_policy(mut self, name: impl Into<String>, criteria: ConversionCriteria) -> Self {
        self.policies.insert(name.into(), criteria);
        self
    }

    /// Criteria configured under `name`, if any.
    ///
    /// `"default"` resolves to `[criteria]` unless a policy of that name
    /// exists (validation guarantees both agree).
    pub fn policy(&self, name: &str) -> Option<ConversionCriteria> {
        match self.policies.get(name) {
            Some(criteria) => Some(*criteria),
            None if name == DEFAULT_POLICY => Some(self.criteria),
            None => None,
        }
    }

    /// Criteria for `name`, falling back to the built-in `strict` and
    /// `permissive` policies and finally to `[criteria]`.
    pub fn criteria_or_default(&self, name: &str) -> ConversionCriteria {
        if let Some(criteria) = self.policy(name) {
            return criteria;
        }
        match name {
            "strict" => ConversionCriteria::strict(),
            "permissive" => ConversionCriteria::permissive(),
            _ => {
                log::debug!("[config] unknown policy '{}', using default criteria", name);
                self.criteria
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, criteria) in &self.policies {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("Policy with empty name".into()));
            }
            if name == DEFAULT_POLICY && *criteria != self.criteria {
                return Err(ConfigError::Invalid(format!(
                    "Policy '{}' disagrees with [criteria]",
                    DEFAULT_POLICY
                )));
            }
        }
        Ok(())
    }
}
