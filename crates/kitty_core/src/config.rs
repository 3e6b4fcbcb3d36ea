//! # Arena Configuration
//!
//! Arena sizes are chosen once at startup, either from the defaults below or
//! from a TOML file:
//!
//! ```toml
//! [nodes]
//! max_len = 64      # values across all deques
//! max_deques = 4    # one dummy head each
//! item_size = 24    # optional, bytes per node block
//!
//! [strings]
//! slots = 32
//! max_str_len = 20
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Sizing of the shared deque node allocator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeSizing {
    /// Values that may be stored across all deques at once.
    pub max_len: usize,
    /// Deques that may exist at once.
    pub max_deques: usize,
    /// Bytes per node block. Defaults to the largest supported node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_size: Option<usize>,
}

impl Default for NodeSizing {
    fn default() -> Self {
        Self {
            max_len: 32,
            max_deques: 2,
            item_size: None,
        }
    }
}

/// Sizing of the string pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StringSizing {
    /// Number of string slots.
    pub slots: usize,
    /// Usable bytes per slot.
    pub max_str_len: usize,
}

impl Default for StringSizing {
    fn default() -> Self {
        Self {
            slots: 16,
            max_str_len: 20,
        }
    }
}

/// All arena sizes of the runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Deque node allocator.
    pub nodes: NodeSizing,
    /// String pool.
    pub strings: StringSizing,
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`CoreError::ConfigParse`] for malformed TOML or unknown keys,
    /// [`CoreError::InvalidConfig`] for out-of-range sizes.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| CoreError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`CoreError::ConfigIo`] if the file cannot be read, otherwise as
    /// [`CoreConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ConfigIo(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "arena configuration loaded");
        Ok(config)
    }

    /// Checks that every arena can be constructed.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> CoreResult<()> {
        if self.nodes.max_len == 0 {
            return Err(CoreError::InvalidConfig("nodes.max_len must be at least 1".into()));
        }
        if self.nodes.max_deques == 0 {
            return Err(CoreError::InvalidConfig("nodes.max_deques must be at least 1".into()));
        }
        if self.nodes.max_len.checked_add(self.nodes.max_deques).is_none() {
            return Err(CoreError::InvalidConfig("nodes.max_len + nodes.max_deques overflows".into()));
        }
        if self.nodes.item_size == Some(0) {
            return Err(CoreError::InvalidConfig("nodes.item_size must be at least 1".into()));
        }
        if self.strings.slots == 0 || self.strings.slots >= usize::from(u16::MAX) {
            return Err(CoreError::InvalidConfig(format!(
                "strings.slots must be in 1..{}",
                u16::MAX
            )));
        }
        if self.strings.max_str_len == 0 {
            return Err(CoreError::InvalidConfig("strings.max_str_len must be at least 1".into()));
        }
        Ok(())
    }
}
