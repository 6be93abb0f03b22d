//! Allocator configuration, loadable from TOML.
//!
//! ```toml
//! arena_size = 65536
//! validate = true
//! defrag_on_oom = false
//! ```

use std::{fs, path::Path};

use serde::Deserialize;

use crate::error::ConfigError;

/// Arena size used by [`AllocatorConfig::default`].
pub const DEFAULT_ARENA_SIZE: usize = 64 * 1024;

/// Settings for an [`Allocator`](crate::Allocator).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocatorConfig {
  /// Arena size in bytes. Fixed for the allocator's lifetime.
  pub arena_size: usize,
  /// Check every structural invariant after each mutating operation and
  /// panic on the first violation.
  pub validate: bool,
  /// When `allocate` finds no fitting region but the free bytes add up to
  /// enough, compact the arena and try once more.
  pub defrag_on_oom: bool,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      arena_size: DEFAULT_ARENA_SIZE,
      validate: cfg!(debug_assertions),
      defrag_on_oom: false,
    }
  }
}

impl AllocatorConfig {
  /// Default settings for an arena of `arena_size` bytes.
  #[must_use]
  pub fn with_arena_size(arena_size: usize) -> Self {
    Self {
      arena_size,
      ..Self::default()
    }
  }

  /// Parses and validates a TOML document.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
  /// [`ConfigError::Invalid`] for unusable values.
  pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  /// Reads, parses and validates a TOML file.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
  /// errors of [`AllocatorConfig::from_toml_str`].
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml_str(&source)
  }

  /// Rejects settings no allocator can run with.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::Invalid`] when `arena_size` is zero.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.arena_size == 0 {
      return Err(ConfigError::Invalid("arena_size must be greater than zero".into()));
    }
    Ok(())
  }
}
