//! Error types returned by the allocator and its configuration loader.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Recoverable failures reported by [`Allocator`](crate::Allocator) operations.
///
/// A failed operation leaves the arena and every outstanding handle exactly
/// as they were before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
  /// No free region is large enough for the request.
  #[error("out of memory: requested {requested} bytes, largest free region is {largest_free} bytes")]
  OutOfMemory {
    /// Number of bytes requested.
    requested: usize,
    /// Size of the largest free region at the time of the request.
    largest_free: usize,
  },

  /// The handle's region is already free.
  #[error("invalid free: region at offset {offset} is already free")]
  InvalidFree {
    /// Offset of the region the handle resolves to.
    offset: usize,
  },

  /// The handle's region is free, so it has no bytes to view or resize.
  #[error("region at offset {offset} is not allocated")]
  NotAllocated {
    /// Offset of the region the handle resolves to.
    offset: usize,
  },

  /// The handle's descriptor was discarded by compaction.
  #[error("stale handle: its descriptor no longer exists")]
  StaleHandle,

  /// Regions always hold at least one byte.
  #[error("zero-sized regions are not supported")]
  ZeroSize,
}

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// A broken structural invariant found by [`Allocator::validate`](crate::Allocator::validate).
///
/// These never occur while the allocator is driven only through its own
/// operations; seeing one means the allocator itself is wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
  /// A descriptor does not start where the previous one ended.
  #[error("coverage broken: expected a block at offset {expected}, found one at {found}")]
  Coverage {
    /// Offset where the next descriptor should start.
    expected: usize,
    /// Offset where it actually starts.
    found: usize,
  },

  /// The descriptors do not reach the end of the arena.
  #[error("coverage broken: blocks end at {end}, arena holds {capacity} bytes")]
  Truncated {
    /// End offset of the last descriptor.
    end: usize,
    /// Arena size.
    capacity: usize,
  },

  /// Two neighboring descriptors are both free.
  #[error("adjacent free blocks at offset {offset}")]
  AdjacentFree {
    /// Offset of the second free descriptor.
    offset: usize,
  },

  /// A descriptor covers no bytes.
  #[error("empty block at offset {offset}")]
  EmptyBlock {
    /// Offset of the empty descriptor.
    offset: usize,
  },

  /// A descriptor's `prev` link does not point back at its predecessor.
  #[error("broken back-link at offset {offset}")]
  BrokenLink {
    /// Offset of the descriptor with the wrong link.
    offset: usize,
  },

  /// The list never terminates.
  #[error("block list contains a cycle")]
  Cycle,
}

/// Failures while loading an [`AllocatorConfig`](crate::AllocatorConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
  /// The configuration file could not be read.
  #[error("failed to read config {}: {source}", .path.display())]
  Io {
    /// Path that was read.
    path: PathBuf,
    /// Underlying I/O error.
    #[source]
    source: io::Error,
  },

  /// The configuration is not valid TOML for this schema.
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),

  /// The configuration parsed but holds unusable values.
  #[error("invalid configuration: {0}")]
  Invalid(String),
}
