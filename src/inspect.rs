//! Read-only snapshots of allocator state.

use std::fmt;

use crate::block::Block;

/// Snapshot of one block descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// First byte of the region.
  pub offset: usize,
  /// Length of the region in bytes.
  pub size: usize,
  /// Whether the region is available for allocation.
  pub is_free: bool,
}

impl BlockInfo {
  /// One past the last byte of the region.
  #[inline]
  #[must_use]
  pub const fn end(&self) -> usize {
    self.offset + self.size
  }
}

impl From<&Block> for BlockInfo {
  fn from(block: &Block) -> Self {
    Self {
      offset: block.offset,
      size: block.size,
      is_free: block.is_free,
    }
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let state = if self.is_free { "FREE" } else { "USED" };
    write!(f, "{state} {} {} {}", self.offset, self.size, self.end())
  }
}

/// Occupancy summary of the arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
  /// Arena size in bytes.
  pub capacity: usize,
  /// Bytes held by used regions.
  pub used: usize,
  /// Bytes held by free regions.
  pub free: usize,
  /// Size of the largest free region.
  pub largest_free: usize,
  /// Number of descriptors in the list.
  pub blocks: usize,
  /// Number of free descriptors in the list.
  pub free_blocks: usize,
  /// Slots in the descriptor table, counting ones that still forward
  /// merged handles.
  pub slots: usize,
}

impl ArenaStats {
  /// Share of free bytes that sit outside the largest free region.
  ///
  /// `0.0` means all free space is one region (or nothing is free); values
  /// approaching `1.0` mean the free space is scattered in small pieces.
  #[must_use]
  pub fn fragmentation_ratio(&self) -> f64 {
    if self.free == 0 {
      return 0.0;
    }
    1.0 - self.largest_free as f64 / self.free as f64
  }
}

/// Outcome of a [`defrag`](crate::Allocator::defrag) pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefragReport {
  /// Used regions whose bytes moved.
  pub blocks_moved: usize,
  /// Total bytes copied.
  pub bytes_moved: usize,
  /// Free descriptors dropped from the list.
  pub free_blocks_discarded: usize,
  /// Size of the trailing free region, zero when the arena is full.
  pub free_tail: usize,
}
