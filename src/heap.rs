use std::{cmp::Ordering, fmt};

use tracing::{debug, error, warn};

use crate::{
  block::{Block, BlockTable},
  config::AllocatorConfig,
  error::{AllocError, AllocResult, ConfigError, InvariantViolation},
  handle::Handle,
  inspect::{ArenaStats, BlockInfo, DefragReport},
};

/// First-fit allocator over one fixed byte arena.
///
/// Every byte of the arena belongs to exactly one block descriptor; the
/// descriptors form an offset-ordered list with no two free neighbors.
pub struct Allocator {
  arena: Box<[u8]>,
  blocks: BlockTable,
  config: AllocatorConfig,
}

impl Allocator {
  /// Creates an allocator over a zeroed arena of `arena_size` bytes.
  ///
  /// # Panics
  ///
  /// Panics if `arena_size` is zero.
  #[must_use]
  pub fn new(arena_size: usize) -> Self {
    assert!(arena_size > 0, "arena size must be greater than zero");
    Self::build(
      vec![0u8; arena_size].into_boxed_slice(),
      AllocatorConfig::with_arena_size(arena_size),
    )
  }

  /// Creates an allocator from validated settings.
  ///
  /// # Errors
  ///
  /// Returns [`ConfigError::Invalid`] if the configuration is unusable.
  pub fn with_config(config: AllocatorConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self::build(vec![0u8; config.arena_size].into_boxed_slice(), config))
  }

  /// Takes over an existing buffer as the arena. Its current contents become
  /// the (unspecified) contents of the single free region.
  ///
  /// # Panics
  ///
  /// Panics if `arena` is empty.
  #[must_use]
  pub fn from_arena(arena: Box<[u8]>) -> Self {
    assert!(!arena.is_empty(), "arena size must be greater than zero");
    let config = AllocatorConfig::with_arena_size(arena.len());
    Self::build(arena, config)
  }

  fn build(
    arena: Box<[u8]>,
    config: AllocatorConfig,
  ) -> Self {
    debug!(arena_size = arena.len(), "arena installed");
    Self {
      blocks: BlockTable::new(arena.len()),
      arena,
      config,
    }
  }

  /// Gives the arena buffer back, dropping all metadata.
  #[must_use]
  pub fn into_arena(self) -> Box<[u8]> {
    self.arena
  }

  /// Arena size in bytes.
  #[inline]
  #[must_use]
  pub fn capacity(&self) -> usize {
    self.arena.len()
  }

  #[inline]
  #[must_use]
  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  fn find_free_block(
    &self,
    size: usize,
  ) -> Option<usize> {
    self
      .blocks
      .iter()
      .find(|(_, block)| block.is_free && block.size >= size)
      .map(|(index, _)| index)
  }

  fn resolve(
    &self,
    handle: Handle,
  ) -> AllocResult<usize> {
    self.blocks.resolve(handle).ok_or(AllocError::StaleHandle)
  }

  fn used_block(
    &self,
    handle: Handle,
  ) -> AllocResult<Block> {
    let block = *self.blocks.get(self.resolve(handle)?);
    if block.is_free {
      return Err(AllocError::NotAllocated { offset: block.offset });
    }
    Ok(block)
  }

  fn out_of_memory(
    &self,
    requested: usize,
  ) -> AllocError {
    let largest_free = self.stats().largest_free;
    warn!(requested, largest_free, "out of memory");
    AllocError::OutOfMemory {
      requested,
      largest_free,
    }
  }

  /// Carves `size` bytes out of the first free block that holds them.
  fn allocate_block(
    &mut self,
    size: usize,
  ) -> AllocResult<usize> {
    let index = match self.find_free_block(size) {
      Some(index) => index,
      None if self.config.defrag_on_oom && self.stats().free >= size => {
        debug!(requested = size, "no fitting block, compacting before retry");
        self.defrag();
        self.find_free_block(size).ok_or_else(|| self.out_of_memory(size))?
      }
      None => return Err(self.out_of_memory(size)),
    };

    self.blocks.split(index, size);
    self.blocks.get_mut(index).is_free = false;
    Ok(index)
  }

  /// Allocates a region of exactly `size` bytes from the first free block
  /// large enough to hold it.
  ///
  /// # Errors
  ///
  /// [`AllocError::ZeroSize`] for `size == 0`, [`AllocError::OutOfMemory`] if
  /// no free block fits. Nothing changes on failure.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> AllocResult<Handle> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let index = self.allocate_block(size)?;
    debug!(offset = self.blocks.get(index).offset, size, "allocated");
    self.check();
    Ok(self.blocks.handle(index))
  }

  fn absorb_free_next(
    &mut self,
    index: usize,
  ) {
    if self.blocks.get(index).next.is_some_and(|next| self.blocks.get(next).is_free) {
      self.blocks.merge_with_next(index);
    }
  }

  /// Merges a free block with its free neighbors.
  fn coalesce(
    &mut self,
    index: usize,
  ) {
    self.absorb_free_next(index);
    if let Some(prev) = self.blocks.get(index).prev.filter(|&prev| self.blocks.get(prev).is_free) {
      self.blocks.merge_with_next(prev);
    }
  }

  /// Returns the handle's region to the free pool and coalesces it with free
  /// neighbors. Afterwards the handle, and any alias of it, names the merged
  /// free region until its slot is reused.
  ///
  /// # Errors
  ///
  /// [`AllocError::InvalidFree`] if the region is already free,
  /// [`AllocError::StaleHandle`] if its descriptor no longer exists.
  pub fn free(
    &mut self,
    handle: Handle,
  ) -> AllocResult<()> {
    let index = self.resolve(handle)?;
    let block = *self.blocks.get(index);
    if block.is_free {
      warn!(offset = block.offset, "double free");
      return Err(AllocError::InvalidFree { offset: block.offset });
    }

    self.blocks.get_mut(index).is_free = true;
    self.coalesce(index);

    debug!(offset = block.offset, size = block.size, "freed");
    self.check();
    Ok(())
  }

  /// Changes the size of the handle's region to `size` bytes.
  ///
  /// Shrinking keeps the region in place. Growing takes bytes from a free
  /// right neighbor when it has enough, otherwise the region moves to the
  /// first free block that fits and the old one is freed. The handle, and any
  /// alias of it, stays valid and names the resized region. The first
  /// `min(old, size)` bytes are preserved.
  ///
  /// A move hands the old region over to the destination's slot. A freed
  /// handle that still named the destination block therefore sees the old,
  /// now free, region afterwards rather than the moved data.
  ///
  /// # Errors
  ///
  /// [`AllocError::ZeroSize`], [`AllocError::NotAllocated`] for a free
  /// region, [`AllocError::StaleHandle`], and [`AllocError::OutOfMemory`] when
  /// a move is needed and nothing fits. Nothing changes on failure.
  pub fn resize(
    &mut self,
    handle: Handle,
    size: usize,
  ) -> AllocResult<()> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let index = self.resolve(handle)?;
    let block = *self.blocks.get(index);
    if block.is_free {
      return Err(AllocError::NotAllocated { offset: block.offset });
    }

    match size.cmp(&block.size) {
      Ordering::Equal => return Ok(()),
      Ordering::Less => {
        if let Some(rest) = self.blocks.split(index, size) {
          self.absorb_free_next(rest);
        }
        debug!(offset = block.offset, from = block.size, to = size, "shrunk");
      }
      Ordering::Greater => {
        let extra = size - block.size;
        let next = block.next.filter(|&next| {
          let next = self.blocks.get(next);
          next.is_free && next.size >= extra
        });

        match next {
          Some(next) => {
            self.blocks.split(next, extra);
            self.blocks.merge_with_next(index);
            debug!(offset = block.offset, from = block.size, to = size, "grew in place");
          }
          None => self.relocate(index, size)?,
        }
      }
    }

    self.check();
    Ok(())
  }

  /// Moves the block in `index` into a fresh region of `size` bytes. The slot
  /// keeps its identity; the old region is freed under another slot.
  fn relocate(
    &mut self,
    index: usize,
    size: usize,
  ) -> AllocResult<()> {
    let destination = self.allocate_block(size)?;
    let from = self.blocks.get(index).offset;
    let to = self.blocks.get(destination).offset;

    self.blocks.copy_to(index, &mut self.arena, to);
    self.blocks.swap_slots(index, destination);

    // `destination` now holds the old region.
    self.blocks.get_mut(destination).is_free = true;
    self.coalesce(destination);

    debug!(from, to, size, "relocated");
    Ok(())
  }

  /// Compacts the arena: used regions slide down to a contiguous prefix in
  /// their original order and all free space becomes one trailing region.
  ///
  /// Handles of used regions stay valid but their bytes move, so slices
  /// obtained earlier must be fetched again. Handles of free regions become
  /// stale.
  pub fn defrag(&mut self) -> DefragReport {
    let mut report = DefragReport::default();
    let mut order = Vec::new();
    let mut discard = Vec::new();
    let mut offset = 0;

    let mut cursor = Some(self.blocks.head());
    while let Some(index) = cursor {
      let block = *self.blocks.get(index);
      cursor = block.next;

      if block.is_free {
        report.free_tail += block.size;
        report.free_blocks_discarded += 1;
        discard.push(index);
        continue;
      }

      if block.offset != offset {
        self.blocks.move_to(index, &mut self.arena, offset);
        report.blocks_moved += 1;
        report.bytes_moved += block.size;
      }
      order.push(index);
      offset += block.size;
    }

    self.blocks.relink(&order, &discard);
    if report.free_tail > 0 {
      self.blocks.push_free(order.last().copied(), offset, report.free_tail);
    }

    debug!(
      moved = report.blocks_moved,
      bytes = report.bytes_moved,
      free = report.free_tail,
      "defragmented"
    );
    self.check();
    report
  }

  /// Bytes of the handle's region.
  ///
  /// # Errors
  ///
  /// [`AllocError::NotAllocated`] for a free region,
  /// [`AllocError::StaleHandle`] for a discarded descriptor.
  pub fn data(
    &self,
    handle: Handle,
  ) -> AllocResult<&[u8]> {
    let block = self.used_block(handle)?;
    Ok(&self.arena[block.offset..block.end()])
  }

  /// Mutable bytes of the handle's region.
  ///
  /// # Errors
  ///
  /// Same as [`Allocator::data`].
  pub fn data_mut(
    &mut self,
    handle: Handle,
  ) -> AllocResult<&mut [u8]> {
    let block = self.used_block(handle)?;
    Ok(&mut self.arena[block.offset..block.end()])
  }

  /// Descriptor snapshot for the handle's region.
  ///
  /// # Errors
  ///
  /// [`AllocError::StaleHandle`] for a discarded descriptor.
  pub fn block(
    &self,
    handle: Handle,
  ) -> AllocResult<BlockInfo> {
    Ok(self.blocks.get(self.resolve(handle)?).into())
  }

  /// Handle of the region following the handle's region, if any.
  ///
  /// # Errors
  ///
  /// [`AllocError::StaleHandle`] for a discarded descriptor.
  pub fn next_block(
    &self,
    handle: Handle,
  ) -> AllocResult<Option<Handle>> {
    let next = self.blocks.get(self.resolve(handle)?).next;
    Ok(next.map(|index| self.blocks.handle(index)))
  }

  /// Handle of the region preceding the handle's region, if any.
  ///
  /// # Errors
  ///
  /// [`AllocError::StaleHandle`] for a discarded descriptor.
  pub fn prev_block(
    &self,
    handle: Handle,
  ) -> AllocResult<Option<Handle>> {
    let prev = self.blocks.get(self.resolve(handle)?).prev;
    Ok(prev.map(|index| self.blocks.handle(index)))
  }

  /// Every descriptor in offset order.
  #[must_use]
  pub fn blocks(&self) -> Vec<BlockInfo> {
    self.blocks.iter().map(|(_, block)| block.into()).collect()
  }

  /// The raw arena bytes, used and free alike.
  #[must_use]
  pub fn dump(&self) -> &[u8] {
    &self.arena
  }

  #[must_use]
  pub fn stats(&self) -> ArenaStats {
    let mut stats = ArenaStats {
      capacity: self.capacity(),
      slots: self.blocks.slot_count(),
      ..ArenaStats::default()
    };

    for (_, block) in self.blocks.iter() {
      stats.blocks += 1;
      if block.is_free {
        stats.free += block.size;
        stats.free_blocks += 1;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.used += block.size;
      }
    }

    stats
  }

  /// Checks coverage, link symmetry and free-neighbor coalescing.
  ///
  /// # Errors
  ///
  /// Returns the first violation found in list order.
  pub fn validate(&self) -> Result<(), InvariantViolation> {
    let mut expected = 0;
    let mut prev = None;
    let mut prev_free = false;

    for (steps, (index, block)) in self.blocks.iter().enumerate() {
      if steps >= self.blocks.slot_count() {
        return Err(InvariantViolation::Cycle);
      }
      if block.prev != prev {
        return Err(InvariantViolation::BrokenLink { offset: block.offset });
      }
      if block.size == 0 {
        return Err(InvariantViolation::EmptyBlock { offset: block.offset });
      }
      if block.offset != expected {
        return Err(InvariantViolation::Coverage {
          expected,
          found: block.offset,
        });
      }
      if prev_free && block.is_free {
        return Err(InvariantViolation::AdjacentFree { offset: block.offset });
      }

      expected = block.end();
      prev = Some(index);
      prev_free = block.is_free;
    }

    if expected != self.capacity() {
      return Err(InvariantViolation::Truncated {
        end: expected,
        capacity: self.capacity(),
      });
    }
    Ok(())
  }

  /// Panics with the first broken invariant, if any.
  ///
  /// # Panics
  ///
  /// Panics when [`Allocator::validate`] fails.
  pub fn assert_valid(&self) {
    if let Err(violation) = self.validate() {
      error!(%violation, "allocator invariant violated");
      panic!("allocator invariant violated: {violation}");
    }
  }

  fn check(&self) {
    if self.config.validate {
      self.assert_valid();
    }
  }
}

/// One line per descriptor: state, offset, size, end offset.
impl fmt::Display for Allocator {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    for (_, block) in self.blocks.iter() {
      writeln!(f, "{}", BlockInfo::from(block))?;
    }
    Ok(())
  }
}

impl fmt::Debug for Allocator {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Allocator")
      .field("capacity", &self.capacity())
      .field("blocks", &self.blocks())
      .finish()
  }
}
