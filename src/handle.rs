/// Caller-side reference to a region of the arena.
///
/// A handle names a slot in the allocator's descriptor table together with
/// the slot's generation at the time the handle was issued. Handles are cheap
/// to copy and any number of copies may alias the same region: when the
/// region's descriptor is merged into a neighbor, every copy follows it to the
/// survivor. When compaction discards a freed descriptor the generation of its
/// slot moves on, and the handle resolves to
/// [`AllocError::StaleHandle`](crate::AllocError::StaleHandle) from then on.
///
/// Handles of used regions never go stale. A handle that was freed only
/// keeps following merges until its slot is reused for a new descriptor,
/// after which it is stale as well. A freed handle whose region is picked up
/// again names whatever region now lives in its slot: the new allocation
/// after [`allocate`](crate::Allocator::allocate), or the vacated old region
/// after a relocating [`resize`](crate::Allocator::resize).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
  index: usize,
  generation: u32,
}

impl Handle {
  pub(crate) const fn new(
    index: usize,
    generation: u32,
  ) -> Self {
    Self { index, generation }
  }

  /// Slot index in the descriptor table.
  #[inline]
  #[must_use]
  pub const fn index(self) -> usize {
    self.index
  }

  /// Generation of the slot when the handle was issued.
  #[inline]
  #[must_use]
  pub const fn generation(self) -> u32 {
    self.generation
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_handle_parts() {
    let handle = Handle::new(7, 3);
    assert_eq!(handle.index(), 7);
    assert_eq!(handle.generation(), 3);
    assert_ne!(handle, Handle::new(7, 4));
  }
}
