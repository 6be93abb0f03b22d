use std::{collections::VecDeque, iter};

use tracing::{error, trace};

use crate::handle::Handle;

/// Metadata for one contiguous range `[offset, offset + size)` of the arena.
///
/// `next` and `prev` are slot indices into the owning [`BlockTable`] and keep
/// the blocks sorted by offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
  pub offset: usize,
  pub size: usize,
  pub is_free: bool,
  pub next: Option<usize>,
  pub prev: Option<usize>,
}

impl Block {
  pub fn new(
    offset: usize,
    size: usize,
    is_free: bool,
    next: Option<usize>,
    prev: Option<usize>,
  ) -> Self {
    Self {
      offset,
      size,
      is_free,
      next,
      prev,
    }
  }

  #[inline]
  pub fn end(&self) -> usize {
    self.offset + self.size
  }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
  Live(Block),
  /// Absorbed by a merge; handles follow the link to the survivor.
  Forwarded { to: usize, generation: u32 },
  Vacant,
}

#[derive(Debug)]
struct Entry {
  generation: u32,
  slot: Slot,
}

/// Slot table owning every block descriptor, threaded into an index-linked
/// list ordered by offset.
///
/// New blocks take a vacant slot first, then the oldest forwarding slot. The
/// table only grows when every slot holds a live block, so it never exceeds
/// the peak number of live descriptors.
#[derive(Debug)]
pub struct BlockTable {
  entries: Vec<Entry>,
  vacant: Vec<usize>,
  /// Forwarding slots, oldest merge first.
  forwarded: VecDeque<usize>,
  head: usize,
}

#[cold]
#[track_caller]
fn dead_slot(index: usize) -> ! {
  error!(index, "block list links to a slot without a live block");
  panic!("block list links to dead slot {index}");
}

impl BlockTable {
  /// Creates a table holding one free block spanning `[0, capacity)`.
  pub fn new(capacity: usize) -> Self {
    Self {
      entries: vec![Entry {
        generation: 0,
        slot: Slot::Live(Block::new(0, capacity, true, None, None)),
      }],
      vacant: Vec::new(),
      forwarded: VecDeque::new(),
      head: 0,
    }
  }

  #[inline]
  pub fn head(&self) -> usize {
    self.head
  }

  #[inline]
  pub fn slot_count(&self) -> usize {
    self.entries.len()
  }

  pub fn get(
    &self,
    index: usize,
  ) -> &Block {
    match &self.entries[index].slot {
      Slot::Live(block) => block,
      _ => dead_slot(index),
    }
  }

  pub fn get_mut(
    &mut self,
    index: usize,
  ) -> &mut Block {
    match &mut self.entries[index].slot {
      Slot::Live(block) => block,
      _ => dead_slot(index),
    }
  }

  /// Issues a handle for the live block in `index`.
  pub fn handle(
    &self,
    index: usize,
  ) -> Handle {
    Handle::new(index, self.entries[index].generation)
  }

  /// Follows `handle` through any merges to the live block it now names.
  pub fn resolve(
    &self,
    handle: Handle,
  ) -> Option<usize> {
    let mut index = handle.index();
    let mut generation = handle.generation();

    loop {
      let entry = self.entries.get(index)?;
      if entry.generation != generation {
        return None;
      }

      match &entry.slot {
        Slot::Live(_) => return Some(index),
        Slot::Forwarded { to, generation: next_generation } => {
          index = *to;
          generation = *next_generation;
        }
        Slot::Vacant => return None,
      }
    }
  }

  /// Walks the live blocks in offset order.
  pub fn iter(&self) -> impl Iterator<Item = (usize, &Block)> + '_ {
    iter::successors(Some(self.head), move |&index| self.get(index).next)
      .map(move |index| (index, self.get(index)))
  }

  fn insert(
    &mut self,
    block: Block,
  ) -> usize {
    match self.vacant.pop().or_else(|| self.reclaim_forwarded()) {
      Some(index) => {
        self.entries[index].slot = Slot::Live(block);
        index
      }
      None => {
        self.entries.push(Entry {
          generation: 0,
          slot: Slot::Live(block),
        });
        self.entries.len() - 1
      }
    }
  }

  /// Takes back the oldest forwarding slot. Handles that still go through it
  /// become stale.
  fn reclaim_forwarded(&mut self) -> Option<usize> {
    while let Some(index) = self.forwarded.pop_front() {
      let entry = &mut self.entries[index];
      if matches!(entry.slot, Slot::Forwarded { .. }) {
        entry.generation = entry.generation.wrapping_add(1);
        entry.slot = Slot::Vacant;
        trace!(index, "reclaimed forwarding slot");
        return Some(index);
      }
    }
    None
  }

  /// Drops the slot's contents and retires every handle issued for it.
  fn vacate(
    &mut self,
    index: usize,
  ) {
    let entry = &mut self.entries[index];
    entry.generation = entry.generation.wrapping_add(1);
    entry.slot = Slot::Vacant;
    self.vacant.push(index);
  }

  /// Shrinks the block to `size` bytes and links a free block holding the
  /// remainder right after it. Returns the new block's slot, or `None` when
  /// `size` does not cut the block.
  pub fn split(
    &mut self,
    index: usize,
    size: usize,
  ) -> Option<usize> {
    let block = *self.get(index);
    if size >= block.size {
      return None;
    }

    let rest = self.insert(Block::new(
      block.offset + size,
      block.size - size,
      true,
      block.next,
      Some(index),
    ));

    if let Some(next) = block.next {
      self.get_mut(next).prev = Some(rest);
    }

    let head = self.get_mut(index);
    head.size = size;
    head.next = Some(rest);

    trace!(offset = block.offset, size, rest = block.size - size, "split block");
    Some(rest)
  }

  /// Absorbs the following block into this one. Handles of the absorbed
  /// block resolve to this one afterwards, until its slot is reclaimed.
  ///
  /// # Panics
  ///
  /// Panics if the two blocks are not adjacent in the arena.
  pub fn merge_with_next(
    &mut self,
    index: usize,
  ) {
    let Some(second_index) = self.get(index).next else {
      return;
    };
    let first = *self.get(index);
    let second = *self.get(second_index);

    if first.end() != second.offset {
      error!(
        end = first.end(),
        next_offset = second.offset,
        "merge of non-adjacent blocks"
      );
      panic!(
        "merge of non-adjacent blocks: block ends at {} but next starts at {}",
        first.end(),
        second.offset
      );
    }

    if let Some(next) = second.next {
      self.get_mut(next).prev = Some(index);
    }

    let block = self.get_mut(index);
    block.size += second.size;
    block.next = second.next;

    let generation = self.entries[index].generation;
    self.entries[second_index].slot = Slot::Forwarded { to: index, generation };
    self.forwarded.push_back(second_index);

    trace!(offset = first.offset, size = first.size + second.size, "merged blocks");
  }

  /// Moves the block's bytes to `new_offset` and updates its offset.
  /// Source and destination may overlap.
  pub fn move_to(
    &mut self,
    index: usize,
    arena: &mut [u8],
    new_offset: usize,
  ) {
    self.copy_to(index, arena, new_offset);
    self.get_mut(index).offset = new_offset;
  }

  /// Copies the block's bytes to `new_offset` without touching its metadata.
  pub fn copy_to(
    &self,
    index: usize,
    arena: &mut [u8],
    new_offset: usize,
  ) {
    let block = self.get(index);
    arena.copy_within(block.offset..block.end(), new_offset);
    trace!(from = block.offset, to = new_offset, size = block.size, "copied block bytes");
  }

  /// Swaps the blocks held by two live slots, fixing every link so the list
  /// order is unchanged. Handles keep naming their slot, so handles of `a`
  /// now see the block that was in `b` and the reverse.
  pub fn swap_slots(
    &mut self,
    a: usize,
    b: usize,
  ) {
    if a == b {
      return;
    }

    let relabel = |index: usize| {
      if index == a {
        b
      } else if index == b {
        a
      } else {
        index
      }
    };

    let (block_a, block_b) = (*self.get(a), *self.get(b));
    let touched = [Some(a), Some(b), block_a.prev, block_a.next, block_b.prev, block_b.next];

    let slot_a = self.entries[a].slot;
    self.entries[a].slot = self.entries[b].slot;
    self.entries[b].slot = slot_a;

    for (position, &index) in touched.iter().enumerate() {
      let Some(index) = index else {
        continue;
      };
      if touched[..position].contains(&Some(index)) {
        continue;
      }
      let block = self.get_mut(index);
      block.prev = block.prev.map(relabel);
      block.next = block.next.map(relabel);
    }
    self.head = relabel(self.head);
  }

  /// Rebuilds the list from `order`, a sequence of live slots already laid
  /// out back to back. Slots in `discard` are retired.
  pub fn relink(
    &mut self,
    order: &[usize],
    discard: &[usize],
  ) {
    for &index in discard {
      self.vacate(index);
    }

    for (position, &index) in order.iter().enumerate() {
      let prev = position.checked_sub(1).map(|p| order[p]);
      let next = order.get(position + 1).copied();
      let block = self.get_mut(index);
      block.prev = prev;
      block.next = next;
    }

    if let Some(&first) = order.first() {
      self.head = first;
    }
  }

  /// Appends a free block after `tail`.
  pub fn push_free(
    &mut self,
    tail: Option<usize>,
    offset: usize,
    size: usize,
  ) {
    let index = self.insert(Block::new(offset, size, true, None, tail));
    match tail {
      Some(tail) => self.get_mut(tail).next = Some(index),
      None => self.head = index,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn offsets(table: &BlockTable) -> Vec<(usize, usize, bool)> {
    table.iter().map(|(_, b)| (b.offset, b.size, b.is_free)).collect()
  }

  #[test]
  fn test_split() {
    let mut table = BlockTable::new(100);
    let rest = table.split(0, 30).unwrap();

    assert_eq!(offsets(&table), vec![(0, 30, true), (30, 70, true)]);
    assert_eq!(table.get(rest).prev, Some(0));
    assert_eq!(table.get(0).next, Some(rest));
  }

  #[test]
  fn test_split_takes_over_next_link() {
    let mut table = BlockTable::new(100);
    let tail = table.split(0, 50).unwrap();
    let middle = table.split(0, 20).unwrap();

    assert_eq!(table.get(middle).next, Some(tail));
    assert_eq!(table.get(tail).prev, Some(middle));
    assert_eq!(offsets(&table), vec![(0, 20, true), (20, 30, true), (50, 50, true)]);
  }

  #[test]
  fn test_split_no_op() {
    let mut table = BlockTable::new(100);
    assert_eq!(table.split(0, 100), None);
    assert_eq!(table.split(0, 150), None);
    assert_eq!(offsets(&table), vec![(0, 100, true)]);
  }

  #[test]
  fn test_merge_forwards_handles() {
    let mut table = BlockTable::new(100);
    let rest = table.split(0, 40).unwrap();
    let handle = table.handle(rest);

    table.merge_with_next(0);

    assert_eq!(offsets(&table), vec![(0, 100, true)]);
    assert_eq!(table.resolve(handle), Some(0));
  }

  #[test]
  fn test_reclaims_forwarded_slots() {
    let mut table = BlockTable::new(100);
    let rest = table.split(0, 10).unwrap();
    let handle = table.handle(rest);
    table.merge_with_next(0);

    for _ in 0..1000 {
      let rest = table.split(0, 10).unwrap();
      table.merge_with_next(0);
      assert_eq!(rest, 1);
    }

    assert_eq!(table.slot_count(), 2);
    assert_eq!(table.resolve(handle), None);
    assert_eq!(offsets(&table), vec![(0, 100, true)]);
  }

  #[test]
  fn test_vacant_slots_reused_before_forwarded() {
    let mut table = BlockTable::new(30);
    let b = table.split(0, 10).unwrap();
    let c = table.split(b, 10).unwrap();
    let handle_c = table.handle(c);
    table.merge_with_next(b);

    table.get_mut(0).is_free = false;
    table.relink(&[0], &[b]);
    table.push_free(Some(0), 10, 20);

    // `b` was vacant and is taken first; the forward from `c` stays stale
    // because its target slot moved on.
    assert_eq!(table.get(b).offset, 10);
    assert_eq!(table.resolve(handle_c), None);
    assert_eq!(table.slot_count(), 3);
  }

  #[test]
  fn test_merge_chain_resolves() {
    let mut table = BlockTable::new(90);
    let b = table.split(0, 30).unwrap();
    let c = table.split(b, 30).unwrap();
    let handle_c = table.handle(c);

    table.merge_with_next(b);
    table.merge_with_next(0);

    assert_eq!(table.resolve(handle_c), Some(0));
    assert_eq!(table.get(0).size, 90);
  }

  #[test]
  #[should_panic(expected = "non-adjacent")]
  fn test_merge_non_adjacent_panics() {
    let mut table = BlockTable::new(100);
    table.split(0, 40);
    table.get_mut(0).size = 30;
    table.merge_with_next(0);
  }

  #[test]
  fn test_move_to_overlapping() {
    let mut arena: Vec<u8> = (0..10).collect();
    let mut table = BlockTable::new(10);
    let rest = table.split(0, 2).unwrap();
    table.split(rest, 5);

    table.move_to(rest, &mut arena, 1);

    assert_eq!(table.get(rest).offset, 1);
    assert_eq!(&arena[1..6], &[2, 3, 4, 5, 6]);
  }

  #[test]
  fn test_copy_to_keeps_offset() {
    let mut arena = vec![1, 2, 3, 0, 0, 0];
    let mut table = BlockTable::new(6);
    table.split(0, 3);

    table.copy_to(0, &mut arena, 3);

    assert_eq!(table.get(0).offset, 0);
    assert_eq!(arena, vec![1, 2, 3, 1, 2, 3]);
  }

  #[test]
  fn test_swap_adjacent_slots() {
    let mut table = BlockTable::new(30);
    let b = table.split(0, 10).unwrap();
    let c = table.split(b, 10).unwrap();
    let handle_a = table.handle(0);

    table.swap_slots(0, b);

    assert_eq!(table.head(), b);
    assert_eq!(table.get(0).offset, 10);
    assert_eq!(table.get(b).offset, 0);
    assert_eq!(table.get(b).next, Some(0));
    assert_eq!(table.get(0).prev, Some(b));
    assert_eq!(table.get(c).prev, Some(0));
    assert_eq!(table.resolve(handle_a), Some(0));
    assert_eq!(offsets(&table), vec![(0, 10, true), (10, 10, true), (20, 10, true)]);
  }

  #[test]
  fn test_relink_retires_discarded() {
    let mut table = BlockTable::new(30);
    let b = table.split(0, 10).unwrap();
    let handle_b = table.handle(b);

    table.get_mut(0).is_free = false;
    table.relink(&[0], &[b]);
    table.push_free(Some(0), 10, 20);

    assert_eq!(table.resolve(handle_b), None);
    assert_eq!(offsets(&table), vec![(0, 10, false), (10, 20, true)]);
  }
}
