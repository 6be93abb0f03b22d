//! # rarena - A Simulated First-Fit Heap
//!
//! This crate manages variable-sized regions inside one fixed byte arena. All
//! bookkeeping lives in allocator-owned metadata; the platform allocator is
//! only used once, to reserve the arena and the descriptor table.
//!
//! ## Overview
//!
//! The arena is tiled by **block descriptors**. Each descriptor covers one
//! contiguous range and is either free or used:
//!
//! ```text
//!   Arena (S bytes):
//!
//!   0                                                                S
//!   ┌──────────┬─────────────┬────────┬──────────────┬───────────────┐
//!   │  USED A  │    FREE     │ USED B │    USED C    │     FREE      │
//!   └──────────┴─────────────┴────────┴──────────────┴───────────────┘
//!        ▲            ▲           ▲           ▲              ▲
//!        └────────────┴───────────┴───────────┴──────────────┘
//!              doubly-linked descriptor list, sorted by offset
//! ```
//!
//! The list always covers `[0, S)` with no gaps and no overlaps, and no two
//! neighbors are ever both free.
//!
//! ## Crate Structure
//!
//! ```text
//!   rarena
//!   ├── block    - Descriptor table: split, merge, move, copy (internal)
//!   ├── config   - AllocatorConfig, loadable from TOML
//!   ├── error    - AllocError, InvariantViolation, ConfigError
//!   ├── handle   - Handle: slot index + generation
//!   ├── heap     - Allocator: allocate, free, resize, defrag, inspect
//!   └── inspect  - BlockInfo, ArenaStats, DefragReport snapshots
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rarena::{AllocError, Allocator};
//!
//! let mut allocator = Allocator::new(100);
//!
//! let a = allocator.allocate(30).unwrap();
//! let b = allocator.allocate(20).unwrap();
//! allocator.data_mut(b).unwrap().fill(0xAB);
//!
//! allocator.free(a).unwrap();
//! assert_eq!(allocator.free(a), Err(AllocError::InvalidFree { offset: 0 }));
//!
//! // First fit: the hole left by `a` is reused.
//! let c = allocator.allocate(10).unwrap();
//! assert_eq!(allocator.block(c).unwrap().offset, 0);
//!
//! allocator.resize(b, 50).unwrap();
//! assert!(allocator.data(b).unwrap()[..20].iter().all(|&byte| byte == 0xAB));
//! ```
//!
//! ## How It Works
//!
//! Allocation scans the list from the head and takes the first free block
//! that is large enough, splitting off the unused tail:
//!
//! ```text
//!   allocate(n):
//!
//!   ┌──────────────── FREE (size) ────────────────┐
//!   └─────────────────────────────────────────────┘
//!                         │ split(n)
//!                         ▼
//!   ┌──── USED (n) ────┬───── FREE (size - n) ─────┐
//!   └──────────────────┴───────────────────────────┘
//! ```
//!
//! Freeing flips the flag and merges with free neighbors, so the list never
//! holds two adjacent free blocks:
//!
//! ```text
//!   free(B):
//!
//!   ┌─ FREE ─┬─ USED B ─┬─ FREE ─┐        ┌────────── FREE ──────────┐
//!   └────────┴──────────┴────────┘   ──►  └──────────────────────────┘
//! ```
//!
//! Growing a region first tries to take bytes from a free right neighbor and
//! falls back to moving the region. [`Allocator::defrag`] slides every used
//! region down to offset 0 and leaves a single free region at the end.
//!
//! ## Handles
//!
//! A [`Handle`] is a slot index plus a generation. Copies of a handle alias
//! the same region. When a merge absorbs a descriptor, its slot forwards to
//! the survivor, so every alias observes the merged region. When compaction
//! discards a free descriptor, the slot's generation moves on and old handles
//! report [`AllocError::StaleHandle`] instead of reading someone else's
//! bytes.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: wrap the allocator in a lock to share it
//! - **Fixed size**: the arena never grows
//! - **Byte granularity**: no alignment beyond one byte

mod block;
pub mod config;
pub mod error;
mod handle;
mod heap;
pub mod inspect;

pub use config::AllocatorConfig;
pub use error::{AllocError, AllocResult, ConfigError, InvariantViolation};
pub use handle::Handle;
pub use heap::Allocator;
pub use inspect::{ArenaStats, BlockInfo, DefragReport};
