//! Randomized operation sequences checked against a simple model of the
//! live regions and their contents.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rarena::{AllocError, Allocator, AllocatorConfig, Handle};

const ARENA_SIZE: usize = 1024;
const STEPS: usize = 2_000;

struct Live {
  handle: Handle,
  bytes: Vec<u8>,
}

fn write_random(
  allocator: &mut Allocator,
  rng: &mut StdRng,
  handle: Handle,
) -> Vec<u8> {
  let data = allocator.data_mut(handle).unwrap();
  rng.fill(data);
  data.to_vec()
}

fn assert_tiling(allocator: &Allocator) {
  let blocks = allocator.blocks();
  assert_eq!(blocks.first().map(|b| b.offset), Some(0));
  assert_eq!(blocks.last().map(|b| b.end()), Some(ARENA_SIZE));
  for pair in blocks.windows(2) {
    assert_eq!(pair[0].end(), pair[1].offset, "gap or overlap in {allocator}");
    assert!(!(pair[0].is_free && pair[1].is_free), "adjacent free blocks in {allocator}");
  }
}

fn assert_contents(
  allocator: &Allocator,
  live: &[Live],
) {
  for region in live {
    assert_eq!(allocator.data(region.handle).unwrap(), region.bytes.as_slice());
  }
  let used: usize = live.iter().map(|region| region.bytes.len()).sum();
  assert_eq!(allocator.stats().used, used);
}

fn run(
  seed: u64,
  defrag_on_oom: bool,
) {
  let mut rng = StdRng::seed_from_u64(seed);
  let config = AllocatorConfig {
    arena_size: ARENA_SIZE,
    validate: true,
    defrag_on_oom,
  };
  let mut allocator = Allocator::with_config(config).unwrap();
  let mut live: Vec<Live> = Vec::new();

  for _ in 0..STEPS {
    match rng.gen_range(0..10) {
      0..=3 => {
        let size = rng.gen_range(1..=96);
        match allocator.allocate(size) {
          Ok(handle) => {
            assert_eq!(allocator.block(handle).unwrap().size, size);
            let bytes = write_random(&mut allocator, &mut rng, handle);
            live.push(Live { handle, bytes });
          }
          Err(AllocError::OutOfMemory { largest_free, .. }) => assert!(largest_free < size),
          Err(err) => panic!("unexpected allocate error: {err}"),
        }
      }
      4..=6 if !live.is_empty() => {
        let region = live.swap_remove(rng.gen_range(0..live.len()));
        allocator.free(region.handle).unwrap();
        assert!(matches!(
          allocator.free(region.handle),
          Err(AllocError::InvalidFree { .. })
        ));
      }
      7..=8 if !live.is_empty() => {
        let position = rng.gen_range(0..live.len());
        let size = rng.gen_range(1..=128);
        let handle = live[position].handle;
        match allocator.resize(handle, size) {
          Ok(()) => {
            let kept = size.min(live[position].bytes.len());
            assert_eq!(&allocator.data(handle).unwrap()[..kept], &live[position].bytes[..kept]);
            live[position].bytes = write_random(&mut allocator, &mut rng, handle);
          }
          Err(AllocError::OutOfMemory { .. }) => {}
          Err(err) => panic!("unexpected resize error: {err}"),
        }
      }
      _ => {
        let free_before = allocator.stats().free;
        let report = allocator.defrag();
        assert_eq!(report.free_tail, free_before);

        let blocks = allocator.blocks();
        let free_blocks: Vec<_> = blocks.iter().filter(|b| b.is_free).collect();
        assert!(free_blocks.len() <= 1);
        if let Some(tail) = free_blocks.first() {
          assert_eq!(tail.end(), ARENA_SIZE);
          assert_eq!(tail.size, free_before);
        }
      }
    }

    assert_tiling(&allocator);
    assert_contents(&allocator, &live);
  }
}

#[test]
fn test_random_sequences_keep_invariants() {
  for seed in 0..8 {
    run(seed, false);
  }
}

#[test]
fn test_random_sequences_with_defrag_on_oom() {
  for seed in 100..104 {
    run(seed, true);
  }
}

#[test]
fn test_handles_survive_repeated_defrag() {
  let mut allocator = Allocator::new(ARENA_SIZE);
  let handles: Vec<Handle> = (0..16).map(|_| allocator.allocate(32).unwrap()).collect();
  for (i, &handle) in handles.iter().enumerate() {
    allocator.data_mut(handle).unwrap().fill(i as u8);
  }

  for &handle in handles.iter().step_by(2) {
    allocator.free(handle).unwrap();
  }
  allocator.defrag();
  allocator.defrag();

  for (i, &handle) in handles.iter().enumerate().skip(1).step_by(2) {
    assert!(allocator.data(handle).unwrap().iter().all(|&byte| byte == i as u8));
  }
  assert_eq!(allocator.blocks().len(), 9);
}
