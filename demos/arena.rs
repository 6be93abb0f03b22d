use std::{env, error::Error};

use rarena::{AllocError, Allocator, AllocatorConfig};
use tracing_subscriber::EnvFilter;

/// Prints the descriptor list, one line per block.
fn print_blocks(
  label: &str,
  allocator: &Allocator,
) {
  println!("\n[{label}]");
  print!("{allocator}");
}

fn main() -> Result<(), Box<dyn Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive("rarena=debug".parse()?))
    .init();

  // Optional TOML config path as the first argument, e.g.
  //   arena_size = 100
  //   defrag_on_oom = true
  let config = match env::args().nth(1) {
    Some(path) => AllocatorConfig::from_path(path)?,
    None => AllocatorConfig::with_arena_size(100),
  };
  let mut allocator = Allocator::with_config(config)?;
  print_blocks("start", &allocator);

  // --------------------------------------------------------------------
  // 1) Two allocations land back to back from offset 0.
  // --------------------------------------------------------------------
  let a = allocator.allocate(30)?;
  let b = allocator.allocate(20)?;
  allocator.data_mut(b)?.copy_from_slice(&[0xB0; 20]);
  print_blocks("1: allocate 30 and 20", &allocator);

  // --------------------------------------------------------------------
  // 2) Freeing A leaves a hole at the front. A second free is refused.
  // --------------------------------------------------------------------
  allocator.free(a)?;
  print_blocks("2: free A", &allocator);
  match allocator.free(a) {
    Err(AllocError::InvalidFree { offset }) => println!("double free refused at offset {offset}"),
    other => println!("unexpected result: {other:?}"),
  }

  // --------------------------------------------------------------------
  // 3) First fit reuses the hole.
  // --------------------------------------------------------------------
  let c = allocator.allocate(10)?;
  println!("\n[3] C placed at offset {}", allocator.block(c)?.offset);

  // --------------------------------------------------------------------
  // 4) Grow B; its first 20 bytes survive whether or not it moved.
  // --------------------------------------------------------------------
  allocator.resize(b, 50)?;
  let kept = allocator.data(b)?[..20].iter().all(|&byte| byte == 0xB0);
  print_blocks("4: resize B to 50", &allocator);
  println!("B data preserved: {kept}");

  // --------------------------------------------------------------------
  // 5) Punch a hole and compact.
  // --------------------------------------------------------------------
  allocator.free(c)?;
  let report = allocator.defrag();
  print_blocks("5: free C, defrag", &allocator);
  println!("{report:?}");
  println!("{:?}", allocator.stats());

  Ok(())
}
