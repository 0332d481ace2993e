use std::alloc::Layout;

use rpool::{BlockAllocator, Pool, pool_format, tracker};
use tracing_subscriber::EnvFilter;

/// Prints the pool counters after each step.
fn print_pool(
  label: &str,
  pool: &Pool<'_>,
) {
  println!(
    "[{label}] blocks = {}, size = {}, used = {}, allocated = {}, peak = {}, remaining = {}",
    pool.block_count(),
    pool.size(),
    pool.used(),
    pool.allocated(),
    pool.peak(),
    pool.remaining(),
  );
}

fn main() {
  // `RUST_LOG=rpool=trace` shows pool growth, clears and restores.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut pool = Pool::new(256);
  print_pool("start", &pool);

  // --------------------------------------------------------------------
  // 1) Aligned and unaligned allocations share the root block.
  // --------------------------------------------------------------------
  let word = pool.alloc(8);
  let byte = pool.ualloc(3);
  println!("\n[1] alloc(8) at {word:p}, ualloc(3) at {byte:p}");
  let wide = pool.alloc_layout(Layout::new::<u128>());
  println!("[1] u128 layout at {wide:p}");
  print_pool("1", &pool);

  // --------------------------------------------------------------------
  // 2) Strings: plain copies, formatting and splitting.
  // --------------------------------------------------------------------
  let hello = pool.strdup("Hello, World!");
  let line = pool_format!(pool, "{}={}", "answer", 42);
  println!("\n[2] strdup = {hello:?}, strdupf = {line:?}");
  let fields = pool.split_with_escape(b',', b'\\', Some("a\\,b,c,,d"));
  println!("[2] split_with_escape = {fields:?}");
  print_pool("2", &pool);

  // --------------------------------------------------------------------
  // 3) Save, overflow the root block, then roll back.
  // --------------------------------------------------------------------
  let marker = pool.save();
  pool.alloc(1000);
  pool.alloc(1000);
  println!("\n[3] two oversized allocations chained new blocks");
  print_pool("3", &pool);
  pool.restore(marker);
  print_pool("3 restored", &pool);

  // --------------------------------------------------------------------
  // 4) Size-class blocks are recycled.
  // --------------------------------------------------------------------
  {
    let blocks = BlockAllocator::new(&pool);
    if let Some(block) = blocks.alloc(100) {
      unsafe { blocks.release(block.as_ptr(), 100) };
      println!("\n[4] released {block:p}, next alloc(100) = {:?}", blocks.alloc(100));
    }
  }

  // --------------------------------------------------------------------
  // 5) A nested pool draws from its parent.
  // --------------------------------------------------------------------
  {
    let child = Pool::nested(&pool, 64);
    child.strdup("inside the child");
    println!("\n[5] child: {child:?}");
  }
  print_pool("5", &pool);

  pool.clear();
  print_pool("cleared", &pool);
  pool.destroy();

  // With `--features debug-alloc` the pool blocks above went through the
  // tracker; whatever is still live is dumped on shutdown.
  tracker::destroy();
}
