use std::{
  alloc::Layout,
  cell::{Cell, RefCell},
  fmt, io, mem,
  panic::Location,
  ptr::NonNull,
  slice,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use tracing::{debug, trace};

use crate::{
  align,
  align::{WORD, align_up, padding_for},
  block::Block,
  error::{AllocError, fatal},
  sys,
  tracker::Describe,
};

/// Bookkeeping bytes of a pool besides its blocks.
pub const POOL_OVERHEAD: usize = mem::size_of::<Pool<'static>>();

/// Bookkeeping bytes per block.
pub const BLOCK_OVERHEAD: usize = mem::size_of::<Block>();

/// Counters of a pool, readable from other threads.
///
/// The owning pool is the only writer, so updates are plain relaxed
/// load/store pairs rather than read-modify-write operations.
#[derive(Debug)]
pub struct PoolStats {
  initial_size: usize,
  allocated: AtomicUsize,
  peak: AtomicUsize,
  used: AtomicUsize,
}

impl PoolStats {
  fn new(initial_size: usize) -> Self {
    Self {
      initial_size,
      allocated: AtomicUsize::new(0),
      peak: AtomicUsize::new(0),
      used: AtomicUsize::new(Self::root_used(initial_size)),
    }
  }

  const fn root_used(capacity: usize) -> usize {
    capacity + POOL_OVERHEAD + BLOCK_OVERHEAD
  }

  #[inline]
  fn record(
    &self,
    len: usize,
  ) {
    let allocated = self.allocated.load(Ordering::Relaxed) + len;
    self.allocated.store(allocated, Ordering::Relaxed);
    if allocated > self.peak.load(Ordering::Relaxed) {
      self.peak.store(allocated, Ordering::Relaxed);
    }
  }

  fn set_allocated(
    &self,
    allocated: usize,
  ) {
    self.allocated.store(allocated, Ordering::Relaxed);
  }

  fn set_used(
    &self,
    used: usize,
  ) {
    self.used.store(used, Ordering::Relaxed);
  }

  pub fn initial_size(&self) -> usize {
    self.initial_size
  }

  pub fn allocated(&self) -> usize {
    self.allocated.load(Ordering::Relaxed)
  }

  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::Relaxed)
  }

  pub fn used(&self) -> usize {
    self.used.load(Ordering::Relaxed)
  }
}

impl Describe for PoolStats {
  fn describe(
    &self,
    out: &mut dyn io::Write,
    caller: &'static Location<'static>,
    _length: usize,
  ) -> io::Result<()> {
    write!(
      out,
      "{caller} size: {}, max_size: {}, initial_size: {} used: {} ",
      self.allocated(),
      self.peak(),
      self.initial_size,
      self.used()
    )
  }
}

/// Saved pool position for stack-style rollback with [`Pool::restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
  block: usize,
  cursor: *mut u8,
  size: usize,
  allocated: usize,
  root: *mut u8,
}

/// A bump allocator over a chain of blocks.
///
/// Allocations advance a cursor through the current block; when a request
/// does not fit, a new block of at least [`Pool::minimum_growth_size`] bytes
/// becomes current. Nothing is freed individually: memory comes back in bulk
/// through [`Pool::clear`], [`Pool::restore`] or dropping the pool.
///
/// Allocation methods take `&self` and safe helpers return references tied to
/// that borrow, so rolling back (which needs `&mut self`) can never leave a
/// dangling reference behind. A pool is not thread-safe: give each thread its
/// own.
///
/// A pool created with [`Pool::nested`] carves its blocks out of a parent
/// pool and never returns memory to the system; the parent reclaims it.
pub struct Pool<'p> {
  blocks: RefCell<Vec<Block>>,
  cursor: Cell<*mut u8>,
  end: Cell<*mut u8>,
  minimum_growth_size: Cell<usize>,
  /// Unused tails of exhausted blocks.
  size: Cell<usize>,
  stats: Arc<PoolStats>,
  parent: Option<&'p Pool<'p>>,
}

fn capacity_for(initial_size: usize) -> Result<usize, AllocError> {
  if initial_size == 0 {
    return Err(AllocError::ZeroInitialSize);
  }
  align_up(initial_size, WORD).ok_or(AllocError::SizeOverflow)
}

impl Pool<'static> {
  /// Creates a pool whose first block holds `initial_size` bytes, rounded up
  /// to the word size. Zero is fatal.
  #[track_caller]
  pub fn new(initial_size: usize) -> Self {
    match Self::try_new(initial_size) {
      Ok(pool) => pool,
      Err(err) => fatal(err),
    }
  }

  #[track_caller]
  pub fn try_new(initial_size: usize) -> Result<Self, AllocError> {
    let capacity = capacity_for(initial_size)?;
    let stats = Arc::new(PoolStats::new(capacity));
    let start = sys::alloc_described(capacity, stats.clone());
    debug!(capacity, "pool created");
    Ok(Self::with_root(start, capacity, stats, None))
  }
}

impl<'p> Pool<'p> {
  /// Creates a pool whose blocks are carved out of `parent`.
  #[track_caller]
  pub fn nested(
    parent: &'p Pool<'p>,
    initial_size: usize,
  ) -> Self {
    match Self::try_nested(parent, initial_size) {
      Ok(pool) => pool,
      Err(err) => fatal(err),
    }
  }

  pub fn try_nested(
    parent: &'p Pool<'p>,
    initial_size: usize,
  ) -> Result<Self, AllocError> {
    let capacity = capacity_for(initial_size)?;
    let start = parent.alloc(capacity);
    debug!(capacity, "nested pool created");
    Ok(Self::with_root(start, capacity, Arc::new(PoolStats::new(capacity)), Some(parent)))
  }

  fn with_root(
    start: NonNull<u8>,
    capacity: usize,
    stats: Arc<PoolStats>,
    parent: Option<&'p Pool<'p>>,
  ) -> Self {
    let root = Block::new(start, capacity);
    Self {
      blocks: RefCell::new(vec![root]),
      cursor: Cell::new(start.as_ptr()),
      end: Cell::new(root.end()),
      minimum_growth_size: Cell::new(capacity),
      size: Cell::new(0),
      stats,
      parent,
    }
  }

  /// Reserves `len` bytes aligned to the machine word.
  #[inline]
  pub fn alloc(
    &self,
    len: usize,
  ) -> NonNull<u8> {
    self.bump(len, WORD)
  }

  /// Reserves `len` bytes with no alignment guarantee.
  #[inline]
  pub fn ualloc(
    &self,
    len: usize,
  ) -> NonNull<u8> {
    self.bump(len, 1)
  }

  /// Reserves memory for `layout`, honouring alignments above the word size.
  #[inline]
  pub fn alloc_layout(
    &self,
    layout: Layout,
  ) -> NonNull<u8> {
    self.bump(layout.size(), layout.align())
  }

  /// Reserves `max_len` bytes if they fit in the current block, otherwise the
  /// whole remainder of the block if that is at least `min_len`. Only when
  /// neither fits does the pool grow, by `max_len`. Returns the granted length.
  pub fn min_max_alloc(
    &self,
    min_len: usize,
    max_len: usize,
  ) -> (NonNull<u8>, usize) {
    let cursor = self.cursor.get();
    let aligned = align!(cursor.addr());
    let end = self.end.get().addr();

    if aligned <= end {
      let available = end - aligned;
      let granted = if max_len <= available {
        Some(max_len)
      } else if min_len <= available {
        Some(available)
      } else {
        None
      };

      if let Some(granted) = granted {
        // SAFETY: `aligned + granted <= end`, inside the current block.
        unsafe {
          let start = cursor.add(aligned - cursor.addr());
          self.cursor.set(start.add(granted));
          self.stats.record(granted);
          return (NonNull::new_unchecked(start), granted);
        }
      }
    }

    (self.grow(max_len, WORD), max_len)
  }

  /// Reserves `len` zeroed, word-aligned bytes.
  #[allow(clippy::mut_from_ref)]
  pub fn zalloc(
    &self,
    len: usize,
  ) -> &mut [u8] {
    let ptr = self.alloc(len);
    // SAFETY: `len` fresh bytes owned by this pool, handed out once.
    unsafe {
      ptr.write_bytes(0, len);
      slice::from_raw_parts_mut(ptr.as_ptr(), len)
    }
  }

  /// Reserves `count * size` zeroed bytes. Overflow is fatal.
  #[allow(clippy::mut_from_ref)]
  pub fn calloc(
    &self,
    count: usize,
    size: usize,
  ) -> &mut [u8] {
    match count.checked_mul(size) {
      Some(len) => self.zalloc(len),
      None => fatal(AllocError::SizeOverflow),
    }
  }

  #[inline]
  fn bump(
    &self,
    len: usize,
    alignment: usize,
  ) -> NonNull<u8> {
    let cursor = self.cursor.get();
    let pad = padding_for(cursor.addr(), alignment);
    let available = self.end.get().addr() - cursor.addr();

    if pad <= available && len <= available - pad {
      // SAFETY: `pad + len` bytes past the cursor lie inside the current
      // block, and block memory is never null.
      unsafe {
        let start = cursor.add(pad);
        self.cursor.set(start.add(len));
        self.stats.record(len);
        return NonNull::new_unchecked(start);
      }
    }

    self.grow(len, alignment)
  }

  #[cold]
  #[inline(never)]
  fn grow(
    &self,
    len: usize,
    alignment: usize,
  ) -> NonNull<u8> {
    // System and parent blocks already start word-aligned.
    let slack = if alignment > WORD { alignment - 1 } else { 0 };
    let Some(needed) = len.checked_add(slack) else {
      fatal(AllocError::SizeOverflow)
    };
    let capacity = needed.max(self.minimum_growth_size.get());

    let start = match self.parent {
      Some(parent) => parent.alloc(capacity),
      None => sys::alloc(capacity),
    };
    let block = Block::new(start, capacity);

    let tail = self.end.get().addr() - self.cursor.get().addr();
    self.size.set(self.size.get() + tail);
    self.stats.set_used(self.stats.used() + BLOCK_OVERHEAD + capacity);

    let mut blocks = self.blocks.borrow_mut();
    blocks.push(block);
    trace!(len, capacity, blocks = blocks.len(), "pool grew");

    // SAFETY: `pad + len <= capacity` by construction of `needed`.
    unsafe {
      let result = start.add(padding_for(start.as_ptr().addr(), alignment));
      self.cursor.set(result.as_ptr().add(len));
      self.end.set(block.end());
      self.stats.record(len);
      result
    }
  }

  /// Returns every block but the first to its owner and rewinds the cursor
  /// to the start of the first block. Previous contents are not zeroed.
  pub fn clear(&mut self) {
    let released = self.truncate_blocks(1);
    let root = self.blocks.get_mut()[0];

    self.cursor.set(root.start.as_ptr());
    self.end.set(root.end());
    self.size.set(0);
    self.stats.set_allocated(0);
    self.stats.set_used(PoolStats::root_used(root.capacity));
    debug!(released, "pool cleared");
  }

  /// Drops blocks `keep..`, newest first, and returns how many went away.
  fn truncate_blocks(
    &mut self,
    keep: usize,
  ) -> usize {
    let owns_memory = self.parent.is_none();
    let blocks = self.blocks.get_mut();
    let mut released = 0;

    while blocks.len() > keep {
      let Some(block) = blocks.pop() else { break };
      if owns_memory {
        // SAFETY: growth blocks of a root pool come from `sys::alloc` and no
        // reference into them survives `&mut self`.
        unsafe { sys::free(block.start.as_ptr()) };
      }
      released += 1;
    }
    released
  }

  /// Releases all memory of the pool. Same as dropping it.
  pub fn destroy(self) {
    drop(self);
  }

  /// Snapshots the current position.
  pub fn save(&self) -> Marker {
    let blocks = self.blocks.borrow();
    Marker {
      block: blocks.len() - 1,
      cursor: self.cursor.get(),
      size: self.size.get(),
      allocated: self.stats.allocated(),
      root: blocks[0].start.as_ptr(),
    }
  }

  /// Rolls the pool back to `marker`: blocks added since are released and
  /// the next allocation starts where the marker was taken. A marker from
  /// another pool, or one invalidated by [`Pool::clear`], is fatal.
  pub fn restore(
    &mut self,
    marker: Marker,
  ) {
    if let Err(err) = self.try_restore(marker) {
      fatal(err);
    }
  }

  pub fn try_restore(
    &mut self,
    marker: Marker,
  ) -> Result<(), AllocError> {
    let blocks = self.blocks.get_mut();
    let Some(&block) = blocks.get(marker.block) else {
      return Err(AllocError::StaleMarker);
    };
    if blocks[0].start.as_ptr() != marker.root || !block.contains(marker.cursor) {
      return Err(AllocError::StaleMarker);
    }

    let dropped: usize = blocks[marker.block + 1..].iter().map(|b| BLOCK_OVERHEAD + b.capacity).sum();
    let released = self.truncate_blocks(marker.block + 1);

    self.cursor.set(marker.cursor);
    self.end.set(block.end());
    self.size.set(marker.size);
    self.stats.set_allocated(marker.allocated);
    self.stats.set_used(self.stats.used() - dropped);
    trace!(released, "pool restored to marker");
    Ok(())
  }

  /// Changes the size of future growth blocks. Zero is fatal.
  pub fn set_minimum_growth_size(
    &self,
    size: usize,
  ) {
    if size == 0 {
      fatal(AllocError::ZeroGrowthSize);
    }
    self.minimum_growth_size.set(size);
  }

  pub fn minimum_growth_size(&self) -> usize {
    self.minimum_growth_size.get()
  }

  /// Unused tails of exhausted blocks plus the free bytes of the current one.
  pub fn size(&self) -> usize {
    self.size.get() + self.remaining()
  }

  /// Bytes the pool obtained for its blocks plus structural overhead.
  pub fn used(&self) -> usize {
    self.stats.used()
  }

  /// Bytes handed out since creation or the last clear, padding excluded.
  pub fn allocated(&self) -> usize {
    self.stats.allocated()
  }

  /// High-water mark of [`Pool::allocated`].
  pub fn peak(&self) -> usize {
    self.stats.peak()
  }

  /// Capacity of the first block.
  pub fn initial_size(&self) -> usize {
    self.stats.initial_size()
  }

  /// Free bytes left in the current block.
  pub fn remaining(&self) -> usize {
    self.end.get().addr() - self.cursor.get().addr()
  }

  pub fn block_count(&self) -> usize {
    self.blocks.borrow().len()
  }

  pub fn is_nested(&self) -> bool {
    self.parent.is_some()
  }

  /// Shared view of the counters, usable from other threads.
  pub fn stats(&self) -> Arc<PoolStats> {
    Arc::clone(&self.stats)
  }

  pub(crate) fn cursor(&self) -> *mut u8 {
    self.cursor.get()
  }

  pub(crate) fn current_end(&self) -> *mut u8 {
    self.end.get()
  }

  /// Moves the cursor inside the current block.
  ///
  /// # Safety
  ///
  /// `cursor` must lie between the current cursor's block start and its end.
  pub(crate) unsafe fn set_cursor(
    &self,
    cursor: *mut u8,
  ) {
    self.cursor.set(cursor);
  }

  pub(crate) fn record(
    &self,
    len: usize,
  ) {
    self.stats.record(len);
  }

  /// Accounts for bytes of an exhausted block that will never be handed out.
  pub(crate) fn add_wasted(
    &self,
    bytes: usize,
  ) {
    self.size.set(self.size.get() + bytes);
  }
}

impl Drop for Pool<'_> {
  fn drop(&mut self) {
    self.truncate_blocks(1);
    if self.parent.is_none() {
      let root = self.blocks.get_mut()[0];
      // SAFETY: the root block came from `sys::alloc_described` and the pool
      // is going away.
      unsafe { sys::free(root.start.as_ptr()) };
    }
  }
}

impl fmt::Debug for Pool<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Pool")
      .field("initial_size", &self.initial_size())
      .field("size", &self.size())
      .field("used", &self.used())
      .field("allocated", &self.allocated())
      .field("peak", &self.peak())
      .field("blocks", &self.block_count())
      .field("nested", &self.is_nested())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::test_util::{is_test_child, run_aborting_child};

  fn addr(ptr: NonNull<u8>) -> usize {
    ptr.as_ptr().addr()
  }

  #[test]
  fn test_initial_size_rounds_to_word() {
    let pool = Pool::new(13);
    assert_eq!(pool.initial_size(), align!(13));
    assert_eq!(pool.size(), align!(13));
    assert_eq!(pool.minimum_growth_size(), align!(13));
    assert_eq!(pool.used(), align!(13) + POOL_OVERHEAD + BLOCK_OVERHEAD);
  }

  #[test]
  fn test_try_new_rejects_zero() {
    assert_eq!(Pool::try_new(0).err(), Some(AllocError::ZeroInitialSize));
    assert_eq!(Pool::try_new(usize::MAX).err(), Some(AllocError::SizeOverflow));
  }

  #[test]
  fn test_zero_initial_size_aborts() {
    if is_test_child() {
      let _pool = Pool::new(0);
      return;
    }
    let stderr = run_aborting_child("pool::tests::test_zero_initial_size_aborts");
    assert!(stderr.contains("pool initial size must be non-zero"));
  }

  #[test]
  fn test_zero_growth_size_aborts() {
    if is_test_child() {
      Pool::new(64).set_minimum_growth_size(0);
      return;
    }
    let stderr = run_aborting_child("pool::tests::test_zero_growth_size_aborts");
    assert!(stderr.contains("minimum growth size must be non-zero"));
  }

  #[test]
  fn test_alloc_is_word_aligned() {
    let pool = Pool::new(256);
    pool.ualloc(3);
    let p = pool.alloc(8);
    assert_eq!(addr(p) % WORD, 0);
  }

  #[test]
  fn test_ualloc_packs() {
    let pool = Pool::new(256);
    let a = pool.ualloc(3);
    let b = pool.ualloc(5);
    assert_eq!(addr(b), addr(a) + 3);
    assert_eq!(pool.allocated(), 8);
  }

  #[test]
  fn test_alloc_layout_over_aligned() {
    let pool = Pool::new(64);
    pool.ualloc(1);
    let p = pool.alloc_layout(Layout::from_size_align(32, 64).unwrap());
    assert_eq!(addr(p) % 64, 0);

    // Forces a growth block; the slack must still give 64-byte alignment.
    let q = pool.alloc_layout(Layout::from_size_align(200, 64).unwrap());
    assert_eq!(addr(q) % 64, 0);
  }

  #[test]
  fn test_growth_block_sizing() {
    let pool = Pool::new(64);
    let root_used = pool.used();

    pool.alloc(40);
    pool.alloc(100);
    assert_eq!(pool.block_count(), 2);
    // Oversized request: the block is exactly as large as the request.
    assert_eq!(pool.remaining(), 0);
    assert_eq!(pool.used(), root_used + BLOCK_OVERHEAD + 100);
    // The 24 bytes left in the root block are accounted for.
    assert_eq!(pool.size(), 24);

    pool.alloc(8);
    assert_eq!(pool.block_count(), 3);
    assert_eq!(pool.remaining(), 56);
  }

  #[test]
  fn test_set_minimum_growth_size() {
    let pool = Pool::new(32);
    pool.set_minimum_growth_size(512);
    pool.alloc(32);
    pool.alloc(16);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.remaining(), 512 - 16);
  }

  #[test]
  fn test_min_max_alloc() {
    let pool = Pool::new(128);

    let (_, granted) = pool.min_max_alloc(8, 64);
    assert_eq!(granted, 64);

    // 64 left: max does not fit, min does, so the remainder is granted.
    let (p, granted) = pool.min_max_alloc(16, 100);
    assert_eq!(granted, 64);
    assert_eq!(addr(p) % WORD, 0);
    assert_eq!(pool.remaining(), 0);
    assert_eq!(pool.block_count(), 1);

    // Nothing left: grows by max.
    let (_, granted) = pool.min_max_alloc(16, 100);
    assert_eq!(granted, 100);
    assert_eq!(pool.block_count(), 2);
  }

  #[test]
  fn test_zalloc_and_calloc() {
    let pool = Pool::new(64);
    let dirty = pool.alloc(64);
    unsafe { dirty.write_bytes(0xFF, 64) };

    let mut pool = pool;
    pool.clear();
    let zeroed = pool.zalloc(48);
    assert!(zeroed.iter().all(|&b| b == 0));

    let items = pool.calloc(4, 4);
    assert_eq!(items.len(), 16);
    assert!(items.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_clear_reuses_root() {
    let mut pool = Pool::new(128);
    let first = pool.alloc(16);
    pool.alloc(500);
    pool.alloc(500);
    assert_eq!(pool.block_count(), 3);

    pool.clear();
    assert_eq!(pool.block_count(), 1);
    assert_eq!(pool.size(), 128);
    assert_eq!(pool.allocated(), 0);
    assert_eq!(pool.used(), 128 + POOL_OVERHEAD + BLOCK_OVERHEAD);
    assert_eq!(pool.peak(), 1016);

    let again = pool.alloc(120);
    assert_eq!(again, first);
    assert_eq!(pool.block_count(), 1);
  }

  #[test]
  fn test_save_restore_rolls_back_growth() {
    let mut pool = Pool::new(64);
    pool.alloc(24);
    let marker = pool.save();
    let used = pool.used();

    let next = pool.alloc(8);
    pool.alloc(300);
    pool.alloc(300);
    assert_eq!(pool.block_count(), 3);

    pool.restore(marker);
    assert_eq!(pool.block_count(), 1);
    assert_eq!(pool.used(), used);
    assert_eq!(pool.allocated(), 24);
    assert_eq!(pool.alloc(8), next);

    // A marker can be restored more than once.
    pool.restore(marker);
    assert_eq!(pool.alloc(8), next);
  }

  #[test]
  fn test_restore_inside_growth_block() {
    let mut pool = Pool::new(32);
    pool.set_minimum_growth_size(256);
    pool.alloc(200);
    let marker = pool.save();
    let next = pool.alloc(16);
    pool.alloc(400);
    assert_eq!(pool.block_count(), 3);

    pool.restore(marker);
    assert_eq!(pool.block_count(), 2);
    assert_eq!(pool.alloc(16), next);
  }

  #[test]
  fn test_stale_markers_rejected() {
    let mut pool = Pool::new(32);
    pool.alloc(200);
    let marker = pool.save();
    pool.clear();
    assert_eq!(pool.try_restore(marker), Err(AllocError::StaleMarker));

    let other = Pool::new(32);
    assert_eq!(pool.try_restore(other.save()), Err(AllocError::StaleMarker));
  }

  #[test]
  fn test_nested_pool_carves_from_parent() {
    let parent = Pool::new(1024);
    {
      let mut child = Pool::nested(&parent, 100);
      assert!(child.is_nested());
      assert_eq!(parent.allocated(), align!(100));

      child.alloc(64);
      child.alloc(64);
      assert_eq!(child.block_count(), 2);
      assert_eq!(parent.allocated(), align!(100) + 104);

      child.clear();
      assert_eq!(child.block_count(), 1);
      // Nothing was handed back: the parent reclaims it in bulk.
      assert_eq!(parent.allocated(), align!(100) + 104);
    }
    assert_eq!(parent.block_count(), 1);
  }

  #[test]
  fn test_describe_reports_counters() {
    let pool = Pool::new(64);
    pool.alloc(10);

    let mut out = Vec::new();
    pool.stats().describe(&mut out, Location::caller(), 0).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with(&format!(
      " size: 10, max_size: 10, initial_size: 64 used: {} ",
      64 + POOL_OVERHEAD + BLOCK_OVERHEAD
    )));
  }

  proptest! {
    #[test]
    fn test_small_sequences_never_grow(ops in prop::collection::vec((any::<bool>(), 0usize..64), 0..32)) {
      let pool = Pool::new(4096);
      let used = pool.used();

      for &(aligned, len) in &ops {
        let p = if aligned { pool.alloc(len) } else { pool.ualloc(len) };
        if aligned {
          prop_assert_eq!(addr(p) % WORD, 0);
        }
      }

      prop_assert_eq!(pool.block_count(), 1);
      prop_assert_eq!(pool.allocated(), ops.iter().map(|&(_, len)| len).sum::<usize>());
      prop_assert_eq!(pool.used(), used);
      prop_assert!(pool.used() >= pool.size());
    }

    #[test]
    fn test_aligned_results_across_growth(sizes in prop::collection::vec(0usize..300, 1..64)) {
      let pool = Pool::new(128);
      for &len in &sizes {
        prop_assert_eq!(addr(pool.alloc(len)) % WORD, 0);
        pool.ualloc(len % 7);
      }
      prop_assert!(pool.used() >= pool.size());
    }

    #[test]
    fn test_restore_is_idempotent(before in 0usize..120, after in prop::collection::vec(1usize..400, 0..16)) {
      let mut pool = Pool::new(128);
      pool.alloc(before);
      let marker = pool.save();
      let blocks = pool.block_count();
      let used = pool.used();

      let probe = pool.alloc(1);
      for &len in &after {
        pool.alloc(len);
      }

      pool.restore(marker);
      prop_assert_eq!(pool.block_count(), blocks);
      prop_assert_eq!(pool.used(), used);
      prop_assert_eq!(pool.alloc(1), probe);
    }
  }
}
