use std::{cell::Cell, mem, ptr::NonNull};

use tracing::trace;

use crate::{
  pool::Pool,
  size_class::{NUM_CLASSES, class_size, classify},
};

/// Overlay written into a released block to link it into its free list.
#[derive(Clone, Copy)]
struct FreeNode {
  next: Option<NonNull<FreeNode>>,
}

/// Recycles fixed-size blocks carved from a [`Pool`].
///
/// Requests are rounded up to one of the [`size_class`](crate::size_class)
/// sizes. A released block goes onto the free list of its class and is
/// handed out again before any new pool memory is used. Nothing is ever
/// returned to the pool; the allocator's footprint only grows until the pool
/// itself is cleared or dropped.
///
/// ```text
///  free[2] --> [ block ] --> [ block ] --> None
///  free[9] --> [ block ] --> None
/// ```
#[derive(Debug)]
pub struct BlockAllocator<'a> {
  pool: &'a Pool<'a>,
  free: [Cell<Option<NonNull<u8>>>; NUM_CLASSES],
}

impl<'a> BlockAllocator<'a> {
  pub fn new(pool: &'a Pool<'a>) -> Self {
    Self {
      pool,
      free: std::array::from_fn(|_| Cell::new(None)),
    }
  }

  /// Returns a block of class `id`, reusing a released one when available.
  ///
  /// # Panics
  ///
  /// If `id >= NUM_CLASSES`.
  pub fn alloc_by_id(
    &self,
    id: usize,
  ) -> NonNull<u8> {
    let head = &self.free[id];
    if let Some(block) = head.get() {
      // SAFETY: blocks on a free list hold a node written by `release`.
      let node = unsafe { block.cast::<FreeNode>().as_ptr().read_unaligned() };
      head.set(node.next.map(NonNull::cast));
      return block;
    }

    let size = class_size(id).max(mem::size_of::<FreeNode>());
    trace!(id, size, "fresh block");
    self.pool.alloc(size)
  }

  /// Returns a block of at least `size` bytes, or `None` for zero. A size
  /// above the largest class is fatal.
  pub fn alloc(
    &self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }
    Some(self.alloc_by_id(classify(size)))
  }

  /// Puts a block back on the free list of the class of `size`. Null is a
  /// no-op.
  ///
  /// # Safety
  ///
  /// A non-null `ptr` must come from this allocator for a request of `size`
  /// bytes, must not be in use afterwards and must not be released twice.
  pub unsafe fn release(
    &self,
    ptr: *mut u8,
    size: usize,
  ) {
    let Some(block) = NonNull::new(ptr) else {
      return;
    };
    let head = &self.free[classify(size)];
    let node = FreeNode {
      next: head.get().map(NonNull::cast),
    };
    // SAFETY: every block is at least `size_of::<FreeNode>()` bytes.
    unsafe { block.cast::<FreeNode>().as_ptr().write_unaligned(node) };
    head.set(Some(block));
  }

  /// Number of released blocks waiting in class `id`.
  pub fn free_count(
    &self,
    id: usize,
  ) -> usize {
    let mut count = 0;
    let mut cursor = self.free[id].get();
    while let Some(block) = cursor {
      count += 1;
      // SAFETY: see `alloc_by_id`.
      cursor = unsafe { block.cast::<FreeNode>().as_ptr().read_unaligned() }
        .next
        .map(NonNull::cast);
    }
    count
  }

  pub fn pool(&self) -> &'a Pool<'a> {
    self.pool
  }
}
