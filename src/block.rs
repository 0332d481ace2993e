use std::ptr::NonNull;

/// One contiguous extent owned by a pool.
///
/// A block knows nothing about its neighbours: the pool keeps its blocks in
/// an indexable list where the previous block of `i` is `i - 1`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block {
  pub start: NonNull<u8>,
  pub capacity: usize,
}

impl Block {
  pub fn new(
    start: NonNull<u8>,
    capacity: usize,
  ) -> Self {
    Self { start, capacity }
  }

  #[inline]
  pub fn end(&self) -> *mut u8 {
    // SAFETY: `capacity` bytes starting at `start` belong to this block.
    unsafe { self.start.as_ptr().add(self.capacity) }
  }

  /// Whether `ptr` lies within `[start, end]`. The end address itself counts
  /// because a full block leaves its cursor there.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    let addr = ptr.addr();
    let start = self.start.as_ptr().addr();
    addr >= start && addr <= start + self.capacity
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_block_bounds() {
    let mut storage = [0u8; 32];
    let start = NonNull::new(storage.as_mut_ptr()).unwrap();
    let block = Block::new(start, storage.len());

    assert_eq!(block.end().addr() - start.as_ptr().addr(), 32);
    assert!(block.contains(start.as_ptr()));
    assert!(block.contains(block.end()));
    assert!(!block.contains(block.end().wrapping_add(1)));
  }
}
