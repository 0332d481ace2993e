//! Raw system allocation, the bottom layer under every pool.
//!
//! With the `debug-alloc` feature each call goes through the process-wide
//! [`Tracker`](crate::tracker::Tracker) and is recorded under the caller's
//! source location. Without it the calls are thin wrappers over `malloc`,
//! `realloc` and `free` with no header. Allocation failure is fatal in both
//! modes.

use std::{panic::Location, ptr::NonNull, sync::Arc};

#[cfg(not(feature = "debug-alloc"))]
use crate::error::{AllocError, fatal};
use crate::tracker::Describe;

/// Allocates `len` uninitialized bytes, aligned for any primitive type.
#[track_caller]
pub fn alloc(len: usize) -> NonNull<u8> {
  alloc_at(Location::caller(), len, None)
}

/// Allocates `len` zeroed bytes.
#[track_caller]
pub fn zalloc(len: usize) -> NonNull<u8> {
  let ptr = alloc_at(Location::caller(), len, None);
  // SAFETY: `ptr` spans `len` freshly allocated bytes.
  unsafe { ptr.write_bytes(0, len) };
  ptr
}

/// Copies `data` into a fresh allocation.
#[track_caller]
pub fn dup(data: &[u8]) -> NonNull<u8> {
  let ptr = alloc_at(Location::caller(), data.len(), None);
  // SAFETY: fresh allocation of `data.len()` bytes.
  unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len()) };
  ptr
}

/// Allocation whose ledger entry is produced by `describe` when tracked.
#[track_caller]
pub fn alloc_described(
  len: usize,
  describe: Arc<dyn Describe>,
) -> NonNull<u8> {
  alloc_at(Location::caller(), len, Some(describe))
}

#[cfg(feature = "debug-alloc")]
fn alloc_at(
  caller: &'static Location<'static>,
  len: usize,
  describe: Option<Arc<dyn Describe>>,
) -> NonNull<u8> {
  crate::tracker::init().alloc_at(caller, len, describe)
}

#[cfg(not(feature = "debug-alloc"))]
fn alloc_at(
  caller: &'static Location<'static>,
  len: usize,
  _describe: Option<Arc<dyn Describe>>,
) -> NonNull<u8> {
  // `malloc(0)` may return null; ask for at least one byte.
  // SAFETY: plain system allocation, checked for null below.
  let ptr = unsafe { libc::malloc(len.max(1)) }.cast::<u8>();
  match NonNull::new(ptr) {
    Some(ptr) => ptr,
    None => {
      eprint!("{caller}: {len} ");
      fatal(AllocError::OutOfMemory { size: len })
    },
  }
}

/// Resizes an allocation made by this module. Null behaves like [`alloc`].
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this module; it is invalidated.
#[track_caller]
pub unsafe fn realloc(
  ptr: *mut u8,
  len: usize,
) -> NonNull<u8> {
  #[cfg(feature = "debug-alloc")]
  {
    unsafe { crate::tracker::init().realloc(ptr, len) }
  }

  #[cfg(not(feature = "debug-alloc"))]
  {
    if ptr.is_null() {
      return alloc(len);
    }
    // SAFETY: forwarded caller contract.
    let fresh = unsafe { libc::realloc(ptr.cast(), len.max(1)) }.cast::<u8>();
    match NonNull::new(fresh) {
      Some(fresh) => fresh,
      None => fatal(AllocError::OutOfMemory { size: len }),
    }
  }
}

/// Releases an allocation made by this module. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live pointer from this module, not used afterwards.
#[track_caller]
pub unsafe fn free(ptr: *mut u8) {
  #[cfg(feature = "debug-alloc")]
  {
    unsafe { crate::tracker::init().free(ptr) }
  }

  #[cfg(not(feature = "debug-alloc"))]
  {
    // SAFETY: forwarded caller contract; `free(NULL)` is a no-op.
    unsafe { libc::free(ptr.cast()) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_alloc_is_aligned_and_writable() {
    let ptr = alloc(64);
    assert_eq!(ptr.as_ptr().addr() % crate::align::WORD, 0);
    unsafe {
      ptr.write_bytes(0xAB, 64);
      assert_eq!(*ptr.as_ptr().add(63), 0xAB);
      free(ptr.as_ptr());
    }
  }

  #[test]
  fn test_zalloc_dup_realloc() {
    let zeroed = zalloc(32);
    let copy = dup(b"abcdef");
    unsafe {
      assert!(std::slice::from_raw_parts(zeroed.as_ptr(), 32).iter().all(|&b| b == 0));
      let grown = realloc(copy.as_ptr(), 128);
      assert_eq!(std::slice::from_raw_parts(grown.as_ptr(), 6), b"abcdef");
      free(grown.as_ptr());
      free(zeroed.as_ptr());
      free(std::ptr::null_mut());
    }
  }

  #[cfg(feature = "debug-alloc")]
  #[test]
  fn test_allocations_are_tracked() {
    let tracker = crate::tracker::init();
    let ptr = alloc(48);
    assert_eq!(tracker.nearest(ptr.as_ptr()).map(|n| n.distance), Some(0));
    unsafe { free(ptr.as_ptr()) };
  }
}
