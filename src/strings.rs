use std::{alloc::Layout, fmt, ptr, slice, str};

use crate::{
  error::{AllocError, fatal},
  pool::Pool,
};

/// Formats straight into a raw buffer and keeps counting once it is full,
/// so a failed attempt still reports the length it needed.
struct TailWriter {
  buf: *mut u8,
  cap: usize,
  len: usize,
}

impl TailWriter {
  fn fits(&self) -> bool {
    self.len <= self.cap
  }
}

impl fmt::Write for TailWriter {
  fn write_str(
    &mut self,
    s: &str,
  ) -> fmt::Result {
    let end = self.len.checked_add(s.len()).ok_or(fmt::Error)?;
    if end <= self.cap {
      // SAFETY: `buf[len..end]` is inside the reserved capacity.
      unsafe { ptr::copy_nonoverlapping(s.as_ptr(), self.buf.add(self.len), s.len()) };
    }
    self.len = end;
    Ok(())
  }
}

/// Largest char boundary of `s` not above `max`.
fn floor_char_boundary(
  s: &str,
  max: usize,
) -> usize {
  let mut end = max.min(s.len());
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  end
}

impl Pool<'_> {
  /// Copies `data` into word-aligned pool memory.
  #[allow(clippy::mut_from_ref)]
  pub fn dup(
    &self,
    data: &[u8],
  ) -> &mut [u8] {
    let ptr = self.alloc(data.len());
    // SAFETY: fresh pool memory of `data.len()` bytes.
    unsafe {
      ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len());
      slice::from_raw_parts_mut(ptr.as_ptr(), data.len())
    }
  }

  /// Copies `data` into unaligned pool memory followed by one NUL byte. The
  /// returned slice excludes the NUL.
  #[allow(clippy::mut_from_ref)]
  pub fn udup(
    &self,
    data: &[u8],
  ) -> &mut [u8] {
    let Some(len) = data.len().checked_add(1) else {
      fatal(AllocError::SizeOverflow)
    };
    let ptr = self.ualloc(len);
    // SAFETY: fresh pool memory of `data.len() + 1` bytes.
    unsafe {
      ptr::copy_nonoverlapping(data.as_ptr(), ptr.as_ptr(), data.len());
      ptr.as_ptr().add(data.len()).write(0);
      slice::from_raw_parts_mut(ptr.as_ptr(), data.len())
    }
  }

  /// NUL-terminated pool copy of `s`.
  #[allow(clippy::mut_from_ref)]
  pub fn strdup(
    &self,
    s: &str,
  ) -> &mut str {
    let bytes = self.udup(s.as_bytes());
    // SAFETY: byte-for-byte copy of a `str`.
    unsafe { str::from_utf8_unchecked_mut(bytes) }
  }

  /// Like [`Pool::strdup`], keeping at most `max` bytes of `s` without
  /// splitting a character.
  #[allow(clippy::mut_from_ref)]
  pub fn strndup(
    &self,
    s: &str,
    max: usize,
  ) -> &mut str {
    self.strdup(&s[..floor_char_boundary(s, max)])
  }

  /// Formats `args` into the pool, NUL-terminated. See [`pool_format!`].
  ///
  /// The text is written straight into the free space of the current block.
  /// Only if it does not fit is an exact `len + 1` byte region reserved and
  /// the arguments formatted a second time.
  #[allow(clippy::mut_from_ref)]
  pub fn strdupf(
    &self,
    args: fmt::Arguments<'_>,
  ) -> &mut str {
    let start = self.cursor();
    let end = self.current_end();

    // Formatting may run arbitrary `Display` code that allocates from this
    // pool, so the tail is claimed for the duration.
    // SAFETY: `end` is the end of the current block.
    unsafe { self.set_cursor(end) };
    let available = end.addr() - start.addr();
    let mut tail = TailWriter {
      buf: start,
      cap: available.saturating_sub(1),
      len: 0,
    };
    if fmt::write(&mut tail, args).is_err() {
      fatal(AllocError::Format);
    }

    let same_block = self.current_end() == end;
    // The NUL needs a byte too, so an exhausted block never fits.
    if same_block && available > 0 && tail.fits() {
      // SAFETY: `len + 1 <= end - start`, inside the current block.
      unsafe {
        start.add(tail.len).write(0);
        self.set_cursor(start.add(tail.len + 1));
        self.record(tail.len + 1);
        return str::from_utf8_unchecked_mut(slice::from_raw_parts_mut(start, tail.len));
      }
    }
    if same_block {
      // SAFETY: rewinding to where the cursor was before formatting.
      unsafe { self.set_cursor(start) };
    } else {
      // The block grew under us while its tail was claimed.
      self.add_wasted(available);
    }

    let len = tail.len;
    let Some(size) = len.checked_add(1) else {
      fatal(AllocError::SizeOverflow)
    };
    let buf = self.ualloc(size).as_ptr();
    let mut exact = TailWriter { buf, cap: len, len: 0 };
    if fmt::write(&mut exact, args).is_err() || exact.len != len {
      fatal(AllocError::Format);
    }
    // SAFETY: `size` bytes reserved above; the text filled the first `len`.
    unsafe {
      buf.add(len).write(0);
      str::from_utf8_unchecked_mut(slice::from_raw_parts_mut(buf, len))
    }
  }

  /// Copies every string and the slice of references into the pool.
  #[allow(clippy::mut_from_ref)]
  pub fn strdup_all(
    &self,
    strings: &[&str],
  ) -> &mut [&str] {
    let copies = self.alloc_array::<&str>(strings.len());
    for (i, s) in strings.iter().enumerate() {
      let copy: &str = self.strdup(s);
      // SAFETY: `i < strings.len()`, the array length.
      unsafe { copies.add(i).write(copy) };
    }
    // SAFETY: every slot was initialized above.
    unsafe { slice::from_raw_parts_mut(copies, strings.len()) }
  }

  /// Copies `items` into the pool. The elements themselves are not deep
  /// copied.
  #[allow(clippy::mut_from_ref)]
  pub fn dup_slice<T: Copy>(
    &self,
    items: &[T],
  ) -> &mut [T] {
    let copy = self.alloc_array::<T>(items.len());
    // SAFETY: room for `items.len()` values of `T`, aligned for `T`.
    unsafe {
      ptr::copy_nonoverlapping(items.as_ptr(), copy, items.len());
      slice::from_raw_parts_mut(copy, items.len())
    }
  }

  pub(crate) fn alloc_array<T>(
    &self,
    count: usize,
  ) -> *mut T {
    match Layout::array::<T>(count) {
      Ok(layout) => self.alloc_layout(layout).as_ptr().cast(),
      Err(_) => fatal(AllocError::SizeOverflow),
    }
  }
}

/// Formats into a [`Pool`], returning a NUL-terminated `&mut str`.
///
/// ```
/// let pool = rpool::Pool::new(64);
/// let s = rpool::pool_format!(pool, "{}-{}", "a", 1);
/// assert_eq!(s, "a-1");
/// ```
#[macro_export]
macro_rules! pool_format {
  ($pool:expr, $($arg:tt)*) => {
    $pool.strdupf(::std::format_args!($($arg)*))
  };
}
