use std::{fmt, slice, str};

use crate::{
  error::{AllocError, fatal},
  pool::Pool,
};

fn check_ascii(byte: u8) {
  if !byte.is_ascii() {
    fatal(AllocError::NonAsciiDelimiter(byte));
  }
}

impl Pool<'_> {
  /// Splits a pool copy of `input` on `delim`, keeping empty tokens.
  ///
  /// Delimiters in the copy are overwritten with NUL, so every token is also
  /// NUL-terminated. `None` gives an empty slice, `Some("")` one empty token.
  ///
  /// ```
  /// let pool = rpool::Pool::new(64);
  /// assert_eq!(pool.split(b',', Some("a,,b")), ["a", "", "b"]);
  /// ```
  pub fn split(
    &self,
    delim: u8,
    input: Option<&str>,
  ) -> &[&str] {
    self.split_copy(delim, None, input, true)
  }

  /// Like [`Pool::split`] without the empty tokens.
  pub fn split2(
    &self,
    delim: u8,
    input: Option<&str>,
  ) -> &[&str] {
    self.split_copy(delim, None, input, false)
  }

  /// Like [`Pool::split`], where `escape` makes the byte after it literal.
  /// Escape bytes are removed from the tokens.
  pub fn split_with_escape(
    &self,
    delim: u8,
    escape: u8,
    input: Option<&str>,
  ) -> &[&str] {
    self.split_copy(delim, Some(escape), input, true)
  }

  pub fn split_with_escape2(
    &self,
    delim: u8,
    escape: u8,
    input: Option<&str>,
  ) -> &[&str] {
    self.split_copy(delim, Some(escape), input, false)
  }

  /// Formats `args` into the pool and splits the result in place.
  pub fn splitf(
    &self,
    delim: u8,
    args: fmt::Arguments<'_>,
  ) -> &[&str] {
    check_ascii(delim);
    let text = self.strdupf(args);
    self.tokenize(text.as_mut_ptr(), text.len(), delim, None, true)
  }

  pub fn split2f(
    &self,
    delim: u8,
    args: fmt::Arguments<'_>,
  ) -> &[&str] {
    check_ascii(delim);
    let text = self.strdupf(args);
    self.tokenize(text.as_mut_ptr(), text.len(), delim, None, false)
  }

  fn split_copy(
    &self,
    delim: u8,
    escape: Option<u8>,
    input: Option<&str>,
    keep_empty: bool,
  ) -> &[&str] {
    check_ascii(delim);
    if let Some(escape) = escape {
      check_ascii(escape);
    }
    let Some(input) = input else {
      return &[];
    };
    let copy = self.strdup(input);
    self.tokenize(copy.as_mut_ptr(), copy.len(), delim, escape, keep_empty)
  }

  /// Splits `len` bytes of pool memory at `base` in place.
  ///
  /// Escapes are compacted out while scanning, so tokens may end before the
  /// original delimiter position; the byte after each token is set to NUL.
  fn tokenize(
    &self,
    base: *mut u8,
    len: usize,
    delim: u8,
    escape: Option<u8>,
    keep_empty: bool,
  ) -> &[&str] {
    // SAFETY: `base..base + len` is a pool string owned by this call. Only
    // ASCII bytes are removed or replaced, so every token stays UTF-8.
    unsafe {
      let bytes = slice::from_raw_parts(base, len);
      let mut count = 1;
      let mut i = 0;
      while i < len {
        if Some(bytes[i]) == escape {
          i += 1;
        } else if bytes[i] == delim {
          count += 1;
        }
        i += 1;
      }

      let tokens = self.alloc_array::<&str>(count);
      let mut found = 0;
      let mut push = |start: usize, end: usize| {
        if keep_empty || end > start {
          let token = str::from_utf8_unchecked(slice::from_raw_parts(base.add(start), end - start));
          tokens.add(found).write(token);
          found += 1;
        }
      };

      let (mut read, mut write, mut start) = (0, 0, 0);
      while read < len {
        let byte = *base.add(read);
        if Some(byte) == escape {
          read += 1;
          if read < len {
            *base.add(write) = *base.add(read);
            write += 1;
            read += 1;
          }
        } else if byte == delim {
          *base.add(write) = 0;
          push(start, write);
          write += 1;
          read += 1;
          start = write;
        } else {
          *base.add(write) = byte;
          write += 1;
          read += 1;
        }
      }
      push(start, write);
      // The copy is followed by its own NUL, so `write == len` is fine.
      *base.add(write) = 0;

      slice::from_raw_parts(tokens, found)
    }
  }
}
