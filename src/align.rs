/// Native machine word size, the alignment of every "aligned" pool request.
pub const WORD: usize = core::mem::size_of::<usize>();

/// Rounds `value` up to the machine word size.
///
/// The caller guarantees that `value + WORD - 1` does not overflow, which
/// holds for every address inside a live block. Use [`align_up`] for sizes
/// coming from the outside.
///
/// # Examples
///
/// ```rust
/// use rpool::align;
///
/// match core::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::align::WORD - 1) & !($crate::align::WORD - 1)
  };
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Returns `None` on overflow.
///
/// ```rust
/// use rpool::align::align_up;
///
/// assert_eq!(align_up(17, 16), Some(32));
/// assert_eq!(align_up(32, 16), Some(32));
/// assert_eq!(align_up(usize::MAX, 8), None);
/// ```
#[inline]
pub const fn align_up(
  value: usize,
  alignment: usize,
) -> Option<usize> {
  debug_assert!(alignment.is_power_of_two());
  match value.checked_add(alignment - 1) {
    Some(bumped) => Some(bumped & !(alignment - 1)),
    None => None,
  }
}

/// Bytes needed to move `addr` forward to a multiple of `alignment`.
#[inline]
pub const fn padding_for(
  addr: usize,
  alignment: usize,
) -> usize {
  addr.wrapping_neg() & (alignment - 1)
}
