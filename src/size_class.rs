//! Size classes of the [`BlockAllocator`](crate::BlockAllocator).
//!
//! Every class size is a multiple of [`NODE_FOOTPRINT`], the footprint of a
//! compact list node (a 16-bit tag plus one pointer). The table is fixed at
//! compile time and strictly increasing, so classification is a binary
//! search.
//!
//! ```text
//!  id:     0    1    2    3   ...   8    9   ...   42
//!        +----+----+----+----+-----+----+----+-----+-----------+
//!  size: | 0  | 10 | 20 | 30 | ... |120 |240 | ... | 167772160 |   (64-bit)
//!        +----+----+----+----+-----+----+----+-----+-----------+
//! ```

use std::mem;

use crate::error::{AllocError, fatal};

pub const NUM_CLASSES: usize = 43;

/// `size_of::<u16>() + size_of::<*const u8>()`: 10 bytes on 64-bit targets.
pub const NODE_FOOTPRINT: usize = mem::size_of::<u16>() + mem::size_of::<*const u8>();

#[rustfmt::skip]
const MULTIPLIERS: [usize; NUM_CLASSES] = [
  0, 1, 2, 3, 4, 5, 6, 7,
  12, 24, 32, 48, 64, 96, 128, 196,
  256, 512, 1024, 2048, 3072, 4096,
  12288, 16384, 24576, 32768, 49152, 65536, 98304,
  131072, 196608, 262144, 524288, 786432,
  1048576, 1572864, 2097152, 3145728, 4194304,
  6291456, 8388608, 12845056, 16777216,
];

/// Byte size of every class, indexed by class id.
pub const TABLE: [usize; NUM_CLASSES] = build_table();

pub const MAX_CLASS_SIZE: usize = TABLE[NUM_CLASSES - 1];

const fn build_table() -> [usize; NUM_CLASSES] {
  let mut table = [0; NUM_CLASSES];
  let mut i = 0;
  while i < NUM_CLASSES {
    table[i] = MULTIPLIERS[i] * NODE_FOOTPRINT;
    i += 1;
  }
  table
}

/// Smallest class whose size is at least `size`, or `None` above
/// [`MAX_CLASS_SIZE`].
pub fn try_classify(size: usize) -> Option<usize> {
  let id = TABLE.partition_point(|&class| class < size);
  (id < NUM_CLASSES).then_some(id)
}

/// Like [`try_classify`]; a size above [`MAX_CLASS_SIZE`] is fatal.
pub fn classify(size: usize) -> usize {
  match try_classify(size) {
    Some(id) => id,
    None => fatal(AllocError::SizeClassOverflow {
      size,
      max: MAX_CLASS_SIZE,
    }),
  }
}

/// Byte size of class `id`.
///
/// # Panics
///
/// If `id >= NUM_CLASSES`.
pub fn class_size(id: usize) -> usize {
  TABLE[id]
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;
  use crate::test_util::{is_test_child, run_aborting_child};

  #[test]
  fn test_table_is_strictly_increasing() {
    assert!(TABLE.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(TABLE[0], 0);
    assert_eq!(TABLE[1], NODE_FOOTPRINT);
    assert_eq!(MAX_CLASS_SIZE, 16_777_216 * NODE_FOOTPRINT);
  }

  #[cfg(target_pointer_width = "64")]
  #[test]
  fn test_table_values_64bit() {
    assert_eq!(NODE_FOOTPRINT, 10);
    assert_eq!(class_size(8), 120);
    assert_eq!(class_size(15), 1960);
    assert_eq!(class_size(42), 167_772_160);
  }

  #[test]
  fn test_classify() {
    assert_eq!(classify(0), 0);
    assert_eq!(classify(1), 1);
    assert_eq!(classify(NODE_FOOTPRINT), 1);
    assert_eq!(classify(NODE_FOOTPRINT + 1), 2);
    assert_eq!(classify(7 * NODE_FOOTPRINT + 1), 8);
    assert_eq!(classify(MAX_CLASS_SIZE), NUM_CLASSES - 1);
    assert_eq!(try_classify(MAX_CLASS_SIZE + 1), None);
  }

  #[test]
  fn test_oversized_class_aborts() {
    if is_test_child() {
      classify(usize::MAX);
      return;
    }
    let stderr = run_aborting_child("size_class::tests::test_oversized_class_aborts");
    assert!(stderr.contains("exceeds the largest size class"));
  }

  proptest! {
    #[test]
    fn test_classify_is_smallest_fit(size in 0..=MAX_CLASS_SIZE) {
      let id = classify(size);
      prop_assert!(TABLE[id] >= size);
      prop_assert!(id == 0 || TABLE[id - 1] < size);
    }
  }
}
