//! # rpool - Arena Pools, Size-Class Blocks and an Allocation Tracker
//!
//! This crate provides a **pool allocator** (an arena) that serves many small
//! allocations out of a few large blocks and releases them all at once, a
//! **block allocator** that recycles fixed-size blocks on top of a pool, and a
//! **debug tracker** that records every system allocation for leak and
//! bad-free diagnostics.
//!
//! ## Overview
//!
//! A pool bumps a cursor through its current block. When a request does not
//! fit, a new block is chained and becomes current:
//!
//! ```text
//!   Pool:
//!
//!   blocks[0] (root, initial_size)
//!   ┌─────┬─────┬──────────┬────────┐
//!   │ A1  │ A2  │    A3    │ wasted │ ── tail added to size()
//!   └─────┴─────┴──────────┴────────┘
//!
//!   blocks[1] (max(request, minimum_growth_size))
//!   ┌──────────┬─────┬─────────────────────────┐
//!   │    A4    │ A5  │       Free Space        │
//!   └──────────┴─────┴─────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!                 cursor                      end
//!
//!   clear():   blocks[1..] released, cursor back to blocks[0]
//!   restore(): blocks after the marker released, cursor back to the marker
//! ```
//!
//! A nested pool takes its blocks from a parent pool instead of the system,
//! so clearing the parent reclaims everything the child ever used.
//!
//! ## Crate Structure
//!
//! ```text
//!   rpool
//!   ├── align           - Word alignment (align!, align_up)
//!   ├── block           - Block bounds of a pool (internal)
//!   ├── pool            - Pool, Marker, PoolStats
//!   ├── strings         - dup/strdup/strdupf helpers on Pool (internal)
//!   ├── split           - in-place tokenizers on Pool (internal)
//!   ├── size_class      - the 43 block sizes
//!   ├── block_allocator - BlockAllocator free lists
//!   ├── sys             - system allocation, tracked under `debug-alloc`
//!   ├── tracker         - Tracker ledger, diagnostics, snapshot thread
//!   ├── config          - TrackerConfig (figment)
//!   └── error           - AllocError, TrackerError, ConfigError, fatal
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rpool::{BlockAllocator, Pool};
//!
//! let mut pool = Pool::new(1024);
//!
//! let greeting = pool.strdup("Hello, World!");
//! assert_eq!(greeting, "Hello, World!");
//!
//! let fields = pool.split(b',', Some("a,,b"));
//! assert_eq!(fields, ["a", "", "b"]);
//!
//! {
//!   let blocks = BlockAllocator::new(&pool);
//!   let block = blocks.alloc(100).unwrap();
//!   unsafe { blocks.release(block.as_ptr(), 100) };
//!   assert_eq!(blocks.alloc(100), Some(block));
//! }
//!
//! pool.clear();
//! assert_eq!(pool.size(), 1024);
//! ```
//!
//! ## Debug Tracking
//!
//! With the `debug-alloc` feature every block a pool obtains from the system
//! goes through the global [`Tracker`]:
//!
//! ```text
//!   Tracked Allocation:
//!   ┌───────────────────────┬────────────────────────────────┐
//!   │    Header             │         User Data              │
//!   │  ┌─────────────────┐  │                                │
//!   │  │ caller: file:ln │  │  ┌──────────────────────────┐  │
//!   │  │ length: N       │  │  │                          │  │
//!   │  │ owner: tracker  │  │  │     N bytes usable       │  │
//!   │  │ seq             │  │  │                          │  │
//!   │  └─────────────────┘  │  └──────────────────────────┘  │
//!   └───────────────────────┴────────────────────────────────┘
//!                           ▲
//!                           └── Pointer returned to user
//! ```
//!
//! Freeing a pointer the tracker does not know reports the closest live
//! allocation and aborts. Snapshots of the live set can be written to a file
//! periodically with [`tracker::enable_logging`].
//!
//! ## Limitations
//!
//! - **Single-threaded pools**: `Pool` and `BlockAllocator` are neither
//!   `Send` nor `Sync`; use one per thread
//! - **No individual frees**: pool memory only comes back in bulk
//! - **Fatal errors abort**: out of memory, zero sizes and stale markers end
//!   the process; use the `try_*` constructors where recovery makes sense

pub mod align;
mod block;
pub mod block_allocator;
pub mod config;
pub mod error;
pub mod pool;
pub mod size_class;
mod split;
mod strings;
pub mod sys;
pub mod tracker;

#[cfg(test)]
mod test_util;

pub use block_allocator::BlockAllocator;
pub use config::TrackerConfig;
pub use error::{AllocError, ConfigError, TrackerError};
pub use pool::{Marker, Pool, PoolStats};
pub use tracker::{Describe, LedgerStats, NearestAllocation, Tracker};
