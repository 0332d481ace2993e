use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Failures of the pool, the block allocator and raw system allocation.
///
/// Most of these are fatal when they surface from an allocation path; the
/// `try_*` constructors hand them back instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
  #[error("pool initial size must be non-zero")]
  ZeroInitialSize,

  #[error("pool minimum growth size must be non-zero")]
  ZeroGrowthSize,

  #[error("system allocation of {size} byte(s) failed")]
  OutOfMemory { size: usize },

  #[error("allocation size overflows usize")]
  SizeOverflow,

  #[error("size {size} exceeds the largest size class ({max} bytes)")]
  SizeClassOverflow { size: usize, max: usize },

  #[error("formatting into the pool failed")]
  Format,

  #[error("marker was not taken on this pool or was invalidated by clear")]
  StaleMarker,

  #[error("split delimiter and escape must be ASCII, got {0:#04x}")]
  NonAsciiDelimiter(u8),
}

#[derive(Debug, Error)]
pub enum TrackerError {
  #[error("allocation logging already writes to {}", .0.display())]
  LoggingActive(PathBuf),

  #[error("failed to spawn the snapshot thread")]
  Spawn(#[source] io::Error),

  #[error("failed to write allocation snapshot to {}", path.display())]
  Snapshot {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to load tracker configuration")]
  Load(#[from] Box<figment::Error>),

  #[error("invalid tracker configuration: {0}")]
  Invalid(String),
}

/// Reports an unrecoverable allocator failure and aborts the process.
///
/// Continuing after one of these would mean running on top of a corrupt or
/// exhausted memory layer.
#[cold]
#[inline(never)]
pub fn fatal(err: impl fmt::Display) -> ! {
  tracing::error!(%err, "fatal allocator error");
  eprintln!("{err}");
  std::process::abort()
}
