//! Debug allocation tracker.
//!
//! Every tracked allocation carries a [`Header`](record::Header) right before
//! the pointer handed out, and is linked into a ledger guarded by one mutex.
//! The ledger answers three questions:
//!
//! - what is still alive (leaks), via [`Tracker::dump`] and periodic snapshots
//!   written by a background thread once [`Tracker::enable_logging`] is called;
//! - whether a pointer handed to [`Tracker::free`] or [`Tracker::realloc`] is
//!   ours at all. When it is not, the tracker reports the nearest live
//!   allocation and aborts;
//! - how many bytes are outstanding, via [`Tracker::stats`].
//!
//! A [`Tracker`] is an ordinary value. The process-wide instance used by the
//! `debug-alloc` feature lives behind [`init`], [`global`] and [`destroy`].

mod ledger;
mod persist;
mod record;

use std::{
  fmt, io, mem,
  panic::Location,
  path::PathBuf,
  ptr::{self, NonNull},
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  thread::JoinHandle,
  time::Duration,
};

use parking_lot::{Condvar, Mutex, const_mutex};
use tracing::{info, warn};

pub use ledger::{LedgerStats, NearestAllocation};
pub use record::Describe;
pub(crate) use record::HEADER_SIZE;

use self::{
  ledger::Ledger,
  record::{Header, Record, RecordPtr},
};
use crate::{
  config::TrackerConfig,
  error::{AllocError, TrackerError, fatal},
};

/// Period between two ledger snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

/// Tracker ids start at 1 so that a zeroed owner tag never matches.
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

static GLOBAL: Mutex<Option<Tracker>> = const_mutex(None);

pub(crate) struct Shared {
  id: usize,
  pub(crate) ledger: Mutex<Ledger>,
  pub(crate) wake: Condvar,
  worker: Mutex<Option<Worker>>,
}

struct Worker {
  path: PathBuf,
  handle: JoinHandle<()>,
}

/// Handle to one allocation ledger. Clones share the ledger.
#[derive(Clone)]
pub struct Tracker {
  shared: Arc<Shared>,
}

impl Default for Tracker {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Tracker {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Tracker")
      .field("id", &self.shared.id)
      .field("stats", &self.stats())
      .field("log_path", &self.log_path())
      .finish()
  }
}

impl Tracker {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(Shared {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        ledger: Mutex::new(Ledger::new()),
        wake: Condvar::new(),
        worker: Mutex::new(None),
      }),
    }
  }

  /// Allocates `len` uninitialized bytes, recorded under the caller's location.
  #[track_caller]
  pub fn alloc(
    &self,
    len: usize,
  ) -> NonNull<u8> {
    self.alloc_at(Location::caller(), len, None)
  }

  #[track_caller]
  pub fn zalloc(
    &self,
    len: usize,
  ) -> NonNull<u8> {
    let payload = self.alloc_at(Location::caller(), len, None);
    // SAFETY: `payload` spans `len` freshly allocated bytes.
    unsafe { payload.write_bytes(0, len) };
    payload
  }

  /// Allocates a self-describing block: dumps call `describe` instead of
  /// printing the byte length.
  #[track_caller]
  pub fn alloc_described(
    &self,
    len: usize,
    describe: Arc<dyn Describe>,
  ) -> NonNull<u8> {
    self.alloc_at(Location::caller(), len, Some(describe))
  }

  #[track_caller]
  pub fn dup(
    &self,
    data: &[u8],
  ) -> NonNull<u8> {
    let payload = self.alloc_at(Location::caller(), data.len(), None);
    // SAFETY: fresh allocation of `data.len()` bytes.
    unsafe { ptr::copy_nonoverlapping(data.as_ptr(), payload.as_ptr(), data.len()) };
    payload
  }

  /// Copies `s` followed by a NUL byte.
  #[track_caller]
  pub fn strdup(
    &self,
    s: &str,
  ) -> NonNull<u8> {
    let payload = self.alloc_at(Location::caller(), s.len() + 1, None);
    // SAFETY: fresh allocation of `s.len() + 1` bytes.
    unsafe {
      ptr::copy_nonoverlapping(s.as_ptr(), payload.as_ptr(), s.len());
      payload.add(s.len()).write(0);
    }
    payload
  }

  /// Formats `args` into a NUL-terminated tracked allocation.
  #[track_caller]
  pub fn strdupf(
    &self,
    args: fmt::Arguments<'_>,
  ) -> NonNull<u8> {
    let caller = Location::caller();
    let mut text = String::new();
    if fmt::write(&mut text, args).is_err() {
      fatal(AllocError::Format);
    }
    let payload = self.alloc_at(caller, text.len() + 1, None);
    // SAFETY: fresh allocation of `text.len() + 1` bytes.
    unsafe {
      ptr::copy_nonoverlapping(text.as_ptr(), payload.as_ptr(), text.len());
      payload.add(text.len()).write(0);
    }
    payload
  }

  pub fn alloc_at(
    &self,
    caller: &'static Location<'static>,
    len: usize,
    describe: Option<Arc<dyn Describe>>,
  ) -> NonNull<u8> {
    let Some(total) = HEADER_SIZE.checked_add(len) else {
      fatal(AllocError::SizeOverflow)
    };
    let Ok(mut length) = isize::try_from(len) else {
      fatal(AllocError::SizeOverflow)
    };
    if describe.is_some() {
      length = -length;
    }

    // `malloc` only guarantees 8 bytes on 32-bit targets; ask for the
    // header's alignment explicitly.
    let mut raw = ptr::null_mut();
    // SAFETY: the alignment is a power of two and a multiple of the pointer
    // size; the result is checked below.
    let status = unsafe { libc::posix_memalign(&mut raw, mem::align_of::<Header>(), total) };
    let base = if status == 0 { raw.cast::<Header>() } else { ptr::null_mut() };
    let Some(base) = NonNull::new(base) else {
      let _ledger = self.shared.ledger.lock();
      eprint!("{caller}: {length} ");
      fatal(AllocError::OutOfMemory { size: total })
    };

    // SAFETY: `base` is a fresh allocation large enough for the header and
    // aligned for it.
    let ptr = unsafe {
      base.write(Header {
        caller,
        length,
        owner: self.shared.id,
        seq: 0,
      });
      RecordPtr::from_payload(base.cast::<u8>().add(HEADER_SIZE))
    };
    let payload = ptr.payload();

    self.shared.ledger.lock().insert(Record { ptr, describe });
    payload
  }

  /// Releases a tracked allocation. Null is a no-op.
  ///
  /// A pointer the ledger does not know (freed twice, foreign, or offset into
  /// an allocation) aborts the process after printing the closest live
  /// allocation.
  ///
  /// # Safety
  ///
  /// No reference into the allocation may be used afterwards.
  #[track_caller]
  pub unsafe fn free(
    &self,
    ptr: *mut u8,
  ) {
    unsafe { self.free_at(Location::caller(), ptr) }
  }

  /// # Safety
  ///
  /// See [`Tracker::free`].
  pub unsafe fn free_at(
    &self,
    caller: &'static Location<'static>,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    let record = {
      let mut ledger = self.shared.ledger.lock();
      match ledger.remove(ptr.addr(), self.shared.id) {
        Some(record) => record,
        None => invalid(&ledger, caller, ptr, "free is invalid (double free?)"),
      }
    };

    let mut rp = record.ptr;
    rp.header_mut().owner = 0;
    // SAFETY: the record was removed from the ledger, nobody else refers to
    // its header, and `base` came from `libc::posix_memalign`.
    unsafe { libc::free(rp.base().as_ptr().cast()) };
  }

  /// Resizes a tracked allocation by copying into a fresh one.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live allocation of this tracker; it is released.
  #[track_caller]
  pub unsafe fn realloc(
    &self,
    ptr: *mut u8,
    len: usize,
  ) -> NonNull<u8> {
    let caller = Location::caller();
    if ptr.is_null() {
      return self.alloc_at(caller, len, None);
    }

    let (old_len, describe) = {
      let ledger = self.shared.ledger.lock();
      match ledger.lookup(ptr.addr(), self.shared.id) {
        Some(record) => (record.ptr.header().byte_len(), record.describe.clone()),
        None => invalid(&ledger, caller, ptr, "realloc is invalid (p is not allocated?)"),
      }
    };

    // A self-describing allocation stays self-describing.
    let fresh = self.alloc_at(caller, len, describe);
    // SAFETY: both regions are live, distinct allocations of at least the
    // copied length.
    unsafe {
      ptr::copy_nonoverlapping(ptr, fresh.as_ptr(), old_len.min(len));
      self.free_at(caller, ptr);
    }
    fresh
  }

  pub fn stats(&self) -> LedgerStats {
    self.shared.ledger.lock().stats()
  }

  /// Writes the summary line and every live record.
  pub fn dump(
    &self,
    out: &mut dyn io::Write,
  ) -> io::Result<()> {
    self.shared.ledger.lock().dump(out)
  }

  /// The live allocation whose payload starts closest to `ptr`.
  pub fn nearest(
    &self,
    ptr: *const u8,
  ) -> Option<NearestAllocation> {
    self.shared.ledger.lock().nearest(ptr.addr()).map(|(_, nearest)| nearest)
  }

  /// Starts the snapshot thread with the default 60 second period.
  pub fn enable_logging(
    &self,
    path: impl Into<PathBuf>,
  ) -> Result<(), TrackerError> {
    self.enable_logging_every(path, DEFAULT_SNAPSHOT_INTERVAL)
  }

  /// Starts the snapshot thread. The first snapshot is written immediately.
  pub fn enable_logging_every(
    &self,
    path: impl Into<PathBuf>,
    interval: Duration,
  ) -> Result<(), TrackerError> {
    let path = path.into();
    let mut worker = self.shared.worker.lock();
    if let Some(active) = worker.as_ref() {
      return Err(TrackerError::LoggingActive(active.path.clone()));
    }

    self.shared.ledger.lock().shutdown = false;
    let handle = persist::spawn(Arc::clone(&self.shared), path.clone(), interval)?;
    info!(path = %path.display(), ?interval, "allocation logging enabled");
    *worker = Some(Worker { path, handle });
    Ok(())
  }

  pub fn log_path(&self) -> Option<PathBuf> {
    self.shared.worker.lock().as_ref().map(|worker| worker.path.clone())
  }

  /// Stops the snapshot thread and waits for it, or, when logging was never
  /// enabled, reports live allocations on stderr.
  pub fn shutdown(&self) {
    let worker = self.shared.worker.lock().take();

    match worker {
      Some(worker) => {
        self.shared.ledger.lock().shutdown = true;
        self.shared.wake.notify_all();
        if worker.handle.join().is_err() {
          warn!(path = %worker.path.display(), "snapshot thread panicked");
        }
        info!(path = %worker.path.display(), "allocation logging stopped");
      },
      None => {
        let ledger = self.shared.ledger.lock();
        if !ledger.is_empty() {
          let _ = ledger.dump(&mut io::stderr().lock());
        }
      },
    }
  }
}

/// Reports an unrecognized pointer together with the closest live
/// allocation, then aborts.
fn invalid(
  ledger: &Ledger,
  caller: &'static Location<'static>,
  ptr: *const u8,
  message: &str,
) -> ! {
  let mut err = io::stderr().lock();
  if let Some((record, nearest)) = ledger.nearest(ptr.addr()) {
    let _ = record.write_to(&mut err);
    let _ = io::Write::write_fmt(
      &mut err,
      format_args!(
        "is closest allocation and is {} bytes {} of original allocation\n",
        nearest.distance,
        if nearest.ahead { "ahead" } else { "behind" }
      ),
    );
  }
  drop(err);
  fatal(format_args!("{caller}: 0 {message}"))
}

/// Initializes the process-wide tracker. Calling it again returns the
/// existing one.
pub fn init() -> Tracker {
  GLOBAL.lock().get_or_insert_with(Tracker::new).clone()
}

pub fn global() -> Option<Tracker> {
  GLOBAL.lock().clone()
}

/// [`init`], then start snapshots when `config` names a log file.
pub fn init_with(config: &TrackerConfig) -> Result<Tracker, TrackerError> {
  let tracker = init();
  if let Some(path) = &config.log_path {
    if tracker.log_path().is_none() {
      tracker.enable_logging_every(path, config.snapshot_interval())?;
    }
  }
  Ok(tracker)
}

/// Enables snapshots on the process-wide tracker.
pub fn enable_logging(path: impl Into<PathBuf>) -> Result<(), TrackerError> {
  init().enable_logging(path)
}

/// Tears down the process-wide tracker: the snapshot thread is stopped and
/// joined, or the ledger is dumped to stderr when logging never started.
pub fn destroy() {
  let tracker = GLOBAL.lock().take();
  if let Some(tracker) = tracker {
    tracker.shutdown();
  }
}
