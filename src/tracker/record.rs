use std::{io, mem, panic::Location, ptr::NonNull, sync::Arc};

/// Custom diagnostic text for a self-describing allocation.
///
/// Objects that know more about themselves than their byte length (a pool
/// reporting its fill level, for instance) register a describer when they
/// allocate; ledger dumps call it instead of printing the raw length.
pub trait Describe: Send + Sync {
  fn describe(
    &self,
    out: &mut dyn io::Write,
    caller: &'static Location<'static>,
    length: usize,
  ) -> io::Result<()>;
}

/// Header stored immediately before every tracked payload.
///
/// Allocated with this alignment, so payloads are 16-byte aligned on every
/// target.
#[repr(C, align(16))]
pub(crate) struct Header {
  pub caller: &'static Location<'static>,
  /// Negative for self-describing allocations.
  pub length: isize,
  /// Id of the owning tracker, zeroed on free.
  pub owner: usize,
  pub seq: u64,
}

pub(crate) const HEADER_SIZE: usize = mem::size_of::<Header>();

impl Header {
  pub fn byte_len(&self) -> usize {
    self.length.unsigned_abs()
  }
}

/// A live header owned by the ledger.
pub(crate) struct RecordPtr(NonNull<Header>);

// SAFETY: the header is only read or written while the ledger lock is held,
// or after the record has been removed from the ledger.
unsafe impl Send for RecordPtr {}

impl RecordPtr {
  /// # Safety
  ///
  /// `payload` must directly follow a valid, initialized `Header`.
  pub unsafe fn from_payload(payload: NonNull<u8>) -> Self {
    Self(unsafe { payload.sub(HEADER_SIZE) }.cast())
  }

  pub fn base(&self) -> NonNull<Header> {
    self.0
  }

  pub fn payload(&self) -> NonNull<u8> {
    // SAFETY: the allocation always spans header and payload.
    unsafe { self.0.cast::<u8>().add(HEADER_SIZE) }
  }

  pub fn header(&self) -> &Header {
    // SAFETY: a `RecordPtr` only exists for headers the tracker initialized.
    unsafe { self.0.as_ref() }
  }

  pub fn header_mut(&mut self) -> &mut Header {
    // SAFETY: see `header`; `&mut self` gives exclusive access.
    unsafe { self.0.as_mut() }
  }
}

pub(crate) struct Record {
  pub ptr: RecordPtr,
  pub describe: Option<Arc<dyn Describe>>,
}

impl Record {
  /// Writes `"<caller>: <length> "` or the describer's text.
  pub fn write_to(
    &self,
    out: &mut dyn io::Write,
  ) -> io::Result<()> {
    let header = self.ptr.header();
    match &self.describe {
      Some(describe) => describe.describe(out, header.caller, header.byte_len()),
      None => write!(out, "{}: {} ", header.caller, header.length),
    }
  }
}
