use std::{
  collections::{BTreeMap, HashMap},
  io,
  panic::Location,
};

use super::record::{HEADER_SIZE, Record};

/// Aggregate counters of a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
  pub total_bytes: usize,
  pub total_allocations: usize,
}

impl LedgerStats {
  /// Header bytes spent on bookkeeping.
  pub fn overhead(&self) -> usize {
    self.total_allocations * HEADER_SIZE
  }
}

/// The live allocation closest to a pointer the tracker did not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearestAllocation {
  pub caller: &'static Location<'static>,
  pub length: isize,
  /// Absolute byte distance between the pointer and the payload start.
  pub distance: usize,
  /// Whether the pointer lies after the payload start.
  pub ahead: bool,
}

/// Every live tracked allocation, in allocation order.
pub(crate) struct Ledger {
  records: BTreeMap<u64, Record>,
  index: HashMap<usize, u64>,
  next_seq: u64,
  stats: LedgerStats,
  /// Set when the snapshot thread must exit.
  pub shutdown: bool,
}

impl Ledger {
  pub fn new() -> Self {
    Self {
      records: BTreeMap::new(),
      index: HashMap::new(),
      next_seq: 0,
      stats: LedgerStats::default(),
      shutdown: false,
    }
  }

  pub fn stats(&self) -> LedgerStats {
    self.stats
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn insert(
    &mut self,
    mut record: Record,
  ) {
    let seq = self.next_seq;
    self.next_seq += 1;

    let header = record.ptr.header_mut();
    header.seq = seq;
    self.stats.total_bytes += header.byte_len();
    self.stats.total_allocations += 1;

    self.index.insert(record.ptr.payload().addr().get(), seq);
    self.records.insert(seq, record);
  }

  /// Resolves a payload address to its record, applying the back-reference
  /// test against `owner`.
  pub fn lookup(
    &self,
    addr: usize,
    owner: usize,
  ) -> Option<&Record> {
    let seq = self.index.get(&addr)?;
    let record = self.records.get(seq)?;
    (record.ptr.header().owner == owner).then_some(record)
  }

  pub fn remove(
    &mut self,
    addr: usize,
    owner: usize,
  ) -> Option<Record> {
    self.lookup(addr, owner)?;
    let seq = self.index.remove(&addr)?;
    let record = self.records.remove(&seq)?;

    self.stats.total_bytes -= record.ptr.header().byte_len();
    self.stats.total_allocations -= 1;
    Some(record)
  }

  /// Linear scan for the record whose payload start is closest to `addr`.
  pub fn nearest(
    &self,
    addr: usize,
  ) -> Option<(&Record, NearestAllocation)> {
    let mut closest: Option<(&Record, NearestAllocation)> = None;

    for record in self.records.values() {
      let start = record.ptr.payload().addr().get();
      let distance = addr.abs_diff(start);
      if closest.as_ref().is_none_or(|(_, best)| distance < best.distance) {
        let header = record.ptr.header();
        closest = Some((
          record,
          NearestAllocation {
            caller: header.caller,
            length: header.length,
            distance,
            ahead: addr >= start,
          },
        ));
      }
    }

    closest
  }

  /// Writes the summary line followed by one line per live record.
  pub fn dump(
    &self,
    out: &mut dyn io::Write,
  ) -> io::Result<()> {
    writeln!(
      out,
      "{} byte(s) allocated in {} allocation(s) ({} byte(s) overhead)",
      self.stats.total_bytes,
      self.stats.total_allocations,
      self.stats.overhead()
    )?;
    for record in self.records.values() {
      record.write_to(out)?;
      writeln!(out)?;
    }
    Ok(())
  }
}
