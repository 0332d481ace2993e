//! Periodic ledger snapshots with exponential-backoff rotation.
//!
//! Every save first shifts older generations up by one, then rewrites the
//! un-suffixed file. The number of generations shifted is the number of
//! trailing set bits of the save counter, so `path.1` is refreshed every other
//! save, `path.2` every fourth, and so on: recent history stays dense while
//! older history thins out.

use std::{
  fs::{self, File},
  io::{self, BufWriter, Write},
  path::{Path, PathBuf},
  sync::Arc,
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use chrono::Local;
use tracing::{debug, warn};

use super::{Shared, ledger::Ledger};
use crate::error::TrackerError;

/// `path` for generation 0, `path.<n>` otherwise.
pub(crate) fn generation_path(
  path: &Path,
  generation: u32,
) -> PathBuf {
  if generation == 0 {
    return path.to_path_buf();
  }
  let mut name = path.as_os_str().to_owned();
  name.push(format!(".{generation}"));
  PathBuf::from(name)
}

pub(crate) fn rotate(
  path: &Path,
  saves: u64,
) {
  let mut generation = saves.trailing_ones();
  while generation > 0 {
    generation -= 1;
    let from = generation_path(path, generation);
    let to = generation_path(path, generation + 1);
    match fs::rename(&from, &to) {
      Ok(()) => debug!(from = %from.display(), to = %to.display(), "rotated snapshot"),
      Err(err) if err.kind() == io::ErrorKind::NotFound => {},
      Err(err) => warn!(from = %from.display(), %err, "snapshot rotation failed"),
    }
  }
}

pub(crate) fn write_snapshot(
  path: &Path,
  ledger: &Ledger,
) -> Result<(), TrackerError> {
  let write = || -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", Local::now().format("%a %b %e %H:%M:%S %Y"))?;
    ledger.dump(&mut out)?;
    out.flush()
  };

  write().map_err(|source| TrackerError::Snapshot {
    path: path.to_path_buf(),
    source,
  })
}

pub(crate) fn spawn(
  shared: Arc<Shared>,
  path: PathBuf,
  interval: Duration,
) -> Result<JoinHandle<()>, TrackerError> {
  thread::Builder::new()
    .name("rpool-snapshot".into())
    .spawn(move || run(&shared, &path, interval))
    .map_err(TrackerError::Spawn)
}

fn run(
  shared: &Shared,
  path: &Path,
  interval: Duration,
) {
  let mut saves: u64 = 0;

  loop {
    rotate(path, saves);

    let mut ledger = shared.ledger.lock();
    if let Err(err) = write_snapshot(path, &ledger) {
      warn!(%err, "allocation snapshot skipped");
    }
    saves += 1;

    let deadline = Instant::now() + interval;
    while !ledger.shutdown {
      if shared.wake.wait_until(&mut ledger, deadline).timed_out() {
        break;
      }
    }
    if ledger.shutdown {
      debug!(saves, "snapshot thread exiting");
      return;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
  }

  #[test]
  fn test_generation_path() {
    let path = Path::new("/var/log/alloc.log");
    assert_eq!(generation_path(path, 0), path);
    assert_eq!(generation_path(path, 3), Path::new("/var/log/alloc.log.3"));
  }

  #[test]
  fn test_rotate_shifts_trailing_ones_generations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alloc.log");

    fs::write(&path, "latest").unwrap();
    fs::write(generation_path(&path, 1), "older").unwrap();

    // 0b10 has no trailing ones: nothing moves.
    rotate(&path, 2);
    assert_eq!(read(&path), "latest");
    assert_eq!(read(&generation_path(&path, 1)), "older");

    // 0b11 shifts two generations.
    rotate(&path, 3);
    assert!(!path.exists());
    assert_eq!(read(&generation_path(&path, 1)), "latest");
    assert_eq!(read(&generation_path(&path, 2)), "older");
  }

  #[test]
  fn test_rotate_ignores_missing_generations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alloc.log");

    fs::write(&path, "only").unwrap();
    rotate(&path, 7);

    assert_eq!(read(&generation_path(&path, 1)), "only");
    assert!(!generation_path(&path, 2).exists());
    assert!(!generation_path(&path, 3).exists());
  }

  #[test]
  fn test_snapshot_of_empty_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alloc.log");

    write_snapshot(&path, &Ledger::new()).unwrap();

    let text = read(&path);
    let mut lines = text.lines();
    assert!(lines.next().is_some_and(|stamp| !stamp.is_empty()));
    assert_eq!(
      lines.next(),
      Some("0 byte(s) allocated in 0 allocation(s) (0 byte(s) overhead)")
    );
    assert_eq!(lines.next(), None);
  }

  #[test]
  fn test_snapshot_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("alloc.log");

    let err = write_snapshot(&path, &Ledger::new()).unwrap_err();
    assert!(matches!(err, TrackerError::Snapshot { .. }));
  }
}
