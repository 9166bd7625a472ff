// Daily retention pruning for the JSONL file sink.

use crate::error_handling::{ErrorReporter, InternalErrorSource};

use chrono::{DateTime, Days, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

pub(crate) const MARKER_FILE_NAME: &str = ".logflume-prune";
pub(crate) const LOCK_FILE_NAME: &str = ".logflume-prune.lock";

// Matches names like "api_log-2024-03-09.jsonl". Captures: 1=date
static DATED_FILE_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})\.jsonl$").expect("Dated file regex should be valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PruneOutcome {
  Disabled,
  /// The marker shows this directory was already pruned today with this
  /// window or a shorter one.
  AlreadyPruned,
  /// Another worker holds the lock.
  Locked,
  Pruned { deleted: usize },
  Failed,
}

/// Deletes `*.jsonl` files older than the retention window.
///
/// Coordination across processes uses a marker file holding the last pruned
/// date and the window used, plus a non-blocking exclusive lock on a sibling
/// lock file. A caller that cannot take the lock skips pruning instead of
/// waiting.
#[derive(Debug, Clone)]
pub(crate) struct Pruner {
  directory: PathBuf,
  retention_days: u32,
}

impl Pruner {
  pub(crate) fn new(directory: PathBuf, retention_days: u32) -> Self {
    Self {
      directory,
      retention_days,
    }
  }

  pub(crate) fn retention_days(&self) -> u32 {
    self.retention_days
  }

  pub(crate) fn is_enabled(&self) -> bool {
    self.retention_days > 0
  }

  /// Oldest date that is kept: `today - (retention_days - 1)`.
  pub(crate) fn cutoff(&self, today: NaiveDate) -> NaiveDate {
    let keep = u64::from(self.retention_days.saturating_sub(1));
    today.checked_sub_days(Days::new(keep)).unwrap_or(NaiveDate::MIN)
  }

  pub(crate) fn run(&self, today: NaiveDate, reporter: &ErrorReporter) -> PruneOutcome {
    if !self.is_enabled() {
      return PruneOutcome::Disabled;
    }
    if self.covered_by_marker(today) {
      return PruneOutcome::AlreadyPruned;
    }

    let lock_path = self.directory.join(LOCK_FILE_NAME);
    let lock_file = match OpenOptions::new()
      .create(true)
      .truncate(false)
      .write(true)
      .open(&lock_path)
    {
      Ok(file) => file,
      Err(e) => {
        self.report(reporter, &lock_path, e);
        return PruneOutcome::Failed;
      }
    };

    match lock_file.try_lock() {
      Ok(()) => {}
      Err(TryLockError::WouldBlock) => {
        tracing::debug!(directory = ?self.directory, "retention lock held elsewhere, skipping prune");
        return PruneOutcome::Locked;
      }
      Err(TryLockError::Error(e)) => {
        self.report(reporter, &lock_path, e);
        return PruneOutcome::Failed;
      }
    }

    let outcome = self.prune_locked(today, reporter);
    if let Err(e) = lock_file.unlock() {
      self.report(reporter, &lock_path, e);
    }
    outcome
  }

  fn prune_locked(&self, today: NaiveDate, reporter: &ErrorReporter) -> PruneOutcome {
    // Another worker may have finished between our first check and the lock.
    if self.covered_by_marker(today) {
      return PruneOutcome::AlreadyPruned;
    }

    let cutoff = self.cutoff(today);
    let entries = match fs::read_dir(&self.directory) {
      Ok(entries) => entries,
      Err(e) => {
        self.report(reporter, &self.directory, e);
        return PruneOutcome::Failed;
      }
    };

    let mut deleted = 0;
    for entry in entries.flatten() {
      let path = entry.path();
      if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        continue;
      }
      let Some(file_date) = file_date(&path) else {
        continue;
      };
      if file_date < cutoff {
        match fs::remove_file(&path) {
          Ok(()) => deleted += 1,
          Err(e) => self.report(reporter, &path, e),
        }
      }
    }

    let marker_path = self.directory.join(MARKER_FILE_NAME);
    let marker = format!("{} {}", today.format("%Y-%m-%d"), self.retention_days);
    if let Err(e) = fs::write(&marker_path, marker) {
      self.report(reporter, &marker_path, e);
    }

    tracing::debug!(directory = ?self.directory, deleted, %cutoff, "retention prune complete");
    PruneOutcome::Pruned { deleted }
  }

  /// Whether today's prune already deleted everything this window would.
  /// A marker without a window counts as covering every window.
  fn covered_by_marker(&self, today: NaiveDate) -> bool {
    match self.read_marker() {
      Some((date, window)) => date == today && window.is_none_or(|days| days <= self.retention_days),
      None => false,
    }
  }

  // "<YYYY-MM-DD> <retention_days>"
  fn read_marker(&self) -> Option<(NaiveDate, Option<u32>)> {
    let raw = fs::read_to_string(self.directory.join(MARKER_FILE_NAME)).ok()?;
    let mut parts = raw.split_whitespace();
    let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
    let window = parts.next().and_then(|days| days.parse().ok());
    Some((date, window))
  }

  fn report(&self, reporter: &ErrorReporter, path: &Path, error: std::io::Error) {
    reporter.report(
      InternalErrorSource::Retention {
        path: path.display().to_string(),
      },
      error,
      None,
    );
  }
}

/// The date in the file name, falling back to the modification time.
fn file_date(path: &Path) -> Option<NaiveDate> {
  let from_name = path
    .file_name()
    .and_then(|n| n.to_str())
    .and_then(|name| DATED_FILE_REGEX.captures(name))
    .and_then(|caps| NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok());
  from_name.or_else(|| {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified).date_naive())
  })
}

/// Held open by tests to simulate a worker in another process.
#[cfg(test)]
pub(crate) fn hold_lock(directory: &Path) -> std::fs::File {
  let file = OpenOptions::new()
    .create(true)
    .truncate(false)
    .write(true)
    .open(directory.join(LOCK_FILE_NAME))
    .unwrap();
  file.try_lock().unwrap();
  file
}
