use super::retention::{PruneOutcome, Pruner};
use super::{contain, SinkError, SinkHandler, WriteStatus};
use crate::encoders::util;
use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::{index, FieldMap, LogRecord, LOG_INDEX_KEY};

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// (directory, retention_days) pairs already pruned today by this process,
// shared by every file sink.
static PRUNED_ON: Lazy<Mutex<HashMap<(PathBuf, u32), NaiveDate>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Appends one JSON object per line to `<directory>/<index>-<YYYY-MM-DD>.jsonl`.
///
/// Never propagates an error: failures are reported and the write is
/// `Suppressed`.
pub struct JsonlFileSink {
  name: String,
  directory: PathBuf,
  pruner: Pruner,
  reporter: Arc<ErrorReporter>,
}

impl JsonlFileSink {
  pub fn new(
    name: impl Into<String>,
    directory: impl Into<PathBuf>,
    retention_days: u32,
    reporter: Arc<ErrorReporter>,
  ) -> Self {
    let directory = directory.into();
    Self {
      name: name.into(),
      pruner: Pruner::new(directory.clone(), retention_days),
      directory,
      reporter,
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// The file a record is appended to, named after the record's own date.
  pub fn path_for(&self, record: &LogRecord) -> PathBuf {
    let index = util::sanitize_index(record.index_or(index::GENERAL));
    let date = record.timestamp.date_naive().format("%Y-%m-%d");
    self.directory.join(format!("{}-{}.jsonl", index, date))
  }

  /// `{@timestamp, log_index, ..context}` plus `message`, `level` and `channel` when absent.
  pub fn build_line(&self, record: &LogRecord) -> Result<String, SinkError> {
    let mut payload = FieldMap::new();
    payload.insert(
      "@timestamp".to_string(),
      Value::String(util::format_timestamp(&record.timestamp)),
    );
    payload.insert(
      LOG_INDEX_KEY.to_string(),
      Value::String(record.index_or(index::GENERAL).to_string()),
    );
    for (key, value) in &record.context {
      if key != LOG_INDEX_KEY {
        payload.insert(key.clone(), value.clone());
      }
    }
    payload
      .entry("message")
      .or_insert_with(|| Value::String(record.message.clone()));
    payload
      .entry("level")
      .or_insert_with(|| Value::String(record.level.as_str().to_string()));
    payload
      .entry("channel")
      .or_insert_with(|| Value::String(record.channel.clone()));

    let mut line = serde_json::to_string(&payload)?;
    line.push('\n');
    Ok(line)
  }

  /// Prunes at most once per day per directory and window in this process.
  fn maybe_prune(&self) {
    if !self.pruner.is_enabled() {
      return;
    }
    let today = Utc::now().date_naive();
    let key = (self.directory.clone(), self.pruner.retention_days());
    if PRUNED_ON.lock().get(&key) == Some(&today) {
      return;
    }
    match self.pruner.run(today, &self.reporter) {
      PruneOutcome::Pruned { .. } | PruneOutcome::AlreadyPruned => {
        PRUNED_ON.lock().insert(key, today);
      }
      // Retry on a later write.
      PruneOutcome::Locked | PruneOutcome::Failed | PruneOutcome::Disabled => {}
    }
  }

  fn append(&self, path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
  }

  fn prepare(&self) -> Result<(), SinkError> {
    fs::create_dir_all(&self.directory)?;
    self.maybe_prune();
    Ok(())
  }

  fn write_one(&self, record: &LogRecord) -> Result<(), SinkError> {
    self.prepare()?;
    let line = self.build_line(record)?;
    self.append(&self.path_for(record), line.as_bytes())
  }

  /// Appends each file's lines in one write. A failed file does not stop the
  /// others; once any file was written the error is [`SinkError::Incomplete`].
  fn write_many(&self, records: &[LogRecord]) -> Result<(), SinkError> {
    self.prepare()?;

    // Group by file, keeping first-seen file order and record order within a file.
    let mut groups: Vec<(PathBuf, String, Vec<usize>)> = Vec::new();
    for (position, record) in records.iter().enumerate() {
      let path = self.path_for(record);
      let line = self.build_line(record)?;
      match groups.iter_mut().find(|(p, _, _)| *p == path) {
        Some((_, buffer, positions)) => {
          buffer.push_str(&line);
          positions.push(position);
        }
        None => groups.push((path, line, vec![position])),
      }
    }

    let mut pending = Vec::new();
    let mut first_error = None;
    for (path, buffer, positions) in groups {
      if let Err(e) = self.append(&path, buffer.as_bytes()) {
        tracing::debug!(sink = %self.name, path = %path.display(), error = %e, "append failed");
        pending.extend(positions);
        first_error.get_or_insert(e);
      }
    }

    match first_error {
      None => Ok(()),
      Some(e) if pending.len() == records.len() => Err(e),
      Some(e) => {
        pending.sort_unstable();
        Err(SinkError::Incomplete {
          pending,
          rejected: 0,
          source: Box::new(e),
        })
      }
    }
  }

  fn suppress(&self, error: SinkError, channel: &str) -> Result<WriteStatus, SinkError> {
    contain(
      error,
      true,
      &self.reporter,
      InternalErrorSource::SinkWrite {
        channel: channel.to_string(),
        sink: self.name.clone(),
      },
      Some(format!("directory: {}", self.directory.display())),
    )
  }
}

impl SinkHandler for JsonlFileSink {
  fn name(&self) -> &str {
    &self.name
  }

  fn write(&self, record: &LogRecord) -> Result<WriteStatus, SinkError> {
    match self.write_one(record) {
      Ok(()) => Ok(WriteStatus::Written),
      Err(e) => self.suppress(e, &record.channel),
    }
  }

  fn supports_batch(&self) -> bool {
    true
  }

  fn write_batch(&self, records: &[LogRecord]) -> Result<WriteStatus, SinkError> {
    if records.is_empty() {
      return Ok(WriteStatus::Written);
    }
    match self.write_many(records) {
      Ok(()) => Ok(WriteStatus::Written),
      Err(e) => self.suppress(e, &records[0].channel),
    }
  }
}
