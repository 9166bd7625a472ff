use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::LogRecord;
use crate::sinks::{SinkError, SinkHandler, WriteStatus};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-channel delivery tally. Each count is one record on one handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
  pub written: usize,
  /// Rejected by the destination inside an otherwise successful batch.
  pub rejected: usize,
  /// Failed and swallowed by a silent handler.
  pub suppressed: usize,
  /// Failed and surfaced by a non-silent handler.
  pub failed: usize,
}

impl DeliveryCounts {
  pub(crate) fn record(&mut self, outcome: &Result<WriteStatus, SinkError>, records: usize) {
    match outcome {
      Ok(WriteStatus::Written) => self.written += records,
      Ok(WriteStatus::PartiallyWritten { rejected }) => self.delivered(records, *rejected),
      Ok(WriteStatus::Suppressed(_)) => self.suppressed += records,
      Ok(WriteStatus::PartiallySuppressed { rejected, suppressed, .. }) => {
        let suppressed = (*suppressed).min(records);
        self.suppressed += suppressed;
        self.delivered(records - suppressed, *rejected);
      }
      Err(SinkError::Incomplete { pending, rejected, .. }) => {
        let failed = pending.len().min(records);
        self.failed += failed;
        self.delivered(records - failed, *rejected);
      }
      Err(_) => self.failed += records,
    }
  }

  // Records that reached the destination, some of which it may have rejected.
  fn delivered(&mut self, records: usize, rejected: usize) {
    let rejected = rejected.min(records);
    self.written += records - rejected;
    self.rejected += rejected;
  }

  pub(crate) fn merge(&mut self, other: DeliveryCounts) {
    self.written += other.written;
    self.rejected += other.rejected;
    self.suppressed += other.suppressed;
    self.failed += other.failed;
  }

  pub fn is_clean(&self) -> bool {
    self.rejected == 0 && self.suppressed == 0 && self.failed == 0
  }
}

/// A named destination made of one or more sink handlers.
pub struct Channel {
  name: String,
  handlers: Vec<Arc<dyn SinkHandler>>,
}

impl Channel {
  pub fn new(name: impl Into<String>, handlers: Vec<Arc<dyn SinkHandler>>) -> Self {
    Self {
      name: name.into(),
      handlers,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn handlers(&self) -> &[Arc<dyn SinkHandler>] {
    &self.handlers
  }

  /// Whether at least one handler can take a whole batch.
  pub fn supports_batch(&self) -> bool {
    self.handlers.iter().any(|h| h.supports_batch())
  }

  /// Writes one record through every handler.
  ///
  /// All handlers are attempted; the first propagated error is returned
  /// alongside the tally.
  pub(crate) fn write_now(&self, record: &LogRecord) -> (DeliveryCounts, Option<SinkError>) {
    let mut counts = DeliveryCounts::default();
    let mut first_error = None;
    for handler in &self.handlers {
      let outcome = handler.write(record);
      counts.record(&outcome, 1);
      if let Err(e) = outcome {
        tracing::warn!(channel = %self.name, sink = handler.name(), error = %e, "immediate write failed");
        first_error.get_or_insert(e);
      }
    }
    (counts, first_error)
  }

  /// Writes one record through every handler, reporting failures instead of returning them.
  pub(crate) fn write_reported_now(&self, record: &LogRecord, reporter: &ErrorReporter) -> DeliveryCounts {
    let mut counts = DeliveryCounts::default();
    for handler in &self.handlers {
      self.write_reported(handler.as_ref(), record, reporter, &mut counts);
    }
    counts
  }

  /// Delivers a buffered group. Errors are reported, never returned.
  pub(crate) fn flush_group(&self, records: &[LogRecord], reporter: &ErrorReporter) -> DeliveryCounts {
    let mut counts = DeliveryCounts::default();
    if records.is_empty() {
      return counts;
    }

    if !self.supports_batch() {
      for record in records {
        for handler in &self.handlers {
          self.write_reported(handler.as_ref(), record, reporter, &mut counts);
        }
      }
      return counts;
    }

    for handler in &self.handlers {
      if !handler.supports_batch() {
        for record in records {
          self.write_reported(handler.as_ref(), record, reporter, &mut counts);
        }
        continue;
      }

      match handler.write_batch(records) {
        Err(e) => {
          tracing::warn!(
            channel = %self.name,
            sink = handler.name(),
            records = records.len(),
            error = %e,
            "batch write failed, falling back to single writes"
          );
          reporter.report(
            InternalErrorSource::BatchWrite {
              channel: self.name.clone(),
              sink: handler.name().to_string(),
            },
            &e,
            Some(format!("records: {}", records.len())),
          );
          // Only what the batch did not deliver is written again.
          let retry: Vec<&LogRecord> = match &e {
            SinkError::Incomplete { pending, rejected, .. } => {
              let pending_count = pending.len().min(records.len());
              counts.delivered(records.len() - pending_count, *rejected);
              pending.iter().filter_map(|&position| records.get(position)).collect()
            }
            _ => records.iter().collect(),
          };
          for record in retry {
            self.write_reported(handler.as_ref(), record, reporter, &mut counts);
          }
        }
        outcome => counts.record(&outcome, records.len()),
      }
    }
    counts
  }

  fn write_reported(
    &self,
    handler: &dyn SinkHandler,
    record: &LogRecord,
    reporter: &ErrorReporter,
    counts: &mut DeliveryCounts,
  ) {
    let outcome = handler.write(record);
    counts.record(&outcome, 1);
    if let Err(e) = outcome {
      reporter.report(
        InternalErrorSource::SinkWrite {
          channel: self.name.clone(),
          sink: handler.name().to_string(),
        },
        e,
        record.log_index().map(|index| format!("index: {}", index)),
      );
    }
  }
}

impl fmt::Debug for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
    f.debug_struct("Channel")
      .field("name", &self.name)
      .field("handlers", &names)
      .finish()
  }
}

/// Every configured channel, by name.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
  channels: HashMap<String, Arc<Channel>>,
}

impl ChannelRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, channel: Channel) {
    self
      .channels
      .insert(channel.name().to_string(), Arc::new(channel));
  }

  pub fn get(&self, name: &str) -> Option<&Arc<Channel>> {
    self.channels.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.channels.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.channels.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.channels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.channels.is_empty()
  }
}


#[cfg(test)]
mod tests {
  use super::testing::MemorySink;
  use super::*;
  use crate::model::{FieldMap, Level};

  fn records(messages: &[&str]) -> Vec<LogRecord> {
    messages
      .iter()
      .map(|m| LogRecord::new("mixed", Level::Info, *m, FieldMap::new()))
      .collect()
  }

  #[test]
  fn mixed_channel_batches_where_possible() {
    let batching = MemorySink::batching("bulk");
    let single = MemorySink::single("plain");
    let channel = Channel::new("mixed", vec![batching.clone(), single.clone()]);

    let counts = channel.flush_group(&records(&["a", "b"]), &ErrorReporter::disabled());

    assert_eq!(batching.batch_messages(), vec![vec!["a".to_string(), "b".to_string()]]);
    assert!(batching.single_messages().is_empty());
    assert_eq!(single.single_messages(), vec!["a", "b"]);
    assert_eq!(counts.written, 4);
  }

  #[test]
  fn failed_batch_falls_back_to_single_writes() {
    let flaky = Arc::new(MemorySink {
      name: "flaky".into(),
      batch: true,
      fail_batch: true,
      ..Default::default()
    });
    let channel = Channel::new("mixed", vec![flaky.clone()]);
    let (reporter, rx) = ErrorReporter::channel(4);

    let counts = channel.flush_group(&records(&["a", "b", "c"]), &reporter);

    assert_eq!(flaky.single_messages(), vec!["a", "b", "c"]);
    assert_eq!(counts.written, 3);
    assert!(matches!(rx.try_recv().unwrap().source, InternalErrorSource::BatchWrite { .. }));
  }

  #[test]
  fn write_now_attempts_every_handler() {
    let broken = Arc::new(MemorySink {
      name: "broken".into(),
      fail_single: true,
      ..Default::default()
    });
    let healthy = MemorySink::single("healthy");
    let channel = Channel::new("c", vec![broken, healthy.clone()]);

    let (counts, error) = channel.write_now(&records(&["x"])[0]);

    assert!(error.is_some());
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.written, 1);
    assert_eq!(healthy.single_messages(), vec!["x"]);
  }

  #[test]
  fn partial_counts_split_written_and_rejected() {
    let mut counts = DeliveryCounts::default();
    counts.record(&Ok(WriteStatus::PartiallyWritten { rejected: 2 }), 5);
    assert_eq!(counts.written, 3);
    assert_eq!(counts.rejected, 2);
    assert!(!counts.is_clean());
  }
}
