use super::channel::{ChannelRegistry, DeliveryCounts};
use crate::error_handling::ErrorReporter;
use crate::model::{index, FieldMap, Level, LogRecord, LOG_INDEX_KEY};

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccumulatorOptions {
  /// Auto-flush threshold. `None` or `Some(0)` means unbounded.
  pub max_logs: Option<usize>,
  pub warn_on_limit: bool,
  /// Channel that receives the limit warning, written immediately.
  pub bypass_channel: Option<String>,
}

/// Outcome of a flush, per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
  /// Number of buffered records that were flushed.
  pub records: usize,
  pub channels: BTreeMap<String, DeliveryCounts>,
}

impl FlushReport {
  pub fn is_empty(&self) -> bool {
    self.records == 0
  }

  pub fn channel(&self, name: &str) -> Option<&DeliveryCounts> {
    self.channels.get(name)
  }

  pub fn totals(&self) -> DeliveryCounts {
    let mut totals = DeliveryCounts::default();
    for counts in self.channels.values() {
      totals.merge(*counts);
    }
    totals
  }
}

/// In-memory buffer of records for one execution context.
///
/// Records are appended flat and grouped by channel only when flushed. Owned
/// by a single [`Logger`](crate::Logger), so it needs no locking.
pub struct Accumulator {
  logs: Vec<LogRecord>,
  options: AccumulatorOptions,
  auto_flush_count: usize,
  registry: Arc<ChannelRegistry>,
  reporter: Arc<ErrorReporter>,
}

impl Accumulator {
  pub fn new(
    registry: Arc<ChannelRegistry>,
    reporter: Arc<ErrorReporter>,
    options: AccumulatorOptions,
  ) -> Self {
    Self {
      logs: Vec::new(),
      options,
      auto_flush_count: 0,
      registry,
      reporter,
    }
  }

  /// Buffers a new record stamped with the current time.
  pub fn defer(
    &mut self,
    channel: impl Into<String>,
    level: Level,
    message: impl Into<String>,
    context: FieldMap,
  ) {
    self.push(LogRecord::new(channel, level, message, context));
  }

  /// Buffers a prepared record, auto-flushing first when the buffer is full.
  pub fn push(&mut self, record: LogRecord) {
    if let Some(max_logs) = self.max_logs() {
      if self.logs.len() >= max_logs {
        if self.options.warn_on_limit {
          self.warn_limit_reached(max_logs);
        }
        self.auto_flush_count += 1;
        self.flush();
      }
    }
    self.logs.push(record);
  }

  /// Writes every buffered record, grouped by channel, then empties the buffer.
  ///
  /// Failures are isolated per channel and reported; they never surface here.
  pub fn flush(&mut self) -> FlushReport {
    let mut report = FlushReport::default();
    if self.logs.is_empty() {
      return report;
    }

    let logs = std::mem::take(&mut self.logs);
    report.records = logs.len();

    // Stable grouping: channels in first-seen order, records in insertion order.
    let mut groups: Vec<(String, Vec<LogRecord>)> = Vec::new();
    for record in logs {
      match groups.iter_mut().find(|(name, _)| *name == record.channel) {
        Some((_, group)) => group.push(record),
        None => groups.push((record.channel.clone(), vec![record])),
      }
    }

    for (name, records) in groups {
      let counts = match self.registry.get(&name) {
        Some(channel) => channel.flush_group(&records, &self.reporter),
        None => {
          tracing::warn!(channel = %name, records = records.len(), "dropping buffered records for unknown channel");
          DeliveryCounts {
            failed: records.len(),
            ..Default::default()
          }
        }
      };
      tracing::debug!(channel = %name, written = counts.written, failed = counts.failed, "flushed channel");
      report.channels.entry(name).or_default().merge(counts);
    }

    report
  }

  /// Discards buffered records without writing them.
  pub fn clear(&mut self) {
    self.logs.clear();
    self.auto_flush_count = 0;
  }

  pub fn count(&self) -> usize {
    self.logs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.logs.is_empty()
  }

  pub fn auto_flush_count(&self) -> usize {
    self.auto_flush_count
  }

  pub fn max_logs(&self) -> Option<usize> {
    self.options.max_logs.filter(|max| *max > 0)
  }

  pub fn records(&self) -> &[LogRecord] {
    &self.logs
  }

  fn warn_limit_reached(&self, max_logs: usize) {
    tracing::warn!(max_logs, auto_flush_count = self.auto_flush_count + 1, "log accumulator limit reached, auto-flushing");

    let Some(bypass) = self.options.bypass_channel.as_deref() else {
      return;
    };
    let Some(channel) = self.registry.get(bypass) else {
      return;
    };
    let mut context = FieldMap::new();
    context.insert(LOG_INDEX_KEY.to_string(), json!(index::GENERAL));
    context.insert("max_logs".to_string(), json!(max_logs));
    context.insert("auto_flush_count".to_string(), json!(self.auto_flush_count + 1));
    let record = LogRecord::new(
      bypass,
      Level::Warning,
      format!("Log accumulator reached its limit of {} entries, auto-flushing", max_logs),
      context,
    );
    let counts = channel.write_reported_now(&record, &self.reporter);
    if !counts.is_clean() {
      tracing::warn!(channel = %bypass, failed = counts.failed, suppressed = counts.suppressed, "limit warning not fully delivered");
    }
  }
}

impl std::fmt::Debug for Accumulator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Accumulator")
      .field("count", &self.logs.len())
      .field("options", &self.options)
      .field("auto_flush_count", &self.auto_flush_count)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipeline::channel::testing::MemorySink;
  use crate::pipeline::channel::Channel;

  struct TestSetup {
    local: Arc<MemorySink>,
    search: Arc<MemorySink>,
    bypass: Arc<MemorySink>,
    accumulator: Accumulator,
  }

  fn setup(options: AccumulatorOptions) -> TestSetup {
    let local = MemorySink::single("file");
    let search = MemorySink::batching("search");
    let bypass = MemorySink::single("stderr");
    let mut registry = ChannelRegistry::new();
    registry.insert(Channel::new("local", vec![local.clone()]));
    registry.insert(Channel::new("search", vec![search.clone()]));
    registry.insert(Channel::new("console", vec![bypass.clone()]));
    TestSetup {
      local,
      search,
      bypass,
      accumulator: Accumulator::new(Arc::new(registry), Arc::default(), options),
    }
  }

  #[test]
  fn flush_groups_by_channel_in_order() {
    let mut setup = setup(AccumulatorOptions::default());
    for (channel, message) in [("local", "1"), ("search", "2"), ("local", "3"), ("search", "4")] {
      setup
        .accumulator
        .defer(channel, Level::Info, message, FieldMap::new());
    }

    let report = setup.accumulator.flush();

    assert_eq!(report.records, 4);
    assert_eq!(setup.local.single_messages(), vec!["1", "3"]);
    assert_eq!(
      setup.search.batch_messages(),
      vec![vec!["2".to_string(), "4".to_string()]]
    );
    assert_eq!(report.channel("local").unwrap().written, 2);
    assert_eq!(report.channel("search").unwrap().written, 2);
    assert_eq!(setup.accumulator.count(), 0);
  }

  #[test]
  fn flushing_an_empty_buffer_is_a_noop() {
    let mut setup = setup(AccumulatorOptions::default());
    setup
      .accumulator
      .defer("local", Level::Info, "once", FieldMap::new());

    setup.accumulator.flush();
    let second = setup.accumulator.flush();
    let third = setup.accumulator.flush();

    assert!(second.is_empty());
    assert!(third.is_empty());
    assert_eq!(setup.local.total_writes(), 1);
  }

  #[test]
  fn buffer_never_exceeds_max_logs() {
    let mut setup = setup(AccumulatorOptions {
      max_logs: Some(3),
      warn_on_limit: true,
      bypass_channel: Some("console".to_string()),
    });

    for i in 0..10 {
      setup
        .accumulator
        .defer("local", Level::Debug, i.to_string(), FieldMap::new());
      assert!(setup.accumulator.count() <= 3);
    }

    assert_eq!(setup.accumulator.auto_flush_count(), 3);
    assert_eq!(setup.local.total_writes(), 9);
    assert_eq!(setup.bypass.total_writes(), 3);
    assert!(setup.bypass.single_messages()[0].contains("limit of 3"));
  }

  #[test]
  fn zero_max_logs_is_unbounded() {
    let mut setup = setup(AccumulatorOptions {
      max_logs: Some(0),
      ..Default::default()
    });
    for i in 0..50 {
      setup
        .accumulator
        .defer("local", Level::Debug, i.to_string(), FieldMap::new());
    }
    assert_eq!(setup.accumulator.count(), 50);
    assert_eq!(setup.accumulator.max_logs(), None);
    assert_eq!(setup.accumulator.auto_flush_count(), 0);
  }

  #[test]
  fn clear_discards_without_writing() {
    let mut setup = setup(AccumulatorOptions {
      max_logs: Some(1),
      ..Default::default()
    });
    setup
      .accumulator
      .defer("local", Level::Info, "a", FieldMap::new());
    setup
      .accumulator
      .defer("local", Level::Info, "b", FieldMap::new());
    assert_eq!(setup.accumulator.auto_flush_count(), 1);

    setup.accumulator.clear();

    assert_eq!(setup.accumulator.count(), 0);
    assert_eq!(setup.accumulator.auto_flush_count(), 0);
    assert_eq!(setup.local.single_messages(), vec!["a"]);
    assert!(setup.bypass.single_messages().is_empty());
  }

  #[test]
  fn broken_bypass_channel_is_reported() {
    let broken = Arc::new(MemorySink {
      name: "stderr".into(),
      fail_single: true,
      ..Default::default()
    });
    let mut registry = ChannelRegistry::new();
    registry.insert(Channel::new("local", vec![MemorySink::single("file")]));
    registry.insert(Channel::new("console", vec![broken]));
    let (reporter, rx) = ErrorReporter::channel(8);
    let mut accumulator = Accumulator::new(
      Arc::new(registry),
      Arc::new(reporter),
      AccumulatorOptions {
        max_logs: Some(1),
        warn_on_limit: true,
        bypass_channel: Some("console".to_string()),
      },
    );

    accumulator.defer("local", Level::Info, "a", FieldMap::new());
    accumulator.defer("local", Level::Info, "b", FieldMap::new());

    let report = rx.try_recv().unwrap();
    assert_eq!(
      report.source,
      crate::error_handling::InternalErrorSource::SinkWrite {
        channel: "console".to_string(),
        sink: "stderr".to_string(),
      }
    );
  }

  #[test]
  fn unknown_channel_does_not_block_others() {
    let mut setup = setup(AccumulatorOptions::default());
    setup
      .accumulator
      .defer("missing", Level::Info, "lost", FieldMap::new());
    setup
      .accumulator
      .defer("local", Level::Info, "kept", FieldMap::new());

    let report = setup.accumulator.flush();

    assert_eq!(report.channel("missing").unwrap().failed, 1);
    assert_eq!(setup.local.single_messages(), vec!["kept"]);
    assert_eq!(report.totals().written, 1);
  }
}
