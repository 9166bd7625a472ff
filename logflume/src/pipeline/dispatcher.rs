use super::accumulator::Accumulator;
use super::channel::{ChannelRegistry, DeliveryCounts};
use crate::error_handling::ErrorReporter;
use crate::model::{FieldLimits, FieldMap, LogEvent, LogRecord, SourceLocation, LOG_INDEX_KEY};
use crate::sinks::SinkError;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of one [`Dispatcher::log`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
  /// Records handed to the accumulator.
  pub deferred: usize,
  /// Immediate deliveries, per channel.
  pub channels: BTreeMap<String, DeliveryCounts>,
  /// Stack entries with no configured channel.
  pub skipped: Vec<String>,
}

/// Ordered, duplicate-free channel list; the default channel when the stack is empty.
pub fn resolve_stack(stack: &[String], default_channel: &str) -> Vec<String> {
  let mut resolved: Vec<String> = Vec::with_capacity(stack.len());
  for name in stack {
    let name = name.trim();
    if !name.is_empty() && !resolved.iter().any(|r| r == name) {
      resolved.push(name.to_string());
    }
  }
  if resolved.is_empty() {
    resolved.push(default_channel.to_string());
  }
  resolved
}

/// Fans one event out to every channel in the stack, immediately or deferred.
pub struct Dispatcher {
  registry: Arc<ChannelRegistry>,
  stack: Vec<String>,
  limits: FieldLimits,
  reporter: Arc<ErrorReporter>,
}

impl Dispatcher {
  pub fn new(
    registry: Arc<ChannelRegistry>,
    stack: &[String],
    default_channel: &str,
    limits: FieldLimits,
    reporter: Arc<ErrorReporter>,
  ) -> Self {
    let stack = resolve_stack(stack, default_channel);
    for name in &stack {
      if !registry.contains(name) {
        tracing::warn!(channel = %name, "stack names a channel that is not configured; it will be skipped");
      }
    }
    Self {
      registry,
      stack,
      limits,
      reporter,
    }
  }

  pub fn stack(&self) -> &[String] {
    &self.stack
  }

  pub fn registry(&self) -> &Arc<ChannelRegistry> {
    &self.registry
  }

  pub fn reporter(&self) -> &Arc<ErrorReporter> {
    &self.reporter
  }

  /// A fresh accumulator bound to this dispatcher's channels.
  pub fn accumulator(&self, options: super::AccumulatorOptions) -> Accumulator {
    Accumulator::new(self.registry.clone(), self.reporter.clone(), options)
  }

  /// `{log_index: event.index()}` merged with the event's field map, limits applied.
  pub fn build_context(&self, event: &dyn LogEvent) -> FieldMap {
    let mut context = event.field_map();
    self.limits.apply(&mut context);
    context.insert(LOG_INDEX_KEY.to_string(), Value::String(event.index().to_string()));
    context
  }

  /// Dispatches from the caller's location.
  #[track_caller]
  pub fn log(
    &self,
    event: &dyn LogEvent,
    defer: bool,
    accumulator: &mut Accumulator,
  ) -> Result<DispatchReport, SinkError> {
    self.log_at(event, defer, accumulator, SourceLocation::caller())
  }

  /// Builds one record per channel and either buffers it or writes it now.
  ///
  /// Channels are independent: every channel is attempted, and the first
  /// propagated error is returned only after all of them.
  pub fn log_at(
    &self,
    event: &dyn LogEvent,
    defer: bool,
    accumulator: &mut Accumulator,
    caller: SourceLocation,
  ) -> Result<DispatchReport, SinkError> {
    let context = self.build_context(event);
    let extra = caller_extra(&caller);
    let mut report = DispatchReport::default();
    let mut first_error = None;

    for name in &self.stack {
      let Some(channel) = self.registry.get(name) else {
        report.skipped.push(name.clone());
        continue;
      };
      let record = LogRecord::new(name.as_str(), event.level(), event.message(), context.clone())
        .with_extra(extra.clone());

      if defer {
        accumulator.push(record);
        report.deferred += 1;
      } else {
        let (counts, error) = channel.write_now(&record);
        report.channels.insert(name.clone(), counts);
        if let Some(error) = error {
          first_error.get_or_insert(error);
        }
      }
    }

    if !report.skipped.is_empty() {
      tracing::warn!(skipped = ?report.skipped, "skipped unconfigured channels");
    }
    match first_error {
      Some(error) => Err(error),
      None => Ok(report),
    }
  }
}

fn caller_extra(caller: &SourceLocation) -> FieldMap {
  let mut extra = FieldMap::new();
  extra.insert("file".to_string(), Value::String(caller.file.clone()));
  extra.insert("line".to_string(), Value::from(caller.line));
  if let Some(function) = &caller.function {
    extra.insert("function".to_string(), Value::String(function.clone()));
  }
  extra
}
