//! Typed entry points for application code.
//!
//! A [`Logger`] belongs to exactly one execution context (a request, a job or
//! a CLI run). It owns that context's [`Accumulator`], stamps correlation ids
//! from its scope onto every event and, unless configured otherwise, defers
//! writes until the context ends.

use crate::model::{
  ApiLog, CommonFields, ErrorLog, GeneralLog, IntegrationLog, JobLog, JobStatus, Level, LogEvent,
  OrmLog, SourceLocation,
};
use crate::pipeline::{Accumulator, AccumulatorOptions, DispatchReport, Dispatcher, FlushReport};
use crate::sinks::SinkError;

use std::sync::Arc;

pub struct Logger {
  dispatcher: Arc<Dispatcher>,
  accumulator: Accumulator,
  scope: CommonFields,
  defer_by_default: bool,
}

impl Logger {
  pub fn new(
    dispatcher: Arc<Dispatcher>,
    options: AccumulatorOptions,
    scope: CommonFields,
    defer_by_default: bool,
  ) -> Self {
    let accumulator = dispatcher.accumulator(options);
    Self {
      dispatcher,
      accumulator,
      scope,
      defer_by_default,
    }
  }

  /// Correlation ids and app metadata copied onto every event.
  pub fn scope(&self) -> &CommonFields {
    &self.scope
  }

  pub fn scope_mut(&mut self) -> &mut CommonFields {
    &mut self.scope
  }

  pub fn accumulator(&self) -> &Accumulator {
    &self.accumulator
  }

  pub fn accumulator_mut(&mut self) -> &mut Accumulator {
    &mut self.accumulator
  }

  pub fn defers_by_default(&self) -> bool {
    self.defer_by_default
  }

  /// Logs any event in the default mode. Failures never reach the caller.
  #[track_caller]
  pub fn log<E: LogEvent>(&mut self, event: E) {
    let caller = SourceLocation::caller();
    let defer = self.defer_by_default;
    if let Err(e) = self.dispatch(event, defer, caller) {
      tracing::warn!(error = %e, "log write failed");
    }
  }

  /// Writes any event immediately, surfacing errors from non-silent sinks.
  #[track_caller]
  pub fn log_now<E: LogEvent>(&mut self, event: E) -> Result<DispatchReport, SinkError> {
    self.dispatch(event, false, SourceLocation::caller())
  }

  /// Buffers any event regardless of the default mode.
  #[track_caller]
  pub fn log_deferred<E: LogEvent>(&mut self, event: E) {
    let caller = SourceLocation::caller();
    if let Err(e) = self.dispatch(event, true, caller) {
      tracing::warn!(error = %e, "deferred log failed");
    }
  }

  #[track_caller]
  pub fn api(&mut self, event: ApiLog) {
    self.log(event)
  }

  #[track_caller]
  pub fn api_now(&mut self, event: ApiLog) -> Result<DispatchReport, SinkError> {
    self.log_now(event)
  }

  #[track_caller]
  pub fn job(&mut self, event: JobLog) {
    self.log(event)
  }

  #[track_caller]
  pub fn job_now(&mut self, event: JobLog) -> Result<DispatchReport, SinkError> {
    self.log_now(event)
  }

  #[track_caller]
  pub fn integration(&mut self, event: IntegrationLog) {
    self.log(event)
  }

  #[track_caller]
  pub fn integration_now(&mut self, event: IntegrationLog) -> Result<DispatchReport, SinkError> {
    self.log_now(event)
  }

  #[track_caller]
  pub fn orm(&mut self, event: OrmLog) {
    self.log(event)
  }

  #[track_caller]
  pub fn orm_now(&mut self, event: OrmLog) -> Result<DispatchReport, SinkError> {
    self.log_now(event)
  }

  #[track_caller]
  pub fn error(&mut self, event: ErrorLog) {
    self.log(event)
  }

  #[track_caller]
  pub fn error_now(&mut self, event: ErrorLog) -> Result<DispatchReport, SinkError> {
    self.log_now(event)
  }

  #[track_caller]
  pub fn general(&mut self, event: GeneralLog) {
    self.log(event)
  }

  #[track_caller]
  pub fn general_now(&mut self, event: GeneralLog) -> Result<DispatchReport, SinkError> {
    self.log_now(event)
  }

  /// Shorthand for a [`GeneralLog`] with no extra context.
  #[track_caller]
  pub fn message(&mut self, level: Level, message: impl Into<String>) {
    self.log(GeneralLog::new(level, message))
  }

  #[track_caller]
  pub fn info(&mut self, message: impl Into<String>) {
    self.message(Level::Info, message)
  }

  #[track_caller]
  pub fn warning(&mut self, message: impl Into<String>) {
    self.message(Level::Warning, message)
  }

  pub fn flush(&mut self) -> FlushReport {
    self.accumulator.flush()
  }

  /// End of the execution context: flushes whatever is still buffered.
  pub fn terminate(&mut self) -> FlushReport {
    let report = self.accumulator.flush();
    if !report.is_empty() {
      tracing::debug!(records = report.records, "flushed on terminate");
    }
    report
  }

  /// Writes the fatal error immediately, then flushes the buffer.
  #[track_caller]
  pub fn on_fatal(&mut self, event: ErrorLog) -> FlushReport {
    let caller = SourceLocation::caller();
    let event = if event.level < Level::Critical {
      event.with_level(Level::Critical)
    } else {
      event
    };
    tracing::error!(exception_class = %event.exception_class, message = %event.message, "fatal error, flushing logs");
    if let Err(e) = self.dispatch(event, false, caller) {
      tracing::error!(error = %e, "failed to write fatal error event");
    }
    self.accumulator.flush()
  }

  /// Logs the `started` status of a job.
  #[track_caller]
  pub fn job_started(&mut self, job: JobLog) {
    self.log(job.with_status(JobStatus::Started))
  }

  /// Logs the `processed` status of a job, then flushes.
  #[track_caller]
  pub fn job_processed(&mut self, job: JobLog) -> FlushReport {
    self.log(job.with_status(JobStatus::Processed));
    self.accumulator.flush()
  }

  /// Logs the `failed` status of a job and its error, then flushes.
  #[track_caller]
  pub fn job_failed(&mut self, job: JobLog, error: Option<ErrorLog>) -> FlushReport {
    self.log(job.with_status(JobStatus::Failed));
    if let Some(error) = error {
      self.log(error);
    }
    self.accumulator.flush()
  }

  fn dispatch<E: LogEvent>(
    &mut self,
    mut event: E,
    defer: bool,
    caller: SourceLocation,
  ) -> Result<DispatchReport, SinkError> {
    event.common_mut().fill_from(&self.scope);
    self
      .dispatcher
      .log_at(&event, defer, &mut self.accumulator, caller)
  }
}

impl Drop for Logger {
  fn drop(&mut self) {
    let report = self.accumulator.flush();
    if !report.is_empty() {
      tracing::debug!(records = report.records, "flushed on drop");
    }
  }
}

impl std::fmt::Debug for Logger {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Logger")
      .field("scope", &self.scope)
      .field("accumulator", &self.accumulator)
      .field("defer_by_default", &self.defer_by_default)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{FieldLimits, LOG_INDEX_KEY};
  use crate::pipeline::channel::testing::MemorySink;
  use crate::pipeline::{Channel, ChannelRegistry};
  use serde_json::json;

  fn logger(defer_by_default: bool) -> (Arc<MemorySink>, Logger) {
    let sink = MemorySink::batching("memory");
    let mut registry = ChannelRegistry::new();
    registry.insert(Channel::new("local", vec![sink.clone()]));
    let dispatcher = Arc::new(Dispatcher::new(
      Arc::new(registry),
      &["local".to_string()],
      "local",
      FieldLimits::default(),
      Arc::default(),
    ));
    let scope = CommonFields {
      request_id: Some("req-1".into()),
      trace_id: Some("trace-1".into()),
      ..Default::default()
    };
    let logger = Logger::new(dispatcher, AccumulatorOptions::default(), scope, defer_by_default);
    (sink, logger)
  }

  #[test]
  fn facade_defers_by_default_and_fills_scope() {
    let (sink, mut logger) = logger(true);

    logger.api(ApiLog::new("get", "/health").with_status(200));

    assert_eq!(logger.accumulator().count(), 1);
    assert_eq!(sink.total_writes(), 0);
    let record = &logger.accumulator().records()[0];
    assert_eq!(record.context["request_id"], json!("req-1"));
    assert_eq!(record.context["trace_id"], json!("trace-1"));
    assert_eq!(record.context[LOG_INDEX_KEY], json!("api_log"));
    assert!(record.extra["file"].as_str().unwrap().ends_with("facade.rs"));

    let report = logger.terminate();
    assert_eq!(report.records, 1);
    assert_eq!(sink.batch_messages(), vec![vec!["GET /health".to_string()]]);
  }

  #[test]
  fn now_variants_bypass_the_buffer() {
    let (sink, mut logger) = logger(true);

    let report = logger.orm_now(OrmLog::query("select 1", vec![])).unwrap();

    assert_eq!(report.channels["local"].written, 1);
    assert_eq!(logger.accumulator().count(), 0);
    assert_eq!(sink.single_messages(), vec!["select 1"]);
  }

  #[test]
  fn fatal_writes_error_first_then_flushes() {
    let (sink, mut logger) = logger(true);
    logger.info("before the crash");

    let report = logger.on_fatal(ErrorLog::new("OutOfMemory", "allocation failed"));

    assert_eq!(sink.single_messages(), vec!["allocation failed"]);
    assert_eq!(sink.batch_messages(), vec![vec!["before the crash".to_string()]]);
    assert_eq!(report.records, 1);
  }

  #[test]
  fn job_processed_flushes() {
    let (sink, mut logger) = logger(true);
    logger.job_started(JobLog::job("SendInvoice"));
    let report = logger.job_processed(JobLog::job("SendInvoice"));

    assert_eq!(report.records, 2);
    assert_eq!(
      sink.batch_messages(),
      vec![vec![
        "SendInvoice started".to_string(),
        "SendInvoice processed".to_string()
      ]]
    );
  }

  #[test]
  fn drop_flushes_remaining_records() {
    let (sink, mut logger) = logger(true);
    logger.warning("left behind");
    drop(logger);
    assert_eq!(sink.total_writes(), 1);
  }

  #[test]
  fn immediate_default_mode_writes_through() {
    let (sink, mut logger) = logger(false);
    logger.general(GeneralLog::new(Level::Notice, "direct").with("k", "v"));
    assert_eq!(sink.single_messages(), vec!["direct"]);
  }
}
