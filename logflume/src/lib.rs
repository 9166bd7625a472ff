//! `logflume` - request/job-scoped structured logging.
//!
//! Application code builds typed events ([`ApiLog`], [`JobLog`], [`ErrorLog`],
//! ...) and hands them to a per-context [`Logger`]. The logger stamps
//! correlation ids onto every event, buffers records until the request or job
//! ends and then fans them out to every channel in the configured stack. A
//! channel delivers to one or more sinks: daily JSONL files with retention, an
//! Elasticsearch-compatible index, a Kafka REST proxy, the console, or an
//! in-process stream.
//!
//! Sink failures never reach the caller. They are reported through
//! [`Pipeline::internal_error_rx`] when internal error reporting is enabled,
//! and through `tracing` otherwise.

// Declare modules following the file structure
pub mod config;
pub mod encoders;
pub mod error;
pub mod error_handling;
pub mod facade;
pub mod init;
pub mod lifecycle;
pub mod model;
pub mod pipeline;
pub mod sinks;

// Re-export key public types for easier use by library consumers.
pub use error::{Error, Result};
pub use error_handling::{ErrorReporter, InternalErrorReceiver, InternalErrorReport, InternalErrorSource};
pub use facade::Logger;
pub use model::{
  ApiLog, AppMetadata, CommonFields, ErrorLog, GeneralLog, IntegrationLog, JobKind, JobLog,
  JobStatus, Level, LogEvent, LogRecord, OrmLog,
};
pub use pipeline::{AccumulatorOptions, DeliveryCounts, DispatchReport, Dispatcher, FlushReport};
pub use sinks::{RecordReceiver, SinkError, WriteStatus};

// Public initialization functions
pub use init::{build_pipeline, find_config_file, init_from_file, init_from_str};

use std::{collections::HashMap, sync::Arc};

/// The configured pipeline returned by initialization.
///
/// Shared across execution contexts. Each request, job or CLI run asks it for
/// its own [`Logger`].
#[must_use = "The Pipeline hands out loggers and owns the internal error and stream receivers"]
pub struct Pipeline {
  dispatcher: Arc<Dispatcher>,
  app: AppMetadata,
  accumulator_options: AccumulatorOptions,
  defer_by_default: bool,
  // If error reporting is enabled, this receiver can be used to get internal error reports.
  pub internal_error_rx: Option<InternalErrorReceiver>,
  /// Receivers of `stream` sinks, keyed by sink name (`<channel>.stream`).
  pub streams: HashMap<String, RecordReceiver>,
}

impl Pipeline {
  pub fn new(
    dispatcher: Arc<Dispatcher>,
    app: AppMetadata,
    accumulator_options: AccumulatorOptions,
    defer_by_default: bool,
    internal_error_rx: Option<InternalErrorReceiver>,
    streams: HashMap<String, RecordReceiver>,
  ) -> Self {
    Self {
      dispatcher,
      app,
      accumulator_options,
      defer_by_default,
      internal_error_rx,
      streams,
    }
  }

  pub fn dispatcher(&self) -> &Arc<Dispatcher> {
    &self.dispatcher
  }

  pub fn app(&self) -> &AppMetadata {
    &self.app
  }

  /// A logger for an arbitrary scope.
  pub fn logger(&self, scope: CommonFields) -> Logger {
    Logger::new(
      self.dispatcher.clone(),
      self.accumulator_options.clone(),
      scope,
      self.defer_by_default,
    )
  }

  /// A logger for one HTTP request. See [`lifecycle::request_scope`].
  pub fn request_scope(&self, request_id: Option<String>, trace_id: Option<String>) -> Logger {
    self.logger(lifecycle::request_scope(&self.app, request_id, trace_id))
  }

  /// A logger for a queued job dispatched from `parent`.
  pub fn job_scope(&self, parent: Option<&CommonFields>) -> Logger {
    self.logger(lifecycle::job_scope(&self.app, parent))
  }

  pub fn cli_scope(&self) -> Logger {
    self.logger(lifecycle::cli_scope(&self.app))
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("stack", &self.dispatcher.stack())
      .field("app", &self.app)
      .field("defer_by_default", &self.defer_by_default)
      .field("error_reporting", &self.internal_error_rx.is_some())
      .field("streams", &self.streams.keys().collect::<Vec<_>>())
      .finish()
  }
}
