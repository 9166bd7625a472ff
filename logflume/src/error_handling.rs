use fibre::{
  error::TrySendError as FibreTrySendError,
  mpsc::{self, BoundedReceiver, BoundedSender},
};
use std::fmt;

/// Where an internal (non-propagated) failure happened.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalErrorSource {
  /// A single-record write failed on a sink.
  SinkWrite { channel: String, sink: String },
  /// A batch write failed and the flush fell back to per-record writes.
  BatchWrite { channel: String, sink: String },
  /// A bulk request succeeded but the index rejected one document.
  BulkItem { sink: String, index: String },
  /// Retention pruning failed for a file or directory.
  Retention { path: String },
  /// A configuration value was rejected and replaced by a default.
  ConfigProcessing,
}

impl fmt::Display for InternalErrorSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InternalErrorSource::SinkWrite { channel, sink } => {
        write!(f, "SinkWrite {{ channel: \"{}\", sink: \"{}\" }}", channel, sink)
      }
      InternalErrorSource::BatchWrite { channel, sink } => {
        write!(f, "BatchWrite {{ channel: \"{}\", sink: \"{}\" }}", channel, sink)
      }
      InternalErrorSource::BulkItem { sink, index } => {
        write!(f, "BulkItem {{ sink: \"{}\", index: \"{}\" }}", sink, index)
      }
      InternalErrorSource::Retention { path } => write!(f, "Retention {{ path: \"{}\" }}", path),
      InternalErrorSource::ConfigProcessing => write!(f, "ConfigProcessing"),
    }
  }
}

#[derive(Debug)]
pub struct InternalErrorReport {
  pub source: InternalErrorSource,
  pub error_message: String,
  pub context: Option<String>,
  pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InternalErrorReport {
  pub(crate) fn new(
    source: InternalErrorSource,
    error_message: impl Into<String>,
    context: Option<String>,
  ) -> Self {
    Self {
      source,
      error_message: error_message.into(),
      context,
      timestamp: chrono::Utc::now(),
    }
  }
}

pub type InternalErrorReceiver = BoundedReceiver<InternalErrorReport>;

/// Routes internal failure reports either to a bounded channel the host can
/// drain, or to `tracing` when reporting is disabled.
///
/// Reports never go back through the pipeline itself.
pub struct ErrorReporter {
  tx: Option<BoundedSender<InternalErrorReport>>,
}

impl ErrorReporter {
  /// A reporter that only emits `tracing` events.
  pub fn disabled() -> Self {
    Self { tx: None }
  }

  /// A reporter backed by a bounded channel of the given capacity.
  pub fn channel(capacity: usize) -> (Self, InternalErrorReceiver) {
    let (tx, rx) = mpsc::bounded::<InternalErrorReport>(capacity.max(1));
    (Self { tx: Some(tx) }, rx)
  }

  pub fn is_enabled(&self) -> bool {
    self.tx.is_some()
  }

  pub fn report(&self, source: InternalErrorSource, error: impl fmt::Display, context: Option<String>) {
    let error_message = error.to_string();
    match &self.tx {
      Some(tx) => {
        let report = InternalErrorReport::new(source, error_message, context);
        if let Err(FibreTrySendError::Full(dropped)) = tx.try_send(report) {
          tracing::error!(
            source = %dropped.source,
            error = %dropped.error_message,
            "internal error channel full, dropping report"
          );
        }
      }
      None => {
        tracing::error!(source = %source, error = %error_message, context = ?context, "logflume internal error");
      }
    }
  }
}

impl Default for ErrorReporter {
  fn default() -> Self {
    Self::disabled()
  }
}

impl fmt::Debug for ErrorReporter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorReporter")
      .field("enabled", &self.is_enabled())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_reporter_delivers_reports() {
    let (reporter, rx) = ErrorReporter::channel(4);
    reporter.report(
      InternalErrorSource::SinkWrite {
        channel: "search".to_string(),
        sink: "search_index".to_string(),
      },
      "connection refused",
      Some("index: api_log".to_string()),
    );

    let report = rx.try_recv().expect("a report should be queued");
    assert_eq!(report.error_message, "connection refused");
    assert_eq!(report.context.as_deref(), Some("index: api_log"));
    assert_eq!(
      report.source.to_string(),
      "SinkWrite { channel: \"search\", sink: \"search_index\" }"
    );
  }

  #[test]
  fn full_channel_drops_without_panicking() {
    let (reporter, rx) = ErrorReporter::channel(1);
    reporter.report(InternalErrorSource::ConfigProcessing, "first", None);
    reporter.report(InternalErrorSource::ConfigProcessing, "second", None);

    assert_eq!(rx.try_recv().unwrap().error_message, "first");
    assert!(rx.try_recv().is_err());
  }
}
