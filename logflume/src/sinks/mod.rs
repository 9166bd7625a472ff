//! Per-destination write logic.
//!
//! Every sink implements [`SinkHandler`]. A handler owns its static connection
//! settings for the life of the process and is shared between execution
//! contexts through an `Arc`, so all methods take `&self`.
//!
//! Failures follow one convention: a *silent* handler reports the failure
//! through its [`ErrorReporter`](crate::error_handling::ErrorReporter) and
//! returns `Ok(WriteStatus::Suppressed(..))`; a non-silent handler returns the
//! `Err`.

pub mod broker;
pub mod console;
pub mod file;
pub(crate) mod retention;
pub mod search;
pub mod stream;
pub mod transport;

pub use broker::{BrokerSink, BrokerSinkOptions};
pub use console::{ConsoleSink, ConsoleTarget};
pub use file::JsonlFileSink;
pub use search::{SearchIndexSink, SearchIndexSinkOptions};
pub use stream::{RecordReceiver, StreamSink};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::LogRecord;
use thiserror::Error;

/// Failure of a single sink operation.
#[derive(Debug, Error)]
pub enum SinkError {
  #[error("transport error: {0}")]
  Transport(String),

  #[error("HTTP status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("stream '{0}' is full")]
  StreamFull(String),

  #[error("stream '{0}' is closed")]
  StreamClosed(String),

  /// A batch stopped part way: some groups were delivered, the records at
  /// `pending` (positions in the batch) were not.
  #[error("batch left {} record(s) undelivered: {source}", .pending.len())]
  Incomplete {
    pending: Vec<usize>,
    /// Documents rejected inside the groups that were delivered.
    rejected: usize,
    source: Box<SinkError>,
  },
}

impl SinkError {
  /// Whether another attempt could succeed: transport failures and 5xx responses.
  pub fn is_retryable(&self) -> bool {
    match self {
      SinkError::Transport(_) => true,
      SinkError::Status { status, .. } => (500..600).contains(status),
      _ => false,
    }
  }
}

/// Outcome of a write that did not propagate an error.
#[derive(Debug)]
pub enum WriteStatus {
  /// Every record was accepted.
  Written,
  /// The request succeeded but the destination rejected some records.
  PartiallyWritten { rejected: usize },
  /// The write failed and the handler swallowed the error.
  Suppressed(SinkError),
  /// Part of a batch was delivered; the rest failed and the handler swallowed the error.
  PartiallySuppressed {
    rejected: usize,
    suppressed: usize,
    error: SinkError,
  },
}

impl WriteStatus {
  pub fn is_written(&self) -> bool {
    matches!(self, WriteStatus::Written)
  }

  pub fn is_suppressed(&self) -> bool {
    matches!(self, WriteStatus::Suppressed(_) | WriteStatus::PartiallySuppressed { .. })
  }
}

/// A destination for log records.
pub trait SinkHandler: Send + Sync {
  /// Identifies the handler in diagnostics and reports.
  fn name(&self) -> &str;

  fn write(&self, record: &LogRecord) -> Result<WriteStatus, SinkError>;

  /// Whether [`write_batch`](Self::write_batch) is cheaper than one `write` per record.
  fn supports_batch(&self) -> bool {
    false
  }

  /// Writes many records, preserving order.
  ///
  /// The default delivers one record at a time and stops at the first error.
  /// Once something was delivered the error is [`SinkError::Incomplete`].
  fn write_batch(&self, records: &[LogRecord]) -> Result<WriteStatus, SinkError> {
    let mut rejected = 0;
    for (position, record) in records.iter().enumerate() {
      let status = match self.write(record) {
        Ok(status) => status,
        Err(e) if position == 0 => return Err(e),
        Err(e) => {
          return Err(SinkError::Incomplete {
            pending: (position..records.len()).collect(),
            rejected,
            source: Box::new(e),
          })
        }
      };
      match status {
        WriteStatus::Written => {}
        WriteStatus::PartiallyWritten { rejected: r } => rejected += r,
        WriteStatus::Suppressed(_) => rejected += 1,
        WriteStatus::PartiallySuppressed { rejected: r, suppressed, .. } => rejected += r + suppressed,
      }
    }
    if rejected == 0 {
      Ok(WriteStatus::Written)
    } else {
      Ok(WriteStatus::PartiallyWritten { rejected })
    }
  }
}

/// Applies the silent/propagate convention to a failed write.
///
/// A silent handler keeps the delivered part of an incomplete batch visible
/// as [`WriteStatus::PartiallySuppressed`].
pub(crate) fn contain(
  error: SinkError,
  silent: bool,
  reporter: &ErrorReporter,
  source: InternalErrorSource,
  context: Option<String>,
) -> Result<WriteStatus, SinkError> {
  if !silent {
    return Err(error);
  }
  reporter.report(source, &error, context);
  match error {
    SinkError::Incomplete {
      pending,
      rejected,
      source,
    } => Ok(WriteStatus::PartiallySuppressed {
      rejected,
      suppressed: pending.len(),
      error: *source,
    }),
    error => Ok(WriteStatus::Suppressed(error)),
  }
}
