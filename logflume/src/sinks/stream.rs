use super::{SinkError, SinkHandler, WriteStatus};
use crate::model::LogRecord;

use fibre::error::TrySendError as FibreTrySendError;
use fibre::mpsc::{self, BoundedReceiver, BoundedSender};

pub type RecordReceiver = BoundedReceiver<LogRecord>;

/// Hands records to the application over a bounded channel.
///
/// Writes never block: when the channel is full the record is dropped and the
/// write is `Suppressed`.
pub struct StreamSink {
  name: String,
  tx: BoundedSender<LogRecord>,
}

impl StreamSink {
  pub fn new(name: impl Into<String>, capacity: usize) -> (Self, RecordReceiver) {
    let (tx, rx) = mpsc::bounded::<LogRecord>(capacity.max(1));
    (
      Self {
        name: name.into(),
        tx,
      },
      rx,
    )
  }

  fn send(&self, record: LogRecord) -> WriteStatus {
    match self.tx.try_send(record) {
      Ok(()) => WriteStatus::Written,
      Err(FibreTrySendError::Full(_)) => {
        tracing::debug!(sink = %self.name, "stream full, dropping record");
        WriteStatus::Suppressed(SinkError::StreamFull(self.name.clone()))
      }
      Err(_) => WriteStatus::Suppressed(SinkError::StreamClosed(self.name.clone())),
    }
  }
}

impl SinkHandler for StreamSink {
  fn name(&self) -> &str {
    &self.name
  }

  fn write(&self, record: &LogRecord) -> Result<WriteStatus, SinkError> {
    Ok(self.send(record.clone()))
  }

  fn supports_batch(&self) -> bool {
    true
  }

  /// Dropped records count as suppressed, the same as single writes.
  fn write_batch(&self, records: &[LogRecord]) -> Result<WriteStatus, SinkError> {
    let mut dropped = 0;
    let mut last_error = None;
    for record in records {
      if let WriteStatus::Suppressed(e) = self.send(record.clone()) {
        dropped += 1;
        last_error = Some(e);
      }
    }
    Ok(match last_error {
      None => WriteStatus::Written,
      Some(error) if dropped == records.len() => WriteStatus::Suppressed(error),
      Some(error) => WriteStatus::PartiallySuppressed {
        rejected: 0,
        suppressed: dropped,
        error,
      },
    })
  }
}
