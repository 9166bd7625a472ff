use super::{contain, SinkError, SinkHandler, WriteStatus};
use crate::encoders::PatternFormatter;
use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::LogRecord;

use std::io::{self, Write};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleTarget {
  #[default]
  Stdout,
  Stderr,
}

/// Writes one pattern-formatted line per record. Not batch-capable.
pub struct ConsoleSink {
  name: String,
  target: ConsoleTarget,
  formatter: PatternFormatter,
  reporter: Arc<ErrorReporter>,
}

impl ConsoleSink {
  pub fn new(
    name: impl Into<String>,
    target: ConsoleTarget,
    formatter: PatternFormatter,
    reporter: Arc<ErrorReporter>,
  ) -> Self {
    Self {
      name: name.into(),
      target,
      formatter,
      reporter,
    }
  }

  pub fn format(&self, record: &LogRecord) -> String {
    self.formatter.format_record(record)
  }

  fn emit(&self, line: &str) -> io::Result<()> {
    match self.target {
      ConsoleTarget::Stdout => {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.flush()
      }
      ConsoleTarget::Stderr => {
        let mut err = io::stderr().lock();
        err.write_all(line.as_bytes())?;
        err.flush()
      }
    }
  }
}

impl SinkHandler for ConsoleSink {
  fn name(&self) -> &str {
    &self.name
  }

  fn write(&self, record: &LogRecord) -> Result<WriteStatus, SinkError> {
    match self.emit(&self.format(record)) {
      Ok(()) => Ok(WriteStatus::Written),
      Err(e) => contain(
        e.into(),
        true,
        &self.reporter,
        InternalErrorSource::SinkWrite {
          channel: record.channel.clone(),
          sink: self.name.clone(),
        },
        None,
      ),
    }
  }
}
