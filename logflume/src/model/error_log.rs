use super::fields::FieldWriter;
use super::{index, CommonFields, FieldMap, Level, LogEvent};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::Location;

/// An error or panic. Its stack trace carries per-frame locations, so the
/// common source-location fields are never emitted for this category.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorLog {
  pub level: Level,
  pub message: String,
  pub exception_class: String,
  pub error_code: Option<String>,
  /// Where the error was raised or caught.
  pub error_file: Option<String>,
  pub error_line: Option<u32>,
  pub stack_trace: Option<String>,
  /// Display of the underlying cause chain, outermost first.
  pub previous_exception: Option<String>,
  pub common: CommonFields,
}

impl ErrorLog {
  #[track_caller]
  pub fn new(exception_class: impl Into<String>, message: impl Into<String>) -> Self {
    let location = Location::caller();
    Self {
      level: Level::Error,
      message: message.into(),
      exception_class: exception_class.into(),
      error_code: None,
      error_file: Some(location.file().to_string()),
      error_line: Some(location.line()),
      stack_trace: None,
      previous_exception: None,
      common: CommonFields::default(),
    }
  }

  /// Builds an error event from a Rust error value.
  ///
  /// The type name becomes `exception_class`, the `source()` chain becomes
  /// `previous_exception`, and a backtrace is attached when capturing is
  /// enabled (`RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`).
  #[track_caller]
  pub fn from_error<E: std::error::Error + 'static>(error: &E) -> Self {
    let mut log = Self::new(std::any::type_name::<E>(), error.to_string());

    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
      causes.push(cause.to_string());
      source = cause.source();
    }
    if !causes.is_empty() {
      log.previous_exception = Some(causes.join(" <- "));
    }

    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
      log.stack_trace = Some(backtrace.to_string());
    }
    log
  }

  pub fn with_level(mut self, level: Level) -> Self {
    self.level = level;
    self
  }
}

impl LogEvent for ErrorLog {
  fn index(&self) -> &str {
    index::ERROR
  }

  fn level(&self) -> Level {
    self.level
  }

  fn message(&self) -> &str {
    &self.message
  }

  fn common(&self) -> &CommonFields {
    &self.common
  }

  fn common_mut(&mut self) -> &mut CommonFields {
    &mut self.common
  }

  fn field_map(&self) -> FieldMap {
    let mut writer = FieldWriter::new();
    self.common.write_into(&mut writer, false);
    writer
      .put("exception_class", self.exception_class.as_str())
      .put("error_code", self.error_code.as_deref())
      .put("error_file", self.error_file.as_deref())
      .put("error_line", self.error_line)
      .put("stack_trace", self.stack_trace.as_deref())
      .put("previous_exception", self.previous_exception.as_deref());
    writer.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::SourceLocation;
  use serde_json::json;

  #[derive(Debug, thiserror::Error)]
  #[error("payment declined")]
  struct Declined {
    #[source]
    cause: std::io::Error,
  }

  #[test]
  fn from_error_walks_the_source_chain() {
    let error = Declined {
      cause: std::io::Error::new(std::io::ErrorKind::TimedOut, "gateway timeout"),
    };
    let event = ErrorLog::from_error(&error);
    let fields = event.field_map();

    assert_eq!(event.message(), "payment declined");
    assert!(fields["exception_class"].as_str().unwrap().ends_with("Declined"));
    assert_eq!(fields["previous_exception"], json!("gateway timeout"));
    assert!(fields["error_file"].as_str().unwrap().ends_with("error_log.rs"));
  }

  #[test]
  fn error_never_emits_common_source_location() {
    let mut event = ErrorLog::new("Panic", "boom");
    event.common.source = Some(SourceLocation::caller());
    let fields = event.field_map();
    assert!(!fields.contains_key("file"));
    assert!(!fields.contains_key("line"));
    assert!(fields.contains_key("error_line"));
  }
}
