use super::fields::FieldWriter;
use super::{index, CommonFields, FieldMap, Level, LogEvent, SourceLocation};
use serde_json::Value;

/// A free-form application message.
///
/// This is the only category that records its call site, captured when the
/// event is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralLog {
  pub index: String,
  pub level: Level,
  pub message: String,
  pub context: FieldMap,
  pub common: CommonFields,
}

impl GeneralLog {
  #[track_caller]
  pub fn new(level: Level, message: impl Into<String>) -> Self {
    Self {
      index: index::GENERAL.to_string(),
      level,
      message: message.into(),
      context: FieldMap::new(),
      common: CommonFields {
        source: Some(SourceLocation::caller()),
        ..Default::default()
      },
    }
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.context.insert(key.into(), value.into());
    self
  }

  /// Routes the event to a custom index instead of `general_log`.
  pub fn with_index(mut self, index: impl Into<String>) -> Self {
    self.index = index.into();
    self
  }
}

impl LogEvent for GeneralLog {
  fn index(&self) -> &str {
    if self.index.is_empty() {
      index::GENERAL
    } else {
      &self.index
    }
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
    self.common.write_into(&mut writer, true);
    // Common keys win over free-form keys of the same name.
    writer.merge_free_form(&self.context);
    writer.finish()
  }
}
