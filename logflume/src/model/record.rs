use super::{FieldMap, Level, LOG_INDEX_KEY};
use chrono::{DateTime, Utc};

/// The generic record handed to sink handlers and held by the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
  /// Destination channel name.
  pub channel: String,
  pub level: Level,
  pub message: String,
  /// Event fields plus `log_index`.
  pub context: FieldMap,
  /// Enrichment that is not part of the event itself, such as the caller location.
  pub extra: FieldMap,
  pub timestamp: DateTime<Utc>,
}

impl LogRecord {
  pub fn new(
    channel: impl Into<String>,
    level: Level,
    message: impl Into<String>,
    context: FieldMap,
  ) -> Self {
    Self {
      channel: channel.into(),
      level,
      message: message.into(),
      context,
      extra: FieldMap::new(),
      timestamp: Utc::now(),
    }
  }

  pub fn with_extra(mut self, extra: FieldMap) -> Self {
    self.extra = extra;
    self
  }

  /// The routing index carried in the context, if present and non-empty.
  pub fn log_index(&self) -> Option<&str> {
    self
      .context
      .get(LOG_INDEX_KEY)
      .and_then(|v| v.as_str())
      .filter(|s| !s.is_empty())
  }

  pub fn index_or<'a>(&'a self, fallback: &'a str) -> &'a str {
    self.log_index().unwrap_or(fallback)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn empty_log_index_falls_back() {
    let mut context = FieldMap::new();
    context.insert(LOG_INDEX_KEY.into(), json!(""));
    let record = LogRecord::new("local", Level::Info, "hi", context);
    assert_eq!(record.log_index(), None);
    assert_eq!(record.index_or("general_log"), "general_log");
  }
}
