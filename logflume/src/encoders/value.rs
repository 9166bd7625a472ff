// Builds message-broker record values from generic log records.

use super::util;
use crate::model::{index, FieldMap, LogRecord, LOG_INDEX_KEY};
use serde_json::{json, Value};

/// Context keys that describe routing rather than the event itself.
const BROKER_METADATA_KEYS: &[&str] = &[LOG_INDEX_KEY, "channel"];

pub trait ValueBuilder: Send + Sync + 'static {
  fn build(&self, record: &LogRecord) -> Value;
}

/// `{timestamp, level, channel, message, context, extra}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatValueBuilder;

impl ValueBuilder for FlatValueBuilder {
  fn build(&self, record: &LogRecord) -> Value {
    json!({
      "timestamp": util::format_timestamp(&record.timestamp),
      "level": record.level.as_str(),
      "channel": record.channel,
      "message": record.message,
      "context": record.context,
      "extra": record.extra,
    })
  }
}

/// `{<index>: {..fields.., "@timestamp"}}`, keyed by the record's routing index.
#[derive(Debug, Clone)]
pub struct IndexKeyedValueBuilder {
  fallback_index: String,
}

impl IndexKeyedValueBuilder {
  pub fn new(fallback_index: impl Into<String>) -> Self {
    Self {
      fallback_index: fallback_index.into(),
    }
  }
}

impl Default for IndexKeyedValueBuilder {
  fn default() -> Self {
    Self::new(index::GENERAL)
  }
}

impl ValueBuilder for IndexKeyedValueBuilder {
  fn build(&self, record: &LogRecord) -> Value {
    let mut fields = FieldMap::new();
    for (key, value) in &record.context {
      if !BROKER_METADATA_KEYS.contains(&key.as_str()) {
        fields.insert(key.clone(), value.clone());
      }
    }
    fields
      .entry("message")
      .or_insert_with(|| Value::String(record.message.clone()));
    fields
      .entry("level")
      .or_insert_with(|| Value::String(record.level.as_str().to_string()));
    fields.insert(
      "@timestamp".to_string(),
      Value::String(util::format_timestamp(&record.timestamp)),
    );

    let mut keyed = FieldMap::new();
    keyed.insert(
      record.index_or(&self.fallback_index).to_string(),
      Value::Object(fields),
    );
    Value::Object(keyed)
  }
}
