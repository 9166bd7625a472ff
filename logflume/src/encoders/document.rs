// Builds search-index documents from generic log records.

use super::util;
use crate::model::{index, AppMetadata, FieldMap, LogRecord, LOG_INDEX_KEY};
use serde_json::Value;
use std::collections::BTreeSet;

/// Maps a record to the target index name and the document to store in it.
pub trait DocumentBuilder: Send + Sync + 'static {
  fn index_for(&self, record: &LogRecord, fallback_index: &str) -> String;

  fn build(&self, record: &LogRecord) -> FieldMap;
}

/// Indices whose call sites are framework internals and carry no useful location.
pub fn default_no_source_location() -> BTreeSet<String> {
  [
    index::API,
    index::JOB,
    index::CRON,
    index::INTEGRATION,
    index::ORM,
    index::ERROR,
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

/// The default document layout: `@timestamp`, level, message, channel, every
/// context field, then app metadata and caller location where missing.
pub struct StandardDocumentBuilder {
  app: AppMetadata,
  no_source_location: BTreeSet<String>,
}

impl StandardDocumentBuilder {
  pub fn new(app: AppMetadata, no_source_location: BTreeSet<String>) -> Self {
    Self {
      app,
      no_source_location,
    }
  }
}

impl Default for StandardDocumentBuilder {
  fn default() -> Self {
    Self::new(AppMetadata::default(), default_no_source_location())
  }
}

impl DocumentBuilder for StandardDocumentBuilder {
  fn index_for(&self, record: &LogRecord, fallback_index: &str) -> String {
    util::sanitize_index(record.index_or(fallback_index))
  }

  fn build(&self, record: &LogRecord) -> FieldMap {
    let mut doc = FieldMap::new();
    doc.insert(
      "@timestamp".to_string(),
      Value::String(util::format_timestamp(&record.timestamp)),
    );
    for (key, value) in &record.context {
      if key != LOG_INDEX_KEY {
        doc.insert(key.clone(), value.clone());
      }
    }
    doc.insert("level".to_string(), Value::String(record.level.as_str().to_lowercase()));
    doc.insert("channel".to_string(), Value::String(record.channel.clone()));
    doc
      .entry("message")
      .or_insert_with(|| Value::String(record.message.clone()));

    // Convenience correlation field for dashboards that only key on request_id.
    if !doc.contains_key("request_id") {
      if let Some(trace_id) = doc.get("trace_id").cloned() {
        doc.insert("request_id".to_string(), trace_id);
      }
    }

    let app_fields = [
      ("environment", &self.app.environment),
      ("hostname", &self.app.hostname),
      ("service_name", &self.app.service_name),
      ("app_version", &self.app.app_version),
    ];
    for (key, value) in app_fields {
      if let Some(value) = value {
        doc
          .entry(key)
          .or_insert_with(|| Value::String(value.clone()));
      }
    }

    let index = record.log_index().unwrap_or(index::GENERAL);
    if !self.no_source_location.contains(index) && !doc.contains_key("file") {
      for key in ["file", "line", "function"] {
        if let Some(value) = record.extra.get(key) {
          doc.insert(key.to_string(), value.clone());
        }
      }
    }

    doc
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Level;
  use serde_json::json;

  fn record(index: &str) -> LogRecord {
    let mut context = FieldMap::new();
    context.insert(LOG_INDEX_KEY.into(), json!(index));
    context.insert("trace_id".into(), json!("t-1"));
    context.insert("session_id".into(), json!("s-9"));
    let mut extra = FieldMap::new();
    extra.insert("file".into(), json!("src/handlers.rs"));
    extra.insert("line".into(), json!(42));
    LogRecord::new("search", Level::Warning, "slow", context).with_extra(extra)
  }

  fn builder() -> StandardDocumentBuilder {
    StandardDocumentBuilder::new(
      AppMetadata {
        environment: Some("staging".into()),
        hostname: Some("web-1".into()),
        service_name: Some("billing".into()),
        app_version: None,
      },
      default_no_source_location(),
    )
  }

  #[test]
  fn document_carries_context_and_app_metadata() {
    let doc = builder().build(&record("general_log"));
    assert_eq!(doc["level"], json!("warning"));
    assert_eq!(doc["message"], json!("slow"));
    assert_eq!(doc["request_id"], json!("t-1"));
    assert_eq!(doc["session_id"], json!("s-9"));
    assert_eq!(doc["environment"], json!("staging"));
    assert_eq!(doc["hostname"], json!("web-1"));
    assert!(!doc.contains_key("app_version"));
    assert!(!doc.contains_key(LOG_INDEX_KEY));
    assert!(doc["@timestamp"].as_str().unwrap().ends_with('Z'));
    assert_eq!(doc["file"], json!("src/handlers.rs"));
    assert_eq!(doc["line"], json!(42));
  }

  #[test]
  fn excluded_indices_get_no_source_location() {
    let doc = builder().build(&record("api_log"));
    assert!(!doc.contains_key("file"));
    assert!(!doc.contains_key("line"));
  }

  #[test]
  fn index_resolution_sanitizes_and_falls_back() {
    let b = builder();
    assert_eq!(b.index_for(&record("Audit Log"), "fallback"), "audit_log");
    let bare = LogRecord::new("search", Level::Info, "m", FieldMap::new());
    assert_eq!(b.index_for(&bare, "general_log"), "general_log");
  }
}
