use super::{FieldMap, LOG_INDEX_KEY};
use serde_json::Value;
use std::collections::BTreeMap;

/// Fields holding captured request/response payloads.
const BODY_FIELDS: &[&str] = &["request_body", "response_body", "payload"];
const BINDINGS_FIELD: &str = "bindings";
const TRUNCATION_MARKER: &str = "…[truncated]";

/// Accumulates category fields, dropping nulls and the reserved routing key.
pub(crate) struct FieldWriter {
  map: FieldMap,
}

impl FieldWriter {
  pub(crate) fn new() -> Self {
    Self { map: FieldMap::new() }
  }

  /// Inserts `value` unless it is null. `Option::None` converts to null.
  pub(crate) fn put(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
    let value = value.into();
    if !value.is_null() && key != LOG_INDEX_KEY {
      self.map.insert(key.to_string(), value);
    }
    self
  }

  /// Inserts a captured body, pretty-printed when it parses as JSON.
  pub(crate) fn put_body(&mut self, key: &str, body: Option<&str>) -> &mut Self {
    if let Some(body) = body {
      self.put(key, pretty_json_or_raw(body));
    }
    self
  }

  /// Inserts a header map as a pretty JSON string. Empty maps are skipped.
  pub(crate) fn put_headers(&mut self, key: &str, headers: &BTreeMap<String, String>) -> &mut Self {
    if !headers.is_empty() {
      if let Ok(rendered) = serde_json::to_string_pretty(headers) {
        self.put(key, rendered);
      }
    }
    self
  }

  /// Inserts an arbitrary JSON value serialized as a pretty string.
  pub(crate) fn put_json_string(&mut self, key: &str, value: Option<&Value>) -> &mut Self {
    if let Some(value) = value.filter(|v| !v.is_null()) {
      if let Ok(rendered) = serde_json::to_string_pretty(value) {
        self.put(key, rendered);
      }
    }
    self
  }

  /// Merges free-form entries without overwriting keys that are already set.
  pub(crate) fn merge_free_form(&mut self, entries: &FieldMap) -> &mut Self {
    for (key, value) in entries {
      if !self.map.contains_key(key) {
        self.put(key, value.clone());
      }
    }
    self
  }

  pub(crate) fn finish(self) -> FieldMap {
    self.map
  }
}

/// Re-serializes `raw` with pretty-printing if it is valid JSON, otherwise returns it unchanged.
pub fn pretty_json_or_raw(raw: &str) -> String {
  match serde_json::from_str::<Value>(raw) {
    Ok(parsed) if parsed.is_object() || parsed.is_array() => {
      serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| raw.to_string())
    }
    _ => raw.to_string(),
  }
}

/// Size limits applied to captured payloads before they are buffered.
///
/// A limit of `0` disables that check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
  pub max_body_bytes: usize,
  pub max_bindings: usize,
}

impl Default for FieldLimits {
  fn default() -> Self {
    Self {
      max_body_bytes: 16 * 1024,
      max_bindings: 100,
    }
  }
}

impl FieldLimits {
  pub fn unlimited() -> Self {
    Self {
      max_body_bytes: 0,
      max_bindings: 0,
    }
  }

  pub fn apply(&self, map: &mut FieldMap) {
    if self.max_body_bytes > 0 {
      for key in BODY_FIELDS {
        if let Some(Value::String(body)) = map.get_mut(*key) {
          truncate_at_char_boundary(body, self.max_body_bytes);
        }
      }
    }
    if self.max_bindings > 0 {
      if let Some(Value::Array(bindings)) = map.get_mut(BINDINGS_FIELD) {
        bindings.truncate(self.max_bindings);
      }
    }
  }
}

fn truncate_at_char_boundary(s: &mut String, max_bytes: usize) {
  if s.len() <= max_bytes {
    return;
  }
  let mut end = max_bytes;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  s.truncate(end);
  s.push_str(TRUNCATION_MARKER);
}
