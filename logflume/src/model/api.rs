use super::fields::FieldWriter;
use super::{index, CommonFields, FieldMap, Level, LogEvent};
use std::collections::BTreeMap;

/// An inbound HTTP request handled by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiLog {
  pub level: Level,
  pub message: String,
  pub http_method: String,
  pub path: String,
  pub route: Option<String>,
  pub status_code: Option<u16>,
  pub duration_ms: Option<f64>,
  pub request_body: Option<String>,
  pub response_body: Option<String>,
  pub request_headers: BTreeMap<String, String>,
  pub response_headers: BTreeMap<String, String>,
  pub request_size: Option<u64>,
  pub response_size: Option<u64>,
  pub client_ip: Option<String>,
  pub user_agent: Option<String>,
  pub common: CommonFields,
}

impl ApiLog {
  pub fn new(http_method: impl Into<String>, path: impl Into<String>) -> Self {
    let http_method = http_method.into().to_uppercase();
    let path = path.into();
    Self {
      level: Level::Info,
      message: format!("{} {}", http_method, path),
      http_method,
      path,
      route: None,
      status_code: None,
      duration_ms: None,
      request_body: None,
      response_body: None,
      request_headers: BTreeMap::new(),
      response_headers: BTreeMap::new(),
      request_size: None,
      response_size: None,
      client_ip: None,
      user_agent: None,
      common: CommonFields::default(),
    }
  }

  /// Records the response status and derives the level from it.
  pub fn with_status(mut self, status_code: u16) -> Self {
    self.status_code = Some(status_code);
    self.level = level_for_status(status_code);
    self
  }

  pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
    self.duration_ms = Some(duration_ms);
    self
  }
}

/// 5xx is an error, 4xx a warning, anything else informational.
pub(crate) fn level_for_status(status_code: u16) -> Level {
  match status_code {
    500.. => Level::Error,
    400..=499 => Level::Warning,
    _ => Level::Info,
  }
}

impl LogEvent for ApiLog {
  fn index(&self) -> &str {
    index::API
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
      .put("http_method", self.http_method.as_str())
      .put("path", self.path.as_str())
      .put("route", self.route.as_deref())
      .put("status_code", self.status_code)
      .put("duration_ms", self.duration_ms)
      .put_body("request_body", self.request_body.as_deref())
      .put_body("response_body", self.response_body.as_deref())
      .put_headers("request_headers", &self.request_headers)
      .put_headers("response_headers", &self.response_headers)
      .put("request_size", self.request_size)
      .put("response_size", self.response_size)
      .put("client_ip", self.client_ip.as_deref())
      .put("user_agent", self.user_agent.as_deref());
    writer.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::SourceLocation;
  use serde_json::json;

  #[test]
  fn api_field_map_is_flat_and_preformatted() {
    let mut event = ApiLog::new("post", "/orders").with_status(201).with_duration_ms(12.5);
    event.request_body = Some("{\"sku\":\"A1\"}".to_string());
    event.response_body = Some("created".to_string());
    event
      .request_headers
      .insert("content-type".to_string(), "application/json".to_string());
    event.request_size = Some(12);
    event.common.request_id = Some("req-1".to_string());
    event.common.source = Some(SourceLocation::caller());

    let fields = event.field_map();

    assert_eq!(event.message(), "POST /orders");
    assert_eq!(event.level(), Level::Info);
    assert_eq!(fields["http_method"], json!("POST"));
    assert_eq!(fields["status_code"], json!(201));
    assert_eq!(fields["request_body"], json!("{\n  \"sku\": \"A1\"\n}"));
    assert_eq!(fields["response_body"], json!("created"));
    assert_eq!(
      fields["request_headers"],
      json!("{\n  \"content-type\": \"application/json\"\n}")
    );
    assert_eq!(fields["request_size"], json!(12));
    assert_eq!(fields["request_id"], json!("req-1"));
    // Source location is only meaningful for general events.
    assert!(!fields.contains_key("file"));
    assert!(!fields.contains_key("response_headers"));
    assert!(!fields.contains_key("route"));
  }

  #[test]
  fn status_drives_level() {
    assert_eq!(ApiLog::new("GET", "/").with_status(503).level(), Level::Error);
    assert_eq!(ApiLog::new("GET", "/").with_status(404).level(), Level::Warning);
    assert_eq!(ApiLog::new("GET", "/").with_status(302).level(), Level::Info);
  }
}
