use super::api::level_for_status;
use super::fields::FieldWriter;
use super::{index, CommonFields, FieldMap, Level, LogEvent};
use std::collections::BTreeMap;

/// An outbound call to a third-party service.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationLog {
  pub level: Level,
  pub message: String,
  pub integration_name: String,
  pub http_method: String,
  pub url: String,
  pub status_code: Option<u16>,
  pub duration_ms: Option<f64>,
  pub request_body: Option<String>,
  pub response_body: Option<String>,
  pub request_headers: BTreeMap<String, String>,
  pub response_headers: BTreeMap<String, String>,
  pub common: CommonFields,
}

impl IntegrationLog {
  pub fn new(
    integration_name: impl Into<String>,
    http_method: impl Into<String>,
    url: impl Into<String>,
  ) -> Self {
    let integration_name = integration_name.into();
    let http_method = http_method.into().to_uppercase();
    let url = url.into();
    Self {
      level: Level::Info,
      message: format!("{} {} {}", integration_name, http_method, url),
      integration_name,
      http_method,
      url,
      status_code: None,
      duration_ms: None,
      request_body: None,
      response_body: None,
      request_headers: BTreeMap::new(),
      response_headers: BTreeMap::new(),
      common: CommonFields::default(),
    }
  }

  pub fn with_status(mut self, status_code: u16) -> Self {
    self.status_code = Some(status_code);
    self.level = level_for_status(status_code);
    self
  }
}

impl LogEvent for IntegrationLog {
  fn index(&self) -> &str {
    index::INTEGRATION
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
      .put("integration_name", self.integration_name.as_str())
      .put("http_method", self.http_method.as_str())
      .put("url", self.url.as_str())
      .put("status_code", self.status_code)
      .put("duration_ms", self.duration_ms)
      .put_body("request_body", self.request_body.as_deref())
      .put_body("response_body", self.response_body.as_deref())
      .put_headers("request_headers", &self.request_headers)
      .put_headers("response_headers", &self.response_headers);
    writer.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn integration_fields_share_api_names() {
    let mut event = IntegrationLog::new("stripe", "post", "https://api.stripe.com/v1/charges").with_status(502);
    event.response_body = Some("[1,2]".to_string());
    let fields = event.field_map();
    assert_eq!(event.level(), Level::Error);
    assert_eq!(fields["http_method"], json!("POST"));
    assert_eq!(fields["integration_name"], json!("stripe"));
    assert_eq!(fields["response_body"], json!("[\n  1,\n  2\n]"));
  }
}
