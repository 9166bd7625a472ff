// The HTTP capability used by the search-index and broker sinks.

use super::SinkError;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// A single POST request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub url: String,
  pub content_type: &'static str,
  pub body: Vec<u8>,
  /// Username and optional password for HTTP basic auth.
  pub basic_auth: Option<(String, Option<String>)>,
  pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Sends bytes and returns the status and body, or a transport-level error.
///
/// Non-2xx responses are returned as `Ok`; callers decide what they mean.
pub trait HttpTransport: Send + Sync {
  fn post(&self, request: &HttpRequest) -> Result<HttpResponse, SinkError>;
}

/// Blocking `reqwest` client.
pub struct ReqwestTransport {
  client: reqwest::blocking::Client,
}

impl ReqwestTransport {
  pub fn new(verify_tls: bool) -> Result<Self, SinkError> {
    let client = reqwest::blocking::Client::builder()
      .danger_accept_invalid_certs(!verify_tls)
      .build()
      .map_err(|e| SinkError::Transport(e.to_string()))?;
    Ok(Self { client })
  }
}

impl HttpTransport for ReqwestTransport {
  fn post(&self, request: &HttpRequest) -> Result<HttpResponse, SinkError> {
    let mut builder = self
      .client
      .post(&request.url)
      .header(CONTENT_TYPE, request.content_type)
      .timeout(request.timeout)
      .body(request.body.clone());
    if let Some((username, password)) = &request.basic_auth {
      builder = builder.basic_auth(username, password.as_ref());
    }

    let response = builder
      .send()
      .map_err(|e| SinkError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
      .text()
      .map_err(|e| SinkError::Transport(e.to_string()))?;
    Ok(HttpResponse { status, body })
  }
}
