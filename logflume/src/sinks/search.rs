use super::transport::{HttpRequest, HttpResponse, HttpTransport, JSON_CONTENT_TYPE, NDJSON_CONTENT_TYPE};
use super::{contain, SinkError, SinkHandler, WriteStatus};
use crate::encoders::DocumentBuilder;
use crate::error::{Error, Result};
use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::{index, LogRecord};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Connection and retry settings for a [`SearchIndexSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchIndexSinkOptions {
  pub base_url: String,
  /// Index used when a record carries no routing index.
  pub fallback_index: String,
  pub username: Option<String>,
  pub password: Option<String>,
  pub timeout: Duration,
  /// Total attempts per request, including the first.
  pub max_retries: u32,
  /// Delay before the second attempt; doubles after every failure.
  pub retry_backoff: Duration,
  pub silent: bool,
}

impl Default for SearchIndexSinkOptions {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:9200".to_string(),
      fallback_index: index::GENERAL.to_string(),
      username: None,
      password: None,
      timeout: Duration::from_secs(2),
      max_retries: 3,
      retry_backoff: Duration::from_secs(1),
      silent: true,
    }
  }
}

// One `_bulk` request body and the batch positions it carries.
struct BulkGroup {
  index: String,
  body: Vec<u8>,
  positions: Vec<usize>,
}

/// Writes documents to an Elasticsearch-compatible HTTP index.
///
/// Single records go to `{base_url}/{index}/_doc`; batches are grouped by
/// index and sent as NDJSON to `{base_url}/{index}/_bulk`.
pub struct SearchIndexSink {
  name: String,
  base_url: Url,
  options: SearchIndexSinkOptions,
  transport: Arc<dyn HttpTransport>,
  builder: Arc<dyn DocumentBuilder>,
  reporter: Arc<ErrorReporter>,
}

impl SearchIndexSink {
  pub fn new(
    name: impl Into<String>,
    options: SearchIndexSinkOptions,
    transport: Arc<dyn HttpTransport>,
    builder: Arc<dyn DocumentBuilder>,
    reporter: Arc<ErrorReporter>,
  ) -> Result<Self> {
    let name = name.into();
    let base_url = Url::parse(&options.base_url).map_err(|e| Error::SinkSetup {
      sink_name: name.clone(),
      reason: format!("invalid base_url '{}': {}", options.base_url, e),
    })?;
    if base_url.cannot_be_a_base() {
      return Err(Error::SinkSetup {
        sink_name: name,
        reason: format!("base_url '{}' cannot carry a path", options.base_url),
      });
    }
    Ok(Self {
      name,
      base_url,
      options,
      transport,
      builder,
      reporter,
    })
  }

  pub fn options(&self) -> &SearchIndexSinkOptions {
    &self.options
  }

  /// `{base_url}/{index}/{endpoint}` with the index percent-encoded as one path segment.
  pub fn endpoint_url(&self, index: &str, endpoint: &str) -> String {
    let mut url = self.base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push(index).push(endpoint);
    }
    url.to_string()
  }

  fn request(&self, url: String, content_type: &'static str, body: Vec<u8>) -> HttpRequest {
    HttpRequest {
      url,
      content_type,
      body,
      basic_auth: self
        .options
        .username
        .as_ref()
        .map(|user| (user.clone(), self.options.password.clone())),
      timeout: self.options.timeout,
    }
  }

  /// Retries transport errors and 5xx responses with exponential backoff.
  fn post_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse, SinkError> {
    let attempts = self.options.max_retries.max(1);
    let mut delay = self.options.retry_backoff;
    let mut attempt = 1;
    loop {
      let error = match self.transport.post(request) {
        Ok(response) if response.is_success() => {
          if attempt > 1 {
            tracing::debug!(sink = %self.name, attempt, "search request succeeded after retry");
          }
          return Ok(response);
        }
        Ok(response) => SinkError::Status {
          status: response.status,
          body: response.body,
        },
        Err(e) => e,
      };

      if !error.is_retryable() || attempt >= attempts {
        if attempt > 1 {
          tracing::warn!(sink = %self.name, attempts = attempt, error = %error, "search request failed after all attempts");
        }
        return Err(error);
      }

      tracing::warn!(
        sink = %self.name,
        attempt,
        max_attempts = attempts,
        delay_ms = delay.as_millis() as u64,
        error = %error,
        "retryable search error, will retry after delay"
      );
      if !delay.is_zero() {
        std::thread::sleep(delay);
      }
      delay = delay.saturating_mul(2);
      attempt += 1;
    }
  }

  fn write_one(&self, record: &LogRecord) -> Result<(), SinkError> {
    let index = self.builder.index_for(record, &self.options.fallback_index);
    let document = self.builder.build(record);
    let body = serde_json::to_vec(&document)?;
    let request = self.request(self.endpoint_url(&index, "_doc"), JSON_CONTENT_TYPE, body);
    self.post_with_retry(&request)?;
    Ok(())
  }

  /// Sends one bulk request per index and returns the number of rejected documents.
  ///
  /// A failed index does not stop the others. When some indices were accepted
  /// the error is [`SinkError::Incomplete`] naming the records of the failed ones.
  fn write_bulk(&self, records: &[LogRecord]) -> Result<usize, SinkError> {
    let mut groups: Vec<BulkGroup> = Vec::new();
    for (position, record) in records.iter().enumerate() {
      let index = self.builder.index_for(record, &self.options.fallback_index);
      let document = self.builder.build(record);
      let slot = match groups.iter().position(|g| g.index == index) {
        Some(slot) => slot,
        None => {
          groups.push(BulkGroup {
            index,
            body: Vec::new(),
            positions: Vec::new(),
          });
          groups.len() - 1
        }
      };
      let group = &mut groups[slot];
      group.body.extend_from_slice(b"{\"index\":{}}\n");
      serde_json::to_writer(&mut group.body, &document)?;
      group.body.push(b'\n');
      group.positions.push(position);
    }

    let mut rejected = 0;
    let mut pending = Vec::new();
    let mut first_error = None;
    for group in groups {
      let request = self.request(self.endpoint_url(&group.index, "_bulk"), NDJSON_CONTENT_TYPE, group.body);
      match self.post_with_retry(&request) {
        Ok(response) => rejected += self.inspect_bulk_response(&group.index, &response.body),
        Err(e) => {
          tracing::debug!(sink = %self.name, index = %group.index, error = %e, "bulk request for index failed");
          pending.extend(group.positions);
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      None => Ok(rejected),
      Some(e) if pending.len() == records.len() => Err(e),
      Some(e) => {
        pending.sort_unstable();
        Err(SinkError::Incomplete {
          pending,
          rejected,
          source: Box::new(e),
        })
      }
    }
  }

  /// Counts per-document failures in a bulk response flagged with `errors: true`.
  fn inspect_bulk_response(&self, index: &str, body: &str) -> usize {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
      return 0;
    };
    if parsed.get("errors").and_then(Value::as_bool) != Some(true) {
      return 0;
    }

    let items = parsed
      .get("items")
      .and_then(Value::as_array)
      .map(Vec::as_slice)
      .unwrap_or_default();
    let mut rejected = 0;
    for (position, item) in items.iter().enumerate() {
      // Each item is keyed by its action, e.g. {"index": {"status": 400, "error": {..}}}.
      let error = item
        .as_object()
        .and_then(|actions| actions.values().find_map(|result| result.get("error")));
      if let Some(error) = error {
        rejected += 1;
        if !self.options.silent {
          self.reporter.report(
            InternalErrorSource::BulkItem {
              sink: self.name.clone(),
              index: index.to_string(),
            },
            error,
            Some(format!("item: {}", position)),
          );
        }
      }
    }

    if rejected > 0 && !self.options.silent {
      tracing::warn!(sink = %self.name, index, rejected, total = items.len(), "bulk request partially rejected");
    }
    rejected
  }

  fn contain(&self, error: SinkError, channel: &str, context: String) -> Result<WriteStatus, SinkError> {
    contain(
      error,
      self.options.silent,
      &self.reporter,
      InternalErrorSource::SinkWrite {
        channel: channel.to_string(),
        sink: self.name.clone(),
      },
      Some(context),
    )
  }
}

impl SinkHandler for SearchIndexSink {
  fn name(&self) -> &str {
    &self.name
  }

  fn write(&self, record: &LogRecord) -> Result<WriteStatus, SinkError> {
    match self.write_one(record) {
      Ok(()) => Ok(WriteStatus::Written),
      Err(e) => {
        let index = self.builder.index_for(record, &self.options.fallback_index);
        self.contain(e, &record.channel, format!("index: {}", index))
      }
    }
  }

  fn supports_batch(&self) -> bool {
    true
  }

  fn write_batch(&self, records: &[LogRecord]) -> Result<WriteStatus, SinkError> {
    if records.is_empty() {
      return Ok(WriteStatus::Written);
    }
    match self.write_bulk(records) {
      Ok(0) => Ok(WriteStatus::Written),
      Ok(rejected) => Ok(WriteStatus::PartiallyWritten { rejected }),
      Err(e) => self.contain(e, &records[0].channel, format!("bulk of {} records", records.len())),
    }
  }
}
