use super::transport::{HttpRequest, HttpTransport, KAFKA_JSON_CONTENT_TYPE};
use super::{contain, SinkError, SinkHandler, WriteStatus};
use crate::encoders::ValueBuilder;
use crate::error::{Error, Result};
use crate::error_handling::{ErrorReporter, InternalErrorSource};
use crate::model::LogRecord;

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSinkOptions {
  pub rest_proxy_url: String,
  pub topic: String,
  pub timeout: Duration,
  pub silent: bool,
}

impl Default for BrokerSinkOptions {
  fn default() -> Self {
    Self {
      rest_proxy_url: "http://localhost:8082".to_string(),
      topic: "logs".to_string(),
      timeout: Duration::from_secs(2),
      silent: true,
    }
  }
}

/// Produces records to a topic through a Kafka REST proxy.
///
/// A single attempt is made per request; there is no retry.
pub struct BrokerSink {
  name: String,
  topic_url: String,
  options: BrokerSinkOptions,
  transport: Arc<dyn HttpTransport>,
  builder: Arc<dyn ValueBuilder>,
  reporter: Arc<ErrorReporter>,
}

impl BrokerSink {
  pub fn new(
    name: impl Into<String>,
    options: BrokerSinkOptions,
    transport: Arc<dyn HttpTransport>,
    builder: Arc<dyn ValueBuilder>,
    reporter: Arc<ErrorReporter>,
  ) -> Result<Self> {
    let name = name.into();
    let setup_error = |reason: String| Error::SinkSetup {
      sink_name: name.clone(),
      reason,
    };
    let mut url = Url::parse(&options.rest_proxy_url)
      .map_err(|e| setup_error(format!("invalid rest_proxy_url '{}': {}", options.rest_proxy_url, e)))?;
    url
      .path_segments_mut()
      .map_err(|_| setup_error(format!("rest_proxy_url '{}' cannot carry a path", options.rest_proxy_url)))?
      .pop_if_empty()
      .push("topics")
      .push(&options.topic);
    let topic_url = url.to_string();

    Ok(Self {
      name,
      topic_url,
      options,
      transport,
      builder,
      reporter,
    })
  }

  /// `{rest_proxy_url}/topics/{topic}`.
  pub fn topic_url(&self) -> &str {
    &self.topic_url
  }

  fn produce(&self, values: Vec<Value>) -> Result<(), SinkError> {
    let records: Vec<Value> = values.into_iter().map(|value| json!({ "value": value })).collect();
    let body = serde_json::to_vec(&json!({ "records": records }))?;
    let request = HttpRequest {
      url: self.topic_url.clone(),
      content_type: KAFKA_JSON_CONTENT_TYPE,
      body,
      basic_auth: None,
      timeout: self.options.timeout,
    };
    let response = self.transport.post(&request)?;
    if response.is_success() {
      Ok(())
    } else {
      Err(SinkError::Status {
        status: response.status,
        body: response.body,
      })
    }
  }

  fn contain(&self, error: SinkError, channel: &str, count: usize) -> Result<WriteStatus, SinkError> {
    contain(
      error,
      self.options.silent,
      &self.reporter,
      InternalErrorSource::SinkWrite {
        channel: channel.to_string(),
        sink: self.name.clone(),
      },
      Some(format!("topic: {}, records: {}", self.options.topic, count)),
    )
  }
}

impl SinkHandler for BrokerSink {
  fn name(&self) -> &str {
    &self.name
  }

  fn write(&self, record: &LogRecord) -> Result<WriteStatus, SinkError> {
    match self.produce(vec![self.builder.build(record)]) {
      Ok(()) => Ok(WriteStatus::Written),
      Err(e) => self.contain(e, &record.channel, 1),
    }
  }

  fn supports_batch(&self) -> bool {
    true
  }

  fn write_batch(&self, records: &[LogRecord]) -> Result<WriteStatus, SinkError> {
    if records.is_empty() {
      return Ok(WriteStatus::Written);
    }
    let values = records.iter().map(|r| self.builder.build(r)).collect();
    match self.produce(values) {
      Ok(()) => Ok(WriteStatus::Written),
      Err(e) => self.contain(e, &records[0].channel, records.len()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encoders::{FlatValueBuilder, IndexKeyedValueBuilder};
  use crate::model::{FieldMap, Level, LOG_INDEX_KEY};
  use crate::sinks::transport::testing::{RecordingTransport, Scripted};

  fn sink(transport: Arc<RecordingTransport>, silent: bool, builder: Arc<dyn ValueBuilder>) -> BrokerSink {
    let options = BrokerSinkOptions {
      rest_proxy_url: "http://proxy.local:8082".to_string(),
      topic: "app-logs".to_string(),
      silent,
      ..Default::default()
    };
    BrokerSink::new("broker", options, transport, builder, Arc::default()).unwrap()
  }

  fn record(message: &str) -> LogRecord {
    let mut context = FieldMap::new();
    context.insert(LOG_INDEX_KEY.into(), json!("job_log"));
    LogRecord::new("broker", Level::Info, message, context)
  }

  #[test]
  fn single_write_wraps_value_in_records() {
    let transport = Arc::new(RecordingTransport::default());
    let sink = sink(transport.clone(), true, Arc::new(FlatValueBuilder));

    assert!(sink.write(&record("sent")).unwrap().is_written());

    let requests = transport.requests.lock();
    assert_eq!(requests[0].url, "http://proxy.local:8082/topics/app-logs");
    assert_eq!(requests[0].content_type, KAFKA_JSON_CONTENT_TYPE);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["records"][0]["value"]["message"], json!("sent"));
  }

  #[test]
  fn batch_is_one_request_in_order() {
    let transport = Arc::new(RecordingTransport::default());
    let sink = sink(transport.clone(), true, Arc::new(IndexKeyedValueBuilder::default()));
    let records = vec![record("a"), record("b"), record("c")];

    assert!(sink.write_batch(&records).unwrap().is_written());

    assert_eq!(transport.request_count(), 1);
    let body: Value = serde_json::from_str(&transport.body_of(0)).unwrap();
    let messages: Vec<&Value> = body["records"]
      .as_array()
      .unwrap()
      .iter()
      .map(|r| &r["value"]["job_log"]["message"])
      .collect();
    assert_eq!(messages, vec![&json!("a"), &json!("b"), &json!("c")]);
  }

  #[test]
  fn failures_are_not_retried() {
    let transport = Arc::new(RecordingTransport::with_script(vec![Scripted::Respond(
      503,
      "down".to_string(),
    )]));
    let loud = sink(transport.clone(), false, Arc::new(FlatValueBuilder));

    assert!(matches!(
      loud.write(&record("x")),
      Err(SinkError::Status { status: 503, .. })
    ));
    assert_eq!(transport.request_count(), 1);
  }

  #[test]
  fn silent_sink_suppresses_transport_errors() {
    let transport = Arc::new(RecordingTransport::with_script(vec![Scripted::Fail(
      "refused".to_string(),
    )]));
    let quiet = sink(transport, true, Arc::new(FlatValueBuilder));

    assert!(quiet.write(&record("x")).unwrap().is_suppressed());
  }
}
