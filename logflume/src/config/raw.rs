use serde::Deserialize;
use std::collections::HashMap;

use super::de::{default_buffer_size, default_version};

// --- Top Level Config ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigRaw {
  #[serde(default = "default_version")]
  pub version: u32,
  /// Channels every event is sent to. Falls back to `default_channel` when empty.
  #[serde(default)]
  pub stack: Vec<String>,
  #[serde(default)]
  pub default_channel: Option<String>,
  #[serde(default)]
  pub app: AppConfigRaw,
  #[serde(default)]
  pub limits: LimitsConfigRaw,
  #[serde(default)]
  pub accumulator: AccumulatorConfigRaw,
  #[serde(default)]
  pub internal_error_reporting: InternalErrorReportingRaw,
  #[serde(default)]
  pub channels: HashMap<String, ChannelConfigRaw>,
}

impl Default for ConfigRaw {
  fn default() -> Self {
    Self {
      version: default_version(),
      stack: Vec::new(),
      default_channel: None,
      app: Default::default(),
      limits: Default::default(),
      accumulator: Default::default(),
      internal_error_reporting: Default::default(),
      channels: HashMap::new(),
    }
  }
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct InternalErrorReportingRaw {
  #[serde(default)] // Defaults to false if not present
  pub enabled: bool,
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfigRaw {
  pub environment: Option<String>,
  pub service_name: Option<String>,
  pub app_version: Option<String>,
  /// Detected from the machine when absent.
  pub hostname: Option<String>,
}

// Numeric values are signed so out-of-range input can fall back with a warning.
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfigRaw {
  pub max_body_bytes: Option<i64>,
  pub max_bindings: Option<i64>,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AccumulatorConfigRaw {
  pub defer_by_default: Option<bool>,
  pub max_logs: Option<i64>,
  pub warn_on_limit: Option<bool>,
  pub bypass_channel: Option<String>,
}

// --- Channels ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfigRaw {
  #[serde(default)]
  pub sinks: Vec<SinkConfigRaw>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)] // "kind" determines the enum variant
pub enum SinkConfigRaw {
  File(FileSinkConfigRaw),
  SearchIndex(SearchIndexSinkConfigRaw),
  Broker(BrokerSinkConfigRaw),
  Console(ConsoleSinkConfigRaw),
  Stream(StreamSinkConfigRaw),
}

impl SinkConfigRaw {
  pub fn kind_name(&self) -> &'static str {
    match self {
      SinkConfigRaw::File(_) => "file",
      SinkConfigRaw::SearchIndex(_) => "search_index",
      SinkConfigRaw::Broker(_) => "broker",
      SinkConfigRaw::Console(_) => "console",
      SinkConfigRaw::Stream(_) => "stream",
    }
  }
}

// --- File Sink ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileSinkConfigRaw {
  pub directory: String,
  pub retention_days: Option<i64>,
}

// --- Search Index Sink ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SearchIndexSinkConfigRaw {
  pub base_url: String,
  pub fallback_index: Option<String>,
  pub username: Option<String>,
  pub password: Option<String>,
  /// Human-readable duration, e.g. "2s" or "500ms".
  pub timeout: Option<String>,
  pub max_retries: Option<i64>,
  pub retry_backoff: Option<String>,
  pub verify_tls: Option<bool>,
  pub silent: Option<bool>,
  /// Builder identifier. Only "standard" is built in.
  pub document_builder: Option<String>,
  /// Indices whose documents never carry the caller location.
  pub no_source_location: Option<Vec<String>>,
}

// --- Broker Sink ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BrokerSinkConfigRaw {
  pub rest_proxy_url: String,
  pub topic: String,
  pub timeout: Option<String>,
  pub verify_tls: Option<bool>,
  pub silent: Option<bool>,
  /// "flat" (default) or "index_keyed".
  pub value_builder: Option<String>,
}

// --- Console Sink ---
#[derive(Debug, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConsoleSinkConfigRaw {
  /// "stdout" (default) or "stderr".
  pub target: Option<String>,
  pub pattern: Option<String>,
}

// --- Stream Sink ---
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StreamSinkConfigRaw {
  /// The capacity of the underlying `fibre` channel.
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,
}
