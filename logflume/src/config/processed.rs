// src/config/processed.rs
use crate::config::de::{default_buffer_size, non_negative, parse_duration};
use crate::config::raw::{
  BrokerSinkConfigRaw, ConfigRaw, ConsoleSinkConfigRaw, FileSinkConfigRaw, SearchIndexSinkConfigRaw,
  SinkConfigRaw,
};
use crate::encoders::{default_no_source_location, pattern::DEFAULT_PATTERN};
use crate::error::Error;
use crate::model::{index, AppMetadata, FieldLimits};
use crate::pipeline::{resolve_stack, AccumulatorOptions};
use crate::sinks::{BrokerSinkOptions, ConsoleTarget, SearchIndexSinkOptions};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CHANNEL: &str = "default";
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

// --- Processed Top Level Config ---
#[derive(Debug, Clone)]
pub struct ConfigInternal {
  pub stack: Vec<String>,
  pub default_channel: String,
  pub app: AppMetadata,
  pub limits: FieldLimits,
  pub accumulator: AccumulatorOptions,
  pub defer_by_default: bool,
  /// Capacity of the internal error channel, `None` when reporting is disabled.
  pub error_reporting: Option<usize>,
  pub channels: BTreeMap<String, ChannelInternal>,
}

#[derive(Debug, Clone)]
pub struct ChannelInternal {
  pub name: String,
  pub sinks: Vec<SinkInternal>,
}

// --- Processed Sink Config ---
#[derive(Debug, Clone)]
pub struct SinkInternal {
  pub name: String,
  pub kind: SinkKindInternal,
}

#[derive(Debug, Clone)]
pub enum SinkKindInternal {
  File(FileSinkInternal),
  SearchIndex(SearchIndexSinkInternal),
  Broker(BrokerSinkInternal),
  Console(ConsoleSinkInternal),
  Stream(StreamSinkInternal),
}

#[derive(Debug, Clone)]
pub struct FileSinkInternal {
  pub directory: PathBuf,
  pub retention_days: u32,
}

#[derive(Debug, Clone)]
pub struct SearchIndexSinkInternal {
  pub options: SearchIndexSinkOptions,
  pub verify_tls: bool,
  pub document_builder: DocumentBuilderKind,
  pub no_source_location: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct BrokerSinkInternal {
  pub options: BrokerSinkOptions,
  pub verify_tls: bool,
  pub value_builder: ValueBuilderKind,
}

#[derive(Debug, Clone)]
pub struct ConsoleSinkInternal {
  pub target: ConsoleTarget,
  pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct StreamSinkInternal {
  pub buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentBuilderKind {
  Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueBuilderKind {
  Flat,
  IndexKeyed,
}

/// Result of processing: the usable configuration plus every value that was
/// rejected and replaced on the way. Each warning is an
/// [`Error::InvalidConfigValue`].
#[derive(Debug)]
pub struct ProcessedConfig {
  pub config: ConfigInternal,
  pub warnings: Vec<Error>,
}

// Collects rejected values while processing continues with defaults.
#[derive(Default)]
struct Warnings(Vec<Error>);

impl Warnings {
  fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
    self.0.push(Error::InvalidConfigValue {
      field: field.into(),
      message: message.into(),
    });
  }

  fn duration(&mut self, field: String, raw: Option<&str>, default: Duration, allow_zero: bool) -> Duration {
    match raw {
      None => default,
      Some(value) => match parse_duration(value) {
        Ok(d) if allow_zero || !d.is_zero() => d,
        Ok(_) => {
          self.push(field, format!("zero duration not allowed, using {:?}", default));
          default
        }
        Err(e) => {
          self.push(field, format!("invalid duration '{}' ({}), using {:?}", value, e, default));
          default
        }
      },
    }
  }

  fn url(&mut self, field: String, raw: &str) -> Option<String> {
    match Url::parse(raw) {
      Ok(url) if !url.cannot_be_a_base() => Some(raw.to_string()),
      Ok(_) => {
        self.push(field, format!("'{}' cannot carry a path, sink dropped", raw));
        None
      }
      Err(e) => {
        self.push(field, format!("invalid URL '{}' ({}), sink dropped", raw, e));
        None
      }
    }
  }
}

// --- Conversion and Validation Logic ---

/// Processes the raw, deserialized configuration into a validated internal
/// representation. Never fails: bad values fall back to defaults and are
/// returned as warnings.
pub fn process_raw_config(raw_config: ConfigRaw) -> ProcessedConfig {
  let mut warnings = Warnings::default();

  if raw_config.version != 1 {
    warnings.push(
      "version",
      format!("unsupported version {}, reading as version 1", raw_config.version),
    );
  }

  // 1. Channels, in name order so sink construction is deterministic.
  let mut channels = BTreeMap::new();
  let mut raw_channels: Vec<_> = raw_config.channels.into_iter().collect();
  raw_channels.sort_by(|a, b| a.0.cmp(&b.0));

  for (channel_name, raw_channel) in raw_channels {
    let mut sinks: Vec<SinkInternal> = Vec::new();
    for (position, raw_sink) in raw_channel.sinks.into_iter().enumerate() {
      let field = format!("channels.{}.sinks[{}]", channel_name, position);
      let base_name = format!("{}.{}", channel_name, raw_sink.kind_name());
      let name = if sinks.iter().any(|s| s.name == base_name) {
        format!("{}.{}", base_name, position)
      } else {
        base_name
      };

      let kind = match raw_sink {
        SinkConfigRaw::File(raw) => process_file_sink(raw, &field, &mut warnings),
        SinkConfigRaw::SearchIndex(raw) => process_search_sink(raw, &field, &mut warnings),
        SinkConfigRaw::Broker(raw) => process_broker_sink(raw, &field, &mut warnings),
        SinkConfigRaw::Console(raw) => Some(process_console_sink(raw, &field, &mut warnings)),
        SinkConfigRaw::Stream(raw) => {
          let buffer_size = if raw.buffer_size == 0 {
            warnings.push(
              format!("{}.buffer_size", field),
              "stream buffer_size cannot be zero, using the default",
            );
            default_buffer_size()
          } else {
            raw.buffer_size
          };
          Some(SinkKindInternal::Stream(StreamSinkInternal { buffer_size }))
        }
      };

      if let Some(kind) = kind {
        sinks.push(SinkInternal { name, kind });
      }
    }

    if sinks.is_empty() {
      warnings.push(
        format!("channels.{}.sinks", channel_name),
        "channel has no usable sinks and will drop every record",
      );
    }
    channels.insert(
      channel_name.clone(),
      ChannelInternal {
        name: channel_name,
        sinks,
      },
    );
  }

  // 2. Routing
  let default_channel = raw_config
    .default_channel
    .filter(|c| !c.trim().is_empty())
    .map(|c| c.trim().to_string())
    .or_else(|| raw_config.stack.iter().map(|c| c.trim()).find(|c| !c.is_empty()).map(str::to_string))
    .or_else(|| channels.keys().next().cloned())
    .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
  let stack = resolve_stack(&raw_config.stack, &default_channel);
  for name in &stack {
    if !channels.contains_key(name) {
      warnings.push("stack", format!("channel '{}' is not defined", name));
    }
  }

  // 3. App metadata
  let app = AppMetadata {
    environment: raw_config.app.environment,
    service_name: raw_config.app.service_name,
    app_version: raw_config.app.app_version,
    hostname: raw_config
      .app
      .hostname
      .or_else(AppMetadata::detect_hostname),
  };

  // 4. Limits
  let defaults = FieldLimits::default();
  let limits = FieldLimits {
    max_body_bytes: limit_value(
      "limits.max_body_bytes",
      raw_config.limits.max_body_bytes,
      defaults.max_body_bytes,
      &mut warnings,
    ),
    max_bindings: limit_value(
      "limits.max_bindings",
      raw_config.limits.max_bindings,
      defaults.max_bindings,
      &mut warnings,
    ),
  };

  // 5. Accumulator
  let raw_acc = raw_config.accumulator;
  let max_logs = match raw_acc.max_logs {
    None | Some(0) => None,
    Some(n) => match non_negative(n) {
      Some(n) => Some(n),
      None => {
        warnings.push(
          "accumulator.max_logs",
          format!("negative value {}, buffer left unbounded", n),
        );
        None
      }
    },
  };
  let bypass_channel = raw_acc.bypass_channel.and_then(|c| {
    if channels.contains_key(&c) {
      Some(c)
    } else {
      warnings.push(
        "accumulator.bypass_channel",
        format!("channel '{}' is not defined, limit warnings go to tracing only", c),
      );
      None
    }
  });
  let accumulator = AccumulatorOptions {
    max_logs,
    warn_on_limit: raw_acc.warn_on_limit.unwrap_or(true),
    bypass_channel,
  };

  // 6. Internal error reporting
  let reporting = raw_config.internal_error_reporting;
  let error_reporting = if reporting.enabled {
    if reporting.buffer_size == 0 {
      warnings.push(
        "internal_error_reporting.buffer_size",
        "buffer_size cannot be zero, using the default",
      );
      Some(default_buffer_size())
    } else {
      Some(reporting.buffer_size)
    }
  } else {
    None
  };

  ProcessedConfig {
    config: ConfigInternal {
      stack,
      default_channel,
      app,
      limits,
      accumulator,
      defer_by_default: raw_acc.defer_by_default.unwrap_or(true),
      error_reporting,
      channels,
    },
    warnings: warnings.0,
  }
}

fn limit_value(field: &str, raw: Option<i64>, default: usize, warnings: &mut Warnings) -> usize {
  match raw {
    None => default,
    Some(n) => non_negative(n).unwrap_or_else(|| {
      warnings.push(field, format!("negative value {}, using {}", n, default));
      default
    }),
  }
}

fn process_file_sink(
  raw: FileSinkConfigRaw,
  field: &str,
  warnings: &mut Warnings,
) -> Option<SinkKindInternal> {
  if raw.directory.trim().is_empty() {
    warnings.push(
      format!("{}.directory", field),
      "file sink directory cannot be empty, sink dropped",
    );
    return None;
  }
  let retention_days = match raw.retention_days {
    None => DEFAULT_RETENTION_DAYS,
    Some(n) => match u32::try_from(n) {
      Ok(days) => days,
      Err(_) => {
        warnings.push(
          format!("{}.retention_days", field),
          format!("invalid value {}, using {}", n, DEFAULT_RETENTION_DAYS),
        );
        DEFAULT_RETENTION_DAYS
      }
    },
  };
  Some(SinkKindInternal::File(FileSinkInternal {
    directory: PathBuf::from(raw.directory),
    retention_days,
  }))
}

fn process_search_sink(
  raw: SearchIndexSinkConfigRaw,
  field: &str,
  warnings: &mut Warnings,
) -> Option<SinkKindInternal> {
  let base_url = warnings.url(format!("{}.base_url", field), &raw.base_url)?;
  let defaults = SearchIndexSinkOptions::default();

  let max_retries = match raw.max_retries {
    None => defaults.max_retries,
    Some(n) if n > 0 => u32::try_from(n).unwrap_or(defaults.max_retries),
    Some(n) => {
      warnings.push(
        format!("{}.max_retries", field),
        format!("must be positive, got {}, using {}", n, defaults.max_retries),
      );
      defaults.max_retries
    }
  };

  let document_builder = match raw.document_builder.as_deref() {
    None | Some("standard") => DocumentBuilderKind::Standard,
    Some(other) => {
      warnings.push(
        format!("{}.document_builder", field),
        format!("unknown builder '{}', using 'standard'", other),
      );
      DocumentBuilderKind::Standard
    }
  };

  let fallback_index = raw
    .fallback_index
    .filter(|i| !i.trim().is_empty())
    .unwrap_or_else(|| index::GENERAL.to_string());

  Some(SinkKindInternal::SearchIndex(SearchIndexSinkInternal {
    options: SearchIndexSinkOptions {
      base_url,
      fallback_index,
      username: raw.username.filter(|u| !u.is_empty()),
      password: raw.password,
      timeout: warnings.duration(
        format!("{}.timeout", field),
        raw.timeout.as_deref(),
        defaults.timeout,
        false,
      ),
      max_retries,
      retry_backoff: warnings.duration(
        format!("{}.retry_backoff", field),
        raw.retry_backoff.as_deref(),
        defaults.retry_backoff,
        true,
      ),
      silent: raw.silent.unwrap_or(defaults.silent),
    },
    verify_tls: raw.verify_tls.unwrap_or(true),
    document_builder,
    no_source_location: raw
      .no_source_location
      .map(|list| list.into_iter().collect())
      .unwrap_or_else(default_no_source_location),
  }))
}

fn process_broker_sink(
  raw: BrokerSinkConfigRaw,
  field: &str,
  warnings: &mut Warnings,
) -> Option<SinkKindInternal> {
  let rest_proxy_url = warnings.url(format!("{}.rest_proxy_url", field), &raw.rest_proxy_url)?;
  if raw.topic.trim().is_empty() {
    warnings.push(format!("{}.topic", field), "topic cannot be empty, sink dropped");
    return None;
  }
  let defaults = BrokerSinkOptions::default();

  let value_builder = match raw.value_builder.as_deref() {
    None | Some("flat") => ValueBuilderKind::Flat,
    Some("index_keyed") => ValueBuilderKind::IndexKeyed,
    Some(other) => {
      warnings.push(
        format!("{}.value_builder", field),
        format!("unknown builder '{}', using 'flat'", other),
      );
      ValueBuilderKind::Flat
    }
  };

  Some(SinkKindInternal::Broker(BrokerSinkInternal {
    options: BrokerSinkOptions {
      rest_proxy_url,
      topic: raw.topic,
      timeout: warnings.duration(
        format!("{}.timeout", field),
        raw.timeout.as_deref(),
        defaults.timeout,
        false,
      ),
      silent: raw.silent.unwrap_or(defaults.silent),
    },
    verify_tls: raw.verify_tls.unwrap_or(true),
    value_builder,
  }))
}

fn process_console_sink(
  raw: ConsoleSinkConfigRaw,
  field: &str,
  warnings: &mut Warnings,
) -> SinkKindInternal {
  let target = match raw.target.as_deref().map(str::to_lowercase).as_deref() {
    None | Some("stdout") => ConsoleTarget::Stdout,
    Some("stderr") => ConsoleTarget::Stderr,
    Some(other) => {
      warnings.push(
        format!("{}.target", field),
        format!("unknown target '{}', using stdout", other),
      );
      ConsoleTarget::Stdout
    }
  };
  SinkKindInternal::Console(ConsoleSinkInternal {
    target,
    pattern: raw.pattern.unwrap_or_else(|| DEFAULT_PATTERN.to_string()),
  })
}
