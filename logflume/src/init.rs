// Contains the primary public initialization functions for logflume.

use crate::{
  config::{
    processed::{
      process_raw_config, ConfigInternal, DocumentBuilderKind, ProcessedConfig, SinkInternal,
      SinkKindInternal, ValueBuilderKind,
    },
    raw::ConfigRaw,
  },
  encoders::{DocumentBuilder, FlatValueBuilder, IndexKeyedValueBuilder, PatternFormatter, StandardDocumentBuilder, ValueBuilder},
  error::{Error, Result},
  error_handling::{ErrorReporter, InternalErrorSource},
  pipeline::{Channel, ChannelRegistry, Dispatcher},
  sinks::{
    BrokerSink, ConsoleSink, HttpTransport, JsonlFileSink, RecordReceiver, ReqwestTransport,
    SearchIndexSink, SinkHandler, StreamSink,
  },
  Pipeline,
};

use std::{
  collections::HashMap,
  env,
  fs::File as StdFsFile,
  io,
  path::{Path, PathBuf},
  sync::Arc,
};

const DEFAULT_CONFIG_BASE_NAME: &str = "logflume";
const DEFAULT_CONFIG_EXTENSION: &str = "yaml";

/// Finds the configuration file based on common patterns and an optional environment suffix.
pub fn find_config_file(environment_suffix: Option<&str>) -> Result<PathBuf> {
  let base_name = DEFAULT_CONFIG_BASE_NAME;
  let extension = DEFAULT_CONFIG_EXTENSION;

  let env_from_var = environment_suffix
    .map(|s| s.to_string())
    .or_else(|| env::var("LOGFLUME_ENV").ok())
    .or_else(|| env::var("APP_ENV").ok());

  let mut files_to_check: Vec<String> = Vec::new();

  if let Some(env_str) = &env_from_var {
    if !env_str.is_empty() {
      files_to_check.push(format!("{}.{}.{}", base_name, env_str, extension));
    }
  }
  files_to_check.push(format!("{}.{}", base_name, extension));

  let search_dirs = [PathBuf::from("."), PathBuf::from("config")];

  for dir in &search_dirs {
    for file_name in &files_to_check {
      let path = dir.join(file_name);
      if path.is_file() {
        return Ok(path);
      }
    }
  }

  Err(Error::ConfigNotFound(format!(
    "Searched for: {:?} in {:?}. Provide a config file or check LOGFLUME_ENV/APP_ENV.",
    files_to_check, search_dirs
  )))
}

/// Builds a [`Pipeline`] from a YAML configuration file.
pub fn init_from_file(config_path: &Path) -> Result<Pipeline> {
  tracing::debug!(path = ?config_path, "initializing logflume from config file");

  let file = StdFsFile::open(config_path)?;
  let reader = io::BufReader::new(file);
  let raw_config: ConfigRaw =
    serde_yaml::from_reader(reader).map_err(|e| Error::ConfigParse(e.to_string()))?;

  build_pipeline(process_raw_config(raw_config), None)
}

/// Builds a [`Pipeline`] from YAML text.
pub fn init_from_str(yaml: &str) -> Result<Pipeline> {
  let raw_config: ConfigRaw =
    serde_yaml::from_str(yaml).map_err(|e| Error::ConfigParse(e.to_string()))?;
  build_pipeline(process_raw_config(raw_config), None)
}

/// Builds a [`Pipeline`] from processed configuration.
///
/// HTTP sinks use `transport` when given, otherwise a `reqwest` client per
/// TLS-verification setting. Sinks that cannot be constructed are reported and
/// left out; only an unparseable file stops initialization.
pub fn build_pipeline(
  processed: ProcessedConfig,
  transport: Option<Arc<dyn HttpTransport>>,
) -> Result<Pipeline> {
  let ProcessedConfig { config, warnings } = processed;

  let (reporter, internal_error_rx) = match config.error_reporting {
    Some(capacity) => {
      tracing::debug!(capacity, "internal error reporting enabled");
      let (reporter, rx) = ErrorReporter::channel(capacity);
      (reporter, Some(rx))
    }
    None => (ErrorReporter::disabled(), None),
  };
  let reporter = Arc::new(reporter);

  for warning in &warnings {
    tracing::warn!(warning = %warning, "configuration value replaced by default");
    reporter.report(InternalErrorSource::ConfigProcessing, warning, None);
  }

  let mut factory = SinkFactory {
    config: &config,
    reporter: &reporter,
    transport,
    reqwest_transports: HashMap::new(),
    streams: HashMap::new(),
  };

  let mut registry = ChannelRegistry::new();
  for (channel_name, channel_config) in &config.channels {
    let handlers: Vec<Arc<dyn SinkHandler>> = channel_config
      .sinks
      .iter()
      .filter_map(|sink| match factory.build(sink) {
        Ok(handler) => Some(handler),
        Err(e) => {
          tracing::warn!(channel = %channel_name, sink = %sink.name, error = %e, "sink left out of channel");
          reporter.report(InternalErrorSource::ConfigProcessing, &e, Some(format!("sink: {}", sink.name)));
          None
        }
      })
      .collect();
    tracing::debug!(channel = %channel_name, sinks = handlers.len(), "channel configured");
    registry.insert(Channel::new(channel_name.clone(), handlers));
  }
  let streams = factory.streams;

  let dispatcher = Dispatcher::new(
    Arc::new(registry),
    &config.stack,
    &config.default_channel,
    config.limits,
    reporter,
  );

  tracing::debug!(stack = ?dispatcher.stack(), "logflume initialization complete");
  Ok(Pipeline::new(
    Arc::new(dispatcher),
    config.app,
    config.accumulator,
    config.defer_by_default,
    internal_error_rx,
    streams,
  ))
}

struct SinkFactory<'a> {
  config: &'a ConfigInternal,
  reporter: &'a Arc<ErrorReporter>,
  transport: Option<Arc<dyn HttpTransport>>,
  reqwest_transports: HashMap<bool, Arc<dyn HttpTransport>>,
  streams: HashMap<String, RecordReceiver>,
}

impl SinkFactory<'_> {
  fn build(&mut self, sink: &SinkInternal) -> Result<Arc<dyn SinkHandler>> {
    let handler: Arc<dyn SinkHandler> = match &sink.kind {
      SinkKindInternal::File(file) => Arc::new(JsonlFileSink::new(
        sink.name.clone(),
        file.directory.clone(),
        file.retention_days,
        self.reporter.clone(),
      )),
      SinkKindInternal::SearchIndex(search) => {
        let builder: Arc<dyn DocumentBuilder> = match search.document_builder {
          DocumentBuilderKind::Standard => Arc::new(StandardDocumentBuilder::new(
            self.config.app.clone(),
            search.no_source_location.clone(),
          )),
        };
        Arc::new(SearchIndexSink::new(
          sink.name.clone(),
          search.options.clone(),
          self.transport_for(&sink.name, search.verify_tls)?,
          builder,
          self.reporter.clone(),
        )?)
      }
      SinkKindInternal::Broker(broker) => {
        let builder: Arc<dyn ValueBuilder> = match broker.value_builder {
          ValueBuilderKind::Flat => Arc::new(FlatValueBuilder),
          ValueBuilderKind::IndexKeyed => Arc::new(IndexKeyedValueBuilder::default()),
        };
        Arc::new(BrokerSink::new(
          sink.name.clone(),
          broker.options.clone(),
          self.transport_for(&sink.name, broker.verify_tls)?,
          builder,
          self.reporter.clone(),
        )?)
      }
      SinkKindInternal::Console(console) => Arc::new(ConsoleSink::new(
        sink.name.clone(),
        console.target,
        PatternFormatter::new(&console.pattern),
        self.reporter.clone(),
      )),
      SinkKindInternal::Stream(stream) => {
        let (handler, rx) = StreamSink::new(sink.name.clone(), stream.buffer_size);
        // Store the receiver for the user to retrieve.
        self.streams.insert(sink.name.clone(), rx);
        Arc::new(handler)
      }
    };
    Ok(handler)
  }

  fn transport_for(&mut self, sink_name: &str, verify_tls: bool) -> Result<Arc<dyn HttpTransport>> {
    if let Some(transport) = &self.transport {
      return Ok(transport.clone());
    }
    if let Some(transport) = self.reqwest_transports.get(&verify_tls) {
      return Ok(transport.clone());
    }
    let transport: Arc<dyn HttpTransport> =
      Arc::new(ReqwestTransport::new(verify_tls).map_err(|e| Error::SinkSetup {
        sink_name: sink_name.to_string(),
        reason: e.to_string(),
      })?);
    self.reqwest_transports.insert(verify_tls, transport.clone());
    Ok(transport)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Level;
  use crate::sinks::transport::testing::RecordingTransport;
  use std::fs;

  #[test]
  fn find_config_file_not_found() {
    let result = find_config_file(Some("no-such-environment"));
    assert!(matches!(result, Err(Error::ConfigNotFound(_))));
  }

  #[test]
  fn init_from_file_reports_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logflume.yaml");
    fs::write(&path, "channels: [not, a, map]").unwrap();

    let result = init_from_file(&path);
    assert!(matches!(result, Err(Error::ConfigParse(_))));

    let missing = init_from_file(&dir.path().join("missing.yaml"));
    assert!(matches!(missing, Err(Error::ConfigRead(_))));
  }

  #[test]
  fn init_builds_channels_and_streams() {
    let pipeline = init_from_str(
      r#"
stack: [tap, console]
channels:
  tap:
    sinks:
      - { kind: stream, buffer_size: 4 }
  console:
    sinks:
      - { kind: console, target: stderr }
"#,
    )
    .unwrap();

    let registry = pipeline.dispatcher().registry();
    let mut names: Vec<&str> = registry.names().collect();
    names.sort();
    assert_eq!(names, vec!["console", "tap"]);
    assert!(pipeline.streams.contains_key("tap.stream"));
    assert!(pipeline.internal_error_rx.is_none());

    let mut logger = pipeline.cli_scope();
    logger.message(Level::Info, "hello");
    logger.terminate();

    let record = pipeline.streams["tap.stream"].try_recv().unwrap();
    assert_eq!(record.message, "hello");
    assert_eq!(record.channel, "tap");
  }

  #[test]
  fn config_warnings_reach_the_error_channel() {
    let raw: ConfigRaw = serde_yaml::from_str(
      r#"
internal_error_reporting: { enabled: true, buffer_size: 8 }
channels:
  search:
    sinks:
      - { kind: search_index, base_url: "::bad::" }
"#,
    )
    .unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = build_pipeline(process_raw_config(raw), Some(transport)).unwrap();

    let rx = pipeline.internal_error_rx.as_ref().unwrap();
    let first = rx.try_recv().unwrap();
    assert_eq!(first.source, InternalErrorSource::ConfigProcessing);
    assert!(first.error_message.contains("channels.search.sinks[0].base_url"));
    assert!(pipeline.dispatcher().registry().get("search").unwrap().handlers().is_empty());
  }

  #[test]
  fn injected_transport_is_used_by_http_sinks() {
    let raw: ConfigRaw = serde_yaml::from_str(
      r#"
accumulator: { defer_by_default: false }
channels:
  broker:
    sinks:
      - { kind: broker, rest_proxy_url: "http://proxy:8082", topic: app-logs }
"#,
    )
    .unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let pipeline = build_pipeline(process_raw_config(raw), Some(transport.clone())).unwrap();

    let mut logger = pipeline.cli_scope();
    logger.info("shipped");

    assert_eq!(transport.request_count(), 1);
    let requests = transport.requests.lock();
    assert_eq!(requests[0].url, "http://proxy:8082/topics/app-logs");
  }
}
