use thiserror::Error;

/// The main error type for the `logflume` library.
///
/// Sink write failures have their own type, [`crate::sinks::SinkError`], because
/// they are usually swallowed at the handler boundary rather than surfaced.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Configuration file not found: {0}")]
  ConfigNotFound(String),

  #[error("Failed to read configuration file: {0}")]
  ConfigRead(#[from] std::io::Error),

  #[error("Failed to parse configuration: {0}")]
  ConfigParse(String),

  #[error("Sink setup failed for '{sink_name}': {reason}")]
  SinkSetup { sink_name: String, reason: String },

  #[error("Invalid configuration value for '{field}': {message}")]
  InvalidConfigValue { field: String, message: String },

  #[error("Internal library error: {0}")]
  Internal(String),
}

/// A specialized `Result` type for `logflume` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
