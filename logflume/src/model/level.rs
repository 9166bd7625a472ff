use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a log event, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
  Debug,
  Info,
  Notice,
  Warning,
  Error,
  Critical,
  Alert,
  Emergency,
}

impl Level {
  pub fn as_str(&self) -> &'static str {
    match self {
      Level::Debug => "debug",
      Level::Info => "info",
      Level::Notice => "notice",
      Level::Warning => "warning",
      Level::Error => "error",
      Level::Critical => "critical",
      Level::Alert => "alert",
      Level::Emergency => "emergency",
    }
  }

  /// Upper-case name, as printed by the console pattern `%p`.
  pub fn as_upper_str(&self) -> &'static str {
    match self {
      Level::Debug => "DEBUG",
      Level::Info => "INFO",
      Level::Notice => "NOTICE",
      Level::Warning => "WARNING",
      Level::Error => "ERROR",
      Level::Critical => "CRITICAL",
      Level::Alert => "ALERT",
      Level::Emergency => "EMERGENCY",
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid log level string '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
  type Err = ParseLevelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "debug" | "trace" => Ok(Level::Debug),
      "info" => Ok(Level::Info),
      "notice" => Ok(Level::Notice),
      "warning" | "warn" => Ok(Level::Warning),
      "error" => Ok(Level::Error),
      "critical" => Ok(Level::Critical),
      "alert" => Ok(Level::Alert),
      "emergency" => Ok(Level::Emergency),
      _ => Err(ParseLevelError(s.to_string())),
    }
  }
}
