// src/config/de.rs
// Default value functions for serde and parsing helpers for raw config values.

use std::time::Duration;

pub fn default_version() -> u32 {
  1
}

pub fn default_buffer_size() -> usize {
  256 // A sensible default buffer size
}

/// Parses a human-readable duration such as `"2s"`, `"1500ms"` or `"1m 30s"`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
  humantime::parse_duration(value.trim()).map_err(|e| e.to_string())
}

/// Converts a signed config number into a `usize`, rejecting negatives.
pub fn non_negative(value: i64) -> Option<usize> {
  usize::try_from(value).ok()
}
