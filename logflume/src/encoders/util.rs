// Utility functions shared by the encoders and the file sink.

use chrono::{DateTime, Utc};

/// Formats a timestamp as RFC 3339 with millisecond precision, e.g. `2023-10-26T14:30:05.123Z`.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
  timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Writes a timestamp using a custom `strftime` format string.
pub fn write_timestamp_with_format(buf: &mut String, timestamp: &DateTime<Utc>, format_str: &str) {
  use std::fmt::Write;
  let _ = write!(buf, "{}", timestamp.format(format_str));
}

/// Normalizes a routing index into a file-name and index-name safe token.
///
/// Lowercases, replaces anything outside `[a-z0-9._-]` with `_`, trims
/// surrounding underscores, and falls back to `"log"` when nothing is left.
pub fn sanitize_index(index: &str) -> String {
  let replaced: String = index
    .to_lowercase()
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
        c
      } else {
        '_'
      }
    })
    .collect();
  let trimmed = replaced.trim_matches('_');
  if trimmed.is_empty() {
    "log".to_string()
  } else {
    trimmed.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{TimeZone, Timelike};

  #[test]
  fn test_format_timestamp() {
    let dt = Utc
      .with_ymd_and_hms(2023, 10, 26, 14, 30, 5)
      .unwrap()
      .with_nanosecond(123_456_000)
      .unwrap();
    assert_eq!(format_timestamp(&dt), "2023-10-26T14:30:05.123Z");
  }

  #[test]
  fn test_custom_timestamp_format() {
    let mut buf = String::new();
    let dt = Utc.with_ymd_and_hms(2023, 1, 1, 1, 1, 1).unwrap();
    write_timestamp_with_format(&mut buf, &dt, "%Y-%m-%d %H:%M");
    assert_eq!(buf, "2023-01-01 01:01");
  }

  #[test]
  fn sanitize_index_examples() {
    assert_eq!(sanitize_index("My Index!"), "my_index");
    assert_eq!(sanitize_index(""), "log");
    assert_eq!(sanitize_index("api_log"), "api_log");
    assert_eq!(sanitize_index("../etc/passwd"), ".._etc_passwd");
    assert_eq!(sanitize_index("!!!"), "log");
    assert_eq!(sanitize_index("Ünïcode"), "n_code");
  }
}
