use super::util;
use crate::model::LogRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;

pub const DEFAULT_PATTERN: &str = "[%d] %p %c/%i - %m%n";

// Main capture group for the specifier part, and an alternative for `%%`.
static PATTERN_REGEX: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?P<specifier>%(?P<padding>-?\d+)?(?P<converter>[a-zA-Z])(?:\{(?P<options>[^}]+)\})?)|(?P<escaped>%%)")
    .expect("Pattern regex should be valid")
});

/// Represents a single piece of a parsed logging pattern.
enum Segment {
  Literal(String),
  Specifier(PatternSpecifier),
}

/// The internal representation of a conversion specifier like `%-5p`.
struct PatternSpecifier {
  converter: char,
  padding: Option<i32>,
  options: Option<String>,
}

/// Renders records as single text lines for the console sink.
///
/// Supported converters: `%d` (optionally `%d{strftime}`), `%p` level, `%c`
/// channel, `%i` routing index, `%m` message, `%x` context as JSON, `%n`.
pub struct PatternFormatter {
  segments: Vec<Segment>,
}

impl PatternFormatter {
  pub fn new(pattern_string: &str) -> Self {
    let segments = Self::parse(pattern_string);
    Self { segments }
  }

  fn parse(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_end = 0;

    for caps in PATTERN_REGEX.captures_iter(pattern) {
      let Some(mat) = caps.get(0) else {
        continue;
      };

      if mat.start() > last_end {
        segments.push(Segment::Literal(pattern[last_end..mat.start()].to_string()));
      }

      if caps.name("specifier").is_some() {
        let converter = caps
          .name("converter")
          .and_then(|m| m.as_str().chars().next())
          .unwrap_or(' ');
        let padding = caps.name("padding").and_then(|m| m.as_str().parse().ok());
        let options = caps.name("options").map(|m| m.as_str().to_string());
        segments.push(Segment::Specifier(PatternSpecifier {
          converter,
          padding,
          options,
        }));
      } else if caps.name("escaped").is_some() {
        segments.push(Segment::Literal("%".to_string()));
      }

      last_end = mat.end();
    }

    if last_end < pattern.len() {
      segments.push(Segment::Literal(pattern[last_end..].to_string()));
    }

    segments
  }

  fn format_specifier(&self, buf: &mut String, spec: &PatternSpecifier, record: &LogRecord) {
    // `%n` never pads and writes straight to the output.
    if spec.converter == 'n' {
      buf.push('\n');
      return;
    }

    let mut content = String::with_capacity(64);
    match spec.converter {
      'd' => match &spec.options {
        Some(format_str) => util::write_timestamp_with_format(&mut content, &record.timestamp, format_str),
        None => content.push_str(&util::format_timestamp(&record.timestamp)),
      },
      'p' | 'l' => content.push_str(record.level.as_upper_str()),
      'c' => content.push_str(&record.channel),
      'i' => content.push_str(record.log_index().unwrap_or("-")),
      'm' => content.push_str(&record.message),
      'x' => {
        if !record.context.is_empty() {
          if let Ok(rendered) = serde_json::to_string(&record.context) {
            content.push_str(&rendered);
          }
        }
      }
      // Unknown specifiers are ignored.
      _ => {}
    }

    match spec.padding {
      Some(padding) => apply_padding(buf, &content, padding),
      None => buf.push_str(&content),
    }
  }

  pub fn format_record(&self, record: &LogRecord) -> String {
    let mut output = String::with_capacity(256);

    for segment in &self.segments {
      match segment {
        Segment::Literal(text) => output.push_str(text),
        Segment::Specifier(spec) => self.format_specifier(&mut output, spec, record),
      }
    }

    if !output.ends_with('\n') {
      output.push('\n');
    }
    output
  }
}

impl Default for PatternFormatter {
  fn default() -> Self {
    Self::new(DEFAULT_PATTERN)
  }
}

/// Positive padding right-aligns, negative padding left-aligns.
fn apply_padding(buf: &mut String, content: &str, padding: i32) {
  let width = padding.unsigned_abs() as usize;
  if content.chars().count() >= width {
    buf.push_str(content);
    return;
  }

  if padding > 0 {
    let _ = write!(buf, "{:>width$}", content, width = width);
  } else {
    let _ = write!(buf, "{:<width$}", content, width = width);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{FieldMap, Level, LOG_INDEX_KEY};
  use chrono::{TimeZone, Utc};
  use serde_json::json;

  fn create_test_record() -> LogRecord {
    let mut context = FieldMap::new();
    context.insert(LOG_INDEX_KEY.into(), json!("api_log"));
    let mut record = LogRecord::new("console", Level::Info, "This is a test message.", context);
    record.timestamp = Utc.with_ymd_and_hms(2023, 1, 1, 1, 1, 1).unwrap();
    record
  }

  #[test]
  fn format_with_default_pattern() {
    let formatter = PatternFormatter::default();
    assert_eq!(
      formatter.format_record(&create_test_record()),
      "[2023-01-01T01:01:01.000Z] INFO console/api_log - This is a test message.\n"
    );
  }

  #[test]
  fn format_with_custom_date_format() {
    let formatter = PatternFormatter::new("[%d{%Y-%m-%d %H:%M}] %p - %m");
    assert_eq!(
      formatter.format_record(&create_test_record()).trim(),
      "[2023-01-01 01:01] INFO - This is a test message."
    );
  }

  #[test]
  fn format_with_padding() {
    let formatter = PatternFormatter::new("[%7p] %-9c|");
    assert_eq!(
      formatter.format_record(&create_test_record()).trim(),
      "[   INFO] console  |"
    );
  }

  #[test]
  fn format_handles_escaped_percent_and_context() {
    let formatter = PatternFormatter::new("100%% %x");
    assert_eq!(
      formatter.format_record(&create_test_record()).trim(),
      "100% {\"log_index\":\"api_log\"}"
    );
  }

  #[test]
  fn parse_handles_literals_and_specifiers() {
    let formatter = PatternFormatter::new("LITERAL %-10p AND %m");
    assert_eq!(formatter.segments.len(), 4);
    assert!(matches!(&formatter.segments[0], Segment::Literal(s) if s == "LITERAL "));
    assert!(
      matches!(&formatter.segments[1], Segment::Specifier(spec) if spec.converter == 'p' && spec.padding == Some(-10))
    );
    assert!(matches!(&formatter.segments[2], Segment::Literal(s) if s == " AND "));
    assert!(
      matches!(&formatter.segments[3], Segment::Specifier(spec) if spec.converter == 'm' && spec.padding.is_none())
    );
  }
}
