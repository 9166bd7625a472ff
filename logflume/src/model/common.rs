use super::fields::FieldWriter;
use std::panic::Location;

/// Where a log call was made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
  pub file: String,
  pub line: u32,
  pub function: Option<String>,
}

impl SourceLocation {
  /// Captures the location of the outermost `#[track_caller]` frame.
  #[track_caller]
  pub fn caller() -> Self {
    let location = Location::caller();
    Self {
      file: location.file().to_string(),
      line: location.line(),
      function: None,
    }
  }

  pub(crate) fn write_into(&self, writer: &mut FieldWriter) {
    writer
      .put("file", self.file.as_str())
      .put("line", self.line)
      .put("function", self.function.as_deref());
  }
}

/// Process-wide application metadata stamped onto events and documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppMetadata {
  pub environment: Option<String>,
  pub hostname: Option<String>,
  pub service_name: Option<String>,
  pub app_version: Option<String>,
}

impl AppMetadata {
  /// The machine hostname, if it can be read and is valid UTF-8.
  pub fn detect_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
  }

  pub fn as_common_fields(&self) -> CommonFields {
    CommonFields {
      environment: self.environment.clone(),
      hostname: self.hostname.clone(),
      service_name: self.service_name.clone(),
      app_version: self.app_version.clone(),
      ..Default::default()
    }
  }
}

/// Fields shared by every category: correlation ids, app metadata, tags, location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonFields {
  pub trace_id: Option<String>,
  pub request_id: Option<String>,
  pub parent_request_id: Option<String>,
  pub span_id: Option<String>,
  pub session_id: Option<String>,
  pub user_id: Option<String>,
  pub environment: Option<String>,
  pub hostname: Option<String>,
  pub service_name: Option<String>,
  pub app_version: Option<String>,
  pub tags: Vec<String>,
  /// Only emitted by categories whose call site is meaningful.
  pub source: Option<SourceLocation>,
}

impl CommonFields {
  /// Copies every field that is unset here from `scope`. Tags are appended
  /// without duplicates; the source location is never copied.
  pub fn fill_from(&mut self, scope: &CommonFields) {
    fn fill(slot: &mut Option<String>, from: &Option<String>) {
      if slot.is_none() {
        slot.clone_from(from);
      }
    }
    fill(&mut self.trace_id, &scope.trace_id);
    fill(&mut self.request_id, &scope.request_id);
    fill(&mut self.parent_request_id, &scope.parent_request_id);
    fill(&mut self.span_id, &scope.span_id);
    fill(&mut self.session_id, &scope.session_id);
    fill(&mut self.user_id, &scope.user_id);
    fill(&mut self.environment, &scope.environment);
    fill(&mut self.hostname, &scope.hostname);
    fill(&mut self.service_name, &scope.service_name);
    fill(&mut self.app_version, &scope.app_version);
    for tag in &scope.tags {
      if !self.tags.contains(tag) {
        self.tags.push(tag.clone());
      }
    }
  }

  pub(crate) fn write_into(&self, writer: &mut FieldWriter, include_source: bool) {
    writer
      .put("trace_id", self.trace_id.as_deref())
      .put("request_id", self.request_id.as_deref())
      .put("parent_request_id", self.parent_request_id.as_deref())
      .put("span_id", self.span_id.as_deref())
      .put("session_id", self.session_id.as_deref())
      .put("user_id", self.user_id.as_deref())
      .put("environment", self.environment.as_deref())
      .put("hostname", self.hostname.as_deref())
      .put("service_name", self.service_name.as_deref())
      .put("app_version", self.app_version.as_deref());
    if !self.tags.is_empty() {
      writer.put("tags", self.tags.clone());
    }
    if include_source {
      if let Some(source) = &self.source {
        source.write_into(writer);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_from_only_sets_missing_fields() {
    let mut fields = CommonFields {
      request_id: Some("own".into()),
      tags: vec!["a".into()],
      ..Default::default()
    };
    let scope = CommonFields {
      request_id: Some("scope".into()),
      trace_id: Some("trace".into()),
      tags: vec!["a".into(), "b".into()],
      source: Some(SourceLocation::caller()),
      ..Default::default()
    };

    fields.fill_from(&scope);

    assert_eq!(fields.request_id.as_deref(), Some("own"));
    assert_eq!(fields.trace_id.as_deref(), Some("trace"));
    assert_eq!(fields.tags, vec!["a".to_string(), "b".to_string()]);
    assert!(fields.source.is_none());
  }

  #[test]
  fn caller_points_at_this_file() {
    let location = SourceLocation::caller();
    assert!(location.file.ends_with("common.rs"));
    assert!(location.line > 0);
  }
}
