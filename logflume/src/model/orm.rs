use super::fields::FieldWriter;
use super::{index, CommonFields, FieldMap, Level, LogEvent};
use serde_json::Value;

/// A database query or model change.
#[derive(Debug, Clone, PartialEq)]
pub struct OrmLog {
  pub level: Level,
  pub message: String,
  pub query: String,
  pub bindings: Vec<Value>,
  pub duration_ms: Option<f64>,
  pub connection: Option<String>,
  pub model: Option<String>,
  /// `created`, `updated`, `deleted`, ...
  pub action: Option<String>,
  pub before_values: Option<Value>,
  pub after_values: Option<Value>,
  pub common: CommonFields,
}

impl OrmLog {
  pub fn query(query: impl Into<String>, bindings: Vec<Value>) -> Self {
    let query = query.into();
    Self {
      level: Level::Debug,
      message: query.clone(),
      query,
      bindings,
      duration_ms: None,
      connection: None,
      model: None,
      action: None,
      before_values: None,
      after_values: None,
      common: CommonFields::default(),
    }
  }

  /// A model change with its before/after attribute snapshots.
  pub fn model_change(
    model: impl Into<String>,
    action: impl Into<String>,
    before_values: Option<Value>,
    after_values: Option<Value>,
  ) -> Self {
    let model = model.into();
    let action = action.into();
    Self {
      level: Level::Info,
      message: format!("{} {}", model, action),
      query: String::new(),
      bindings: Vec::new(),
      duration_ms: None,
      connection: None,
      model: Some(model),
      action: Some(action),
      before_values,
      after_values,
      common: CommonFields::default(),
    }
  }
}

impl LogEvent for OrmLog {
  fn index(&self) -> &str {
    index::ORM
  }

  fn level(&self) -> Level {
    self.level
  }

  fn message(&self) -> &str {
    &self.message
  }

  fn common(&self) -> &CommonFields {
    &self.common
  }

  fn common_mut(&mut self) -> &mut CommonFields {
    &mut self.common
  }

  fn field_map(&self) -> FieldMap {
    let mut writer = FieldWriter::new();
    self.common.write_into(&mut writer, false);
    if !self.query.is_empty() {
      writer.put("query", self.query.as_str());
    }
    if !self.bindings.is_empty() {
      writer.put("bindings", Value::Array(self.bindings.clone()));
    }
    writer
      .put("duration_ms", self.duration_ms)
      .put("connection", self.connection.as_deref())
      .put("model", self.model.as_deref())
      .put("action", self.action.as_deref())
      .put_json_string("before_values", self.before_values.as_ref())
      .put_json_string("after_values", self.after_values.as_ref());
    writer.finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn query_keeps_bindings_as_array() {
    let mut event = OrmLog::query("select * from users where id = ?", vec![json!(7)]);
    event.duration_ms = Some(0.8);
    let fields = event.field_map();
    assert_eq!(fields["bindings"], json!([7]));
    assert_eq!(fields["duration_ms"], json!(0.8));
    assert!(!fields.contains_key("before_values"));
  }

  #[test]
  fn model_change_serializes_snapshots() {
    let event = OrmLog::model_change(
      "User",
      "updated",
      Some(json!({"name": "a"})),
      Some(json!({"name": "b"})),
    );
    let fields = event.field_map();
    assert_eq!(fields["before_values"], json!("{\n  \"name\": \"a\"\n}"));
    assert_eq!(fields["after_values"], json!("{\n  \"name\": \"b\"\n}"));
    assert!(!fields.contains_key("query"));
    assert!(!fields.contains_key("bindings"));
  }
}
