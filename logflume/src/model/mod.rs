//! The typed log event model and the generic record that flows through sinks.
//!
//! Application code builds one of the category structs ([`ApiLog`], [`JobLog`],
//! [`IntegrationLog`], [`OrmLog`], [`ErrorLog`], [`GeneralLog`]). Each implements
//! [`LogEvent`], which yields a routing index plus a flat, null-free field map.
//! The dispatcher turns that into a [`LogRecord`] per destination channel.

mod api;
mod common;
mod error_log;
mod fields;
mod general;
mod integration;
mod job;
mod level;
mod orm;
mod record;

pub use api::ApiLog;
pub use common::{AppMetadata, CommonFields, SourceLocation};
pub use error_log::ErrorLog;
pub use fields::{pretty_json_or_raw, FieldLimits};
pub use general::GeneralLog;
pub use integration::IntegrationLog;
pub use job::{JobKind, JobLog, JobStatus};
pub use level::{Level, ParseLevelError};
pub use orm::OrmLog;
pub use record::LogRecord;

/// Flat, JSON-valued field map. Keys are kept sorted so output is deterministic.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Reserved context key that carries the routing index of a record.
pub const LOG_INDEX_KEY: &str = "log_index";

/// Built-in routing indices.
pub mod index {
  pub const API: &str = "api_log";
  pub const JOB: &str = "job_log";
  pub const CRON: &str = "cron_log";
  pub const INTEGRATION: &str = "integration_log";
  pub const ORM: &str = "orm_log";
  pub const ERROR: &str = "error_log";
  pub const GENERAL: &str = "general_log";
}

/// Shared capability of every typed log event.
pub trait LogEvent {
  /// Routing key used to pick a file, search index or broker key.
  fn index(&self) -> &str;

  fn level(&self) -> Level;

  fn message(&self) -> &str;

  fn common(&self) -> &CommonFields;

  /// Used by the facade to fill correlation ids and app metadata from the scope.
  fn common_mut(&mut self) -> &mut CommonFields;

  /// Category fields merged with the common fields.
  ///
  /// Never contains a null value and never contains [`LOG_INDEX_KEY`].
  fn field_map(&self) -> FieldMap;
}
