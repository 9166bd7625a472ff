// Scope construction and flush points for requests, jobs and CLI runs.

use crate::facade::Logger;
use crate::model::{AppMetadata, CommonFields};

use uuid::Uuid;

pub fn new_correlation_id() -> String {
  Uuid::new_v4().to_string()
}

/// Scope for one HTTP request. A missing request id is generated; the trace
/// id defaults to the request id.
pub fn request_scope(app: &AppMetadata, request_id: Option<String>, trace_id: Option<String>) -> CommonFields {
  let request_id = request_id
    .filter(|id| !id.is_empty())
    .unwrap_or_else(new_correlation_id);
  let mut scope = app.as_common_fields();
  scope.trace_id = Some(trace_id.unwrap_or_else(|| request_id.clone()));
  scope.request_id = Some(request_id);
  scope
}

/// Scope for a queued job. The dispatching context's request id becomes the
/// job's `parent_request_id` and its trace id is carried over.
pub fn job_scope(app: &AppMetadata, parent: Option<&CommonFields>) -> CommonFields {
  let request_id = new_correlation_id();
  let mut scope = app.as_common_fields();
  scope.parent_request_id = parent.and_then(|p| p.request_id.clone());
  scope.trace_id = parent
    .and_then(|p| p.trace_id.clone())
    .or_else(|| Some(request_id.clone()));
  scope.session_id = parent.and_then(|p| p.session_id.clone());
  scope.user_id = parent.and_then(|p| p.user_id.clone());
  scope.request_id = Some(request_id);
  scope
}

/// Scope for a console command run.
pub fn cli_scope(app: &AppMetadata) -> CommonFields {
  let mut scope = request_scope(app, None, None);
  scope.tags.push("cli".to_string());
  scope
}

/// Runs a request handler. When it fails, buffered logs are flushed before the
/// error is returned; the terminate phase may flush again.
pub fn handle_request<T, E, F>(logger: &mut Logger, handler: F) -> Result<T, E>
where
  F: FnOnce(&mut Logger) -> Result<T, E>,
{
  let result = handler(logger);
  if result.is_err() {
    let report = logger.flush();
    tracing::debug!(records = report.records, "flushed before returning request error");
  }
  result
}
