use super::fields::FieldWriter;
use super::{index, CommonFields, FieldMap, Level, LogEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
  /// A queued job picked up by a worker.
  Job,
  /// A scheduled command.
  Cron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
  Started,
  Processed,
  Failed,
  Retrying,
}

impl JobStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobStatus::Started => "started",
      JobStatus::Processed => "processed",
      JobStatus::Failed => "failed",
      JobStatus::Retrying => "retrying",
    }
  }
}

/// A queued job or scheduled command run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLog {
  pub kind: JobKind,
  pub level: Level,
  pub message: String,
  pub job_name: String,
  pub job_id: Option<String>,
  pub queue: Option<String>,
  pub connection: Option<String>,
  pub job_status: Option<JobStatus>,
  pub attempts: Option<u32>,
  pub duration_ms: Option<f64>,
  pub payload: Option<String>,
  /// Cron expression, for scheduled commands.
  pub schedule: Option<String>,
  pub common: CommonFields,
}

impl JobLog {
  pub fn job(job_name: impl Into<String>) -> Self {
    Self::with_kind(JobKind::Job, job_name.into())
  }

  pub fn cron(job_name: impl Into<String>, schedule: impl Into<String>) -> Self {
    let mut log = Self::with_kind(JobKind::Cron, job_name.into());
    log.schedule = Some(schedule.into());
    log
  }

  fn with_kind(kind: JobKind, job_name: String) -> Self {
    Self {
      kind,
      level: Level::Info,
      message: job_name.clone(),
      job_name,
      job_id: None,
      queue: None,
      connection: None,
      job_status: None,
      attempts: None,
      duration_ms: None,
      payload: None,
      schedule: None,
      common: CommonFields::default(),
    }
  }

  /// Sets the status and adjusts level and message to match.
  pub fn with_status(mut self, status: JobStatus) -> Self {
    self.job_status = Some(status);
    self.level = match status {
      JobStatus::Failed => Level::Error,
      JobStatus::Retrying => Level::Warning,
      _ => Level::Info,
    };
    self.message = format!("{} {}", self.job_name, status.as_str());
    self
  }
}

impl LogEvent for JobLog {
  fn index(&self) -> &str {
    match self.kind {
      JobKind::Job => index::JOB,
      JobKind::Cron => index::CRON,
    }
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
    writer
      .put("job_name", self.job_name.as_str())
      .put("job_id", self.job_id.as_deref())
      .put("queue", self.queue.as_deref())
      .put("connection", self.connection.as_deref())
      .put("job_status", self.job_status.map(|s| s.as_str()))
      .put("attempts", self.attempts)
      .put("duration_ms", self.duration_ms)
      .put_body("payload", self.payload.as_deref())
      .put("schedule", self.schedule.as_deref());
    writer.finish()
  }
}
