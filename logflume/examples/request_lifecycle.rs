// examples/request_lifecycle.rs

use logflume::{
  init, lifecycle, ApiLog, ErrorLog, IntegrationLog, JobLog, Level, OrmLog,
};
use serde_json::json;
use std::path::Path;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
#[error("card declined: {0}")]
struct PaymentError(String);

fn main() {
  // logflume's own diagnostics go through `tracing`.
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logflume=debug")))
    .init();

  let config_path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/examples/logflume.yaml"));
  let mut pipeline = init::init_from_file(config_path).expect("Failed to initialize logflume");

  if let Some(error_rx) = pipeline.internal_error_rx.take() {
    thread::spawn(move || {
      while let Ok(report) = error_rx.recv() {
        println!("[internal error] {} - {}", report.source, report.error_message);
      }
    });
  }

  // --- One HTTP request ---
  let mut request = pipeline.request_scope(None, None);
  request.scope_mut().user_id = Some("user-17".to_string());

  let outcome: Result<(), PaymentError> = lifecycle::handle_request(&mut request, |logger| {
    logger.orm(OrmLog::query(
      "select * from invoices where id = ? and owner = ?",
      vec![json!(1042), json!("user-17")],
    ));

    let mut charge = IntegrationLog::new("stripe", "post", "https://api.stripe.com/v1/charges").with_status(402);
    charge.duration_ms = Some(183.4);
    charge.response_body = Some(r#"{"error":{"code":"card_declined"}}"#.to_string());
    logger.integration(charge);

    let error = PaymentError("insufficient funds".to_string());
    logger.error(ErrorLog::from_error(&error));
    Err(error)
  });

  let status = if outcome.is_ok() { 200 } else { 402 };
  request.api(ApiLog::new("post", "/invoices/1042/pay").with_status(status).with_duration_ms(201.7));

  // --- A job dispatched by that request ---
  let mut job = pipeline.job_scope(Some(request.scope()));
  let report = request.terminate();
  println!("request flushed {} records: {:?}", report.records, report.totals());

  job.job_started(JobLog::job("SendDeclineNotice"));
  job.message(Level::Notice, "notice queued for delivery");
  let report = job.job_processed(JobLog::job("SendDeclineNotice"));
  println!("job flushed {} records: {:?}", report.records, report.totals());

  // --- Drain the in-process stream ---
  if let Some(tap) = pipeline.streams.get("tap.stream") {
    while let Ok(record) = tap.try_recv() {
      println!("[tap] {} {} {}", record.level, record.index_or("general_log"), record.message);
    }
  }
}
