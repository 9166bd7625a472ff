use logflume::{init_from_str, ApiLog, GeneralLog, InternalErrorSource, Level, OrmLog, SinkError};
use mockito::{Matcher, Server};

fn search_config(url: &str, silent: bool) -> String {
  format!(
    r#"
stack: [search]
accumulator: {{ defer_by_default: true }}
internal_error_reporting: {{ enabled: true }}
channels:
  search:
    sinks:
      - kind: search_index
        base_url: "{}"
        username: elastic
        password: secret
        max_retries: 3
        retry_backoff: 0s
        timeout: 2s
        silent: {}
"#,
    url, silent
  )
}

#[test]
fn search_single_write_retries_until_exhausted() {
  let mut server = Server::new();
  let mock = server
    .mock("POST", "/api_log/_doc")
    .with_status(503)
    .with_body("unavailable")
    .expect(3)
    .create();

  let pipeline = init_from_str(&search_config(&server.url(), false)).unwrap();
  let mut logger = pipeline.request_scope(Some("req-1".into()), None);

  let result = logger.api_now(ApiLog::new("get", "/health").with_status(200));

  mock.assert();
  match result {
    Err(SinkError::Status { status, .. }) => assert_eq!(status, 503),
    other => panic!("expected a 503 status error, got {:?}", other),
  }
}

#[test]
fn silent_search_sink_swallows_and_reports() {
  let mut server = Server::new();
  let mock = server
    .mock("POST", "/general_log/_doc")
    .with_status(503)
    .expect(3)
    .create();

  let pipeline = init_from_str(&search_config(&server.url(), true)).unwrap();
  let mut logger = pipeline.cli_scope();

  let report = logger
    .general_now(GeneralLog::new(Level::Warning, "disk almost full"))
    .unwrap();

  mock.assert();
  assert_eq!(report.channels["search"].suppressed, 1);
  let rx = pipeline.internal_error_rx.as_ref().unwrap();
  let reported = rx.try_recv().unwrap();
  assert_eq!(
    reported.source,
    InternalErrorSource::SinkWrite {
      channel: "search".to_string(),
      sink: "search.search_index".to_string(),
    }
  );
}

#[test]
fn search_flush_sends_one_bulk_request_per_index() {
  let mut server = Server::new();
  let api_bulk = server
    .mock("POST", "/api_log/_bulk")
    .match_header("content-type", "application/x-ndjson")
    .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
    .match_body(Matcher::Regex(r#"\{"index":\{\}\}"#.to_string()))
    .with_status(200)
    .with_body(r#"{"errors":false,"items":[{"index":{"status":201}},{"index":{"status":201}}]}"#)
    .expect(1)
    .create();
  let general_bulk = server
    .mock("POST", "/general_log/_bulk")
    .with_status(200)
    .with_body(
      r#"{"errors":true,"items":[{"index":{"status":400,"error":{"type":"mapper_parsing_exception"}}}]}"#,
    )
    .expect(1)
    .create();

  let pipeline = init_from_str(&search_config(&server.url(), false)).unwrap();
  let mut logger = pipeline.request_scope(None, None);
  logger.api(ApiLog::new("get", "/a").with_status(200));
  logger.info("between");
  logger.api(ApiLog::new("get", "/b").with_status(404));

  let report = logger.terminate();

  api_bulk.assert();
  general_bulk.assert();
  let counts = report.channel("search").unwrap();
  assert_eq!(counts.written, 2);
  assert_eq!(counts.rejected, 1);
  assert_eq!(counts.failed, 0);
}

#[test]
fn failed_index_bulk_does_not_resend_accepted_index() {
  let mut server = Server::new();
  let api_bulk = server
    .mock("POST", "/api_log/_bulk")
    .with_status(200)
    .with_body(r#"{"errors":false,"items":[{"index":{"status":201}}]}"#)
    .expect(1)
    .create();
  let orm_bulk = server
    .mock("POST", "/orm_log/_bulk")
    .with_status(400)
    .with_body("mapper_parsing_exception")
    .expect(1)
    .create();
  let api_doc = server.mock("POST", "/api_log/_doc").expect(0).create();
  let orm_doc = server
    .mock("POST", "/orm_log/_doc")
    .with_status(400)
    .expect(1)
    .create();

  let pipeline = init_from_str(&search_config(&server.url(), false)).unwrap();
  let mut logger = pipeline.request_scope(None, None);
  logger.api(ApiLog::new("get", "/a").with_status(200));
  logger.orm(OrmLog::query("select 1", vec![]));

  let report = logger.terminate();

  api_bulk.assert();
  orm_bulk.assert();
  api_doc.assert();
  orm_doc.assert();
  let counts = report.channel("search").unwrap();
  assert_eq!(counts.written, 1);
  assert_eq!(counts.failed, 1);
}

#[test]
fn broker_flush_produces_one_batch() {
  let mut server = Server::new();
  let mock = server
    .mock("POST", "/topics/app-logs")
    .match_header("content-type", "application/vnd.kafka.json.v2+json")
    .match_body(Matcher::AllOf(vec![
      Matcher::Regex(r#"^\{"records":\[\{"value":\{"#.to_string()),
      Matcher::Regex(r#""message":"first""#.to_string()),
      Matcher::Regex(r#""message":"second""#.to_string()),
      Matcher::Regex(r#""channel":"broker""#.to_string()),
    ]))
    .with_status(200)
    .with_body(r#"{"offsets":[{"partition":0,"offset":1},{"partition":0,"offset":2}]}"#)
    .expect(1)
    .create();

  let yaml = format!(
    r#"
stack: [broker]
channels:
  broker:
    sinks:
      - {{ kind: broker, rest_proxy_url: "{}", topic: app-logs, value_builder: flat }}
"#,
    server.url()
  );
  let pipeline = init_from_str(&yaml).unwrap();
  let mut logger = pipeline.cli_scope();
  logger.info("first");
  logger.info("second");
  let report = logger.terminate();

  mock.assert();
  assert_eq!(report.channel("broker").unwrap().written, 2);
}

#[test]
fn broker_does_not_retry() {
  let mut server = Server::new();
  let mock = server
    .mock("POST", "/topics/app-logs")
    .with_status(500)
    .expect(1)
    .create();

  let yaml = format!(
    r#"
channels:
  broker:
    sinks:
      - {{ kind: broker, rest_proxy_url: "{}", topic: app-logs, silent: false }}
"#,
    server.url()
  );
  let pipeline = init_from_str(&yaml).unwrap();
  let mut logger = pipeline.cli_scope();

  let result = logger.general_now(GeneralLog::new(Level::Error, "lost"));

  mock.assert();
  assert!(matches!(result, Err(SinkError::Status { status: 500, .. })));
}
