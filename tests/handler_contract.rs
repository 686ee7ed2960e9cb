//! Purpose: Contract tests for one invocation, end to end through the public API.
//! Exports: None (integration test module).
//! Role: Pin the response envelope for empty, single-page, multi-page, and failing scans.
//! Invariants: Uses the in-memory table only; no network access.

use recordscan::api::{
    Accumulation, ErrorKind, FailurePolicy, HandlerConfig, Invocation, MemoryTable,
    RecordsHandler, ResponseEnvelope, Row,
};
use serde_json::{Value, json};

fn job(idx: usize) -> Row {
    Row::new()
        .with_attribute("id", json!({ "S": format!("job-{idx}") }))
        .with_attribute("status", json!({ "S": "COMPLETE" }))
        .with_attribute("durationMs", json!({ "N": (idx * 1000).to_string() }))
}

fn jobs(count: usize) -> Vec<Row> {
    (0..count).map(job).collect()
}

async fn invoke(table: MemoryTable, config: HandlerConfig) -> ResponseEnvelope {
    RecordsHandler::new(table, config)
        .handle(&Invocation::default())
        .await
}

fn body_ids(envelope: &ResponseEnvelope) -> Vec<String> {
    let body: Value = serde_json::from_str(&envelope.body).expect("body json");
    body.as_array()
        .expect("array body")
        .iter()
        .map(|row| row["id"]["S"].as_str().expect("id").to_string())
        .collect()
}

fn config() -> HandlerConfig {
    HandlerConfig::new().with_table("jobs")
}

#[tokio::test]
async fn empty_table_answers_200_with_empty_array() {
    let envelope = invoke(MemoryTable::new().with_table("jobs", Vec::new()), config()).await;
    assert_eq!(envelope.status_code, 200);
    assert_eq!(envelope.body, "[]");
    assert_eq!(envelope.content_type(), Some("application/json"));
}

#[tokio::test]
async fn single_page_returns_every_row_in_order() {
    let table = MemoryTable::new().with_table("jobs", jobs(4)).with_page_size(10);
    let envelope = invoke(table, config()).await;
    assert_eq!(body_ids(&envelope), ["job-0", "job-1", "job-2", "job-3"]);
}

#[tokio::test]
async fn multi_page_returns_union_of_pages_by_default() {
    let table = MemoryTable::new().with_table("jobs", jobs(7)).with_page_size(3);
    let envelope = invoke(table, config()).await;
    assert_eq!(envelope.status_code, 200);
    assert_eq!(body_ids(&envelope).len(), 7);
    assert_eq!(body_ids(&envelope)[6], "job-6");
}

#[tokio::test]
async fn last_page_mode_reproduces_legacy_reset() {
    let table = MemoryTable::new().with_table("jobs", jobs(7)).with_page_size(3);
    let envelope = invoke(table, config().with_accumulation(Accumulation::LastPage)).await;
    assert_eq!(body_ids(&envelope), ["job-6"]);
}

#[tokio::test]
async fn page_limit_bounds_each_fetch() {
    let table = MemoryTable::new().with_table("jobs", jobs(5)).with_page_size(100);
    let handler = RecordsHandler::new(table, config().with_page_limit(Some(2)));
    let envelope = handler.handle(&Invocation::default()).await;
    assert_eq!(body_ids(&envelope).len(), 5);
    assert_eq!(handler.source().fetch_count(), 3);
}

#[tokio::test]
async fn first_fetch_failure_still_answers_200_with_empty_array() {
    let table = MemoryTable::new()
        .with_table("jobs", jobs(3))
        .fail_on_fetch(0, ErrorKind::Permission, "not authorized to scan");
    let envelope = invoke(table, config()).await;
    assert_eq!(envelope.status_code, 200);
    assert_eq!(envelope.body, "[]");
}

#[tokio::test]
async fn mid_scan_failure_keeps_rows_gathered_so_far() {
    let table = MemoryTable::new()
        .with_table("jobs", jobs(9))
        .with_page_size(3)
        .fail_on_fetch(2, ErrorKind::Throttled, "throughput exceeded");
    let handler = RecordsHandler::new(table, config());
    let envelope = handler.handle(&Invocation::default()).await;
    assert_eq!(envelope.status_code, 200);
    assert_eq!(
        body_ids(&envelope),
        ["job-0", "job-1", "job-2", "job-3", "job-4", "job-5"]
    );
    assert_eq!(handler.source().fetch_count(), 3);
}

#[tokio::test]
async fn mid_scan_failure_under_last_page_keeps_latest_page() {
    let table = MemoryTable::new()
        .with_table("jobs", jobs(9))
        .with_page_size(3)
        .fail_on_fetch(2, ErrorKind::Io, "connection reset");
    let envelope = invoke(table, config().with_accumulation(Accumulation::LastPage)).await;
    assert_eq!(body_ids(&envelope), ["job-3", "job-4", "job-5"]);
}

#[tokio::test]
async fn surface_policy_reports_missing_table() {
    let envelope = invoke(
        MemoryTable::new(),
        config().with_failure_policy(FailurePolicy::Surface),
    )
    .await;
    assert_eq!(envelope.status_code, 502);
    let body: Value = serde_json::from_str(&envelope.body).expect("json");
    assert_eq!(body["error"]["kind"], "NotFound");
    assert_eq!(body["error"]["table"], "jobs");
}

#[tokio::test]
async fn rows_round_trip_byte_for_byte() {
    let raw = [
        r#"{"id":{"S":"job-1"},"outputs":{"L":[{"M":{"uri":{"S":"s3://b/k.mp4"}}}]},"thumb":{"B":"iVBORw0K"}}"#,
        r#"{"deleted":{"NULL":true},"id":{"S":"job-2"},"sizes":{"NS":["1","10.5"]},"tags":{"SS":["hd","web"]}}"#,
    ];
    let rows: Vec<Row> = raw
        .iter()
        .map(|line| serde_json::from_str(line).expect("row"))
        .collect();
    let table = MemoryTable::new().with_table("jobs", rows).with_page_size(1);
    let envelope = invoke(table, config()).await;
    assert_eq!(envelope.body, format!("[{},{}]", raw[0], raw[1]));
}

#[tokio::test]
async fn rows_keep_stored_attribute_order() {
    let raw = [
        r#"{"status":{"S":"COMPLETE"},"id":{"S":"job-1"}}"#,
        r#"{"thumb":{"B":"iVBORw0K"},"outputs":{"M":{"uri":{"S":"s3://b/k.mp4"},"codec":{"S":"h264"}}},"id":{"S":"job-2"}}"#,
    ];
    let rows: Vec<Row> = raw
        .iter()
        .map(|line| serde_json::from_str(line).expect("row"))
        .collect();
    let table = MemoryTable::new().with_table("jobs", rows).with_page_size(1);
    let envelope = invoke(table, config()).await;
    assert_eq!(envelope.body, format!("[{},{}]", raw[0], raw[1]));
}

#[tokio::test]
async fn envelope_json_shape_is_stable() {
    let envelope = invoke(MemoryTable::new().with_table("jobs", Vec::new()), config()).await;
    let value = serde_json::to_value(&envelope).expect("json");
    assert_eq!(
        value,
        json!({
            "statusCode": 200,
            "headers": { "Content-Type": "application/json" },
            "body": "[]"
        })
    );
}
