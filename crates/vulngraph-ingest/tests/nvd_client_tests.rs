//! NVD API client tests against a mock server

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vulngraph_ingest::config::NvdConfig;
use vulngraph_ingest::error::TaskError;
use vulngraph_ingest::framework::RetryPolicy;
use vulngraph_ingest::nvd::{year_windows, NvdClient};
use wiremock::matchers::{header, method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(ids: &[&str], start_index: usize, total: usize) -> serde_json::Value {
    let items: Vec<_> = ids.iter().map(|id| json!({"cve": {"id": id}})).collect();
    json!({
        "resultsPerPage": ids.len(),
        "startIndex": start_index,
        "totalResults": total,
        "vulnerabilities": items
    })
}

fn client(server: &MockServer, api_key: Option<&str>) -> NvdClient {
    let config = NvdConfig {
        base_url: server.uri(),
        api_key: api_key.map(str::to_string),
        max_calls: 50,
        ..NvdConfig::default()
    };
    NvdClient::new(&config).unwrap().with_retry_policy(RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    })
}

#[tokio::test]
async fn test_window_paged_by_start_index() {
    common::init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("startIndex", "0"))
        .and(query_param("resultsPerPage", "2"))
        .and(query_param("pubStartDate", "2021-01-01T00:00:00.000"))
        .and(query_param("pubEndDate", "2021-04-30T23:59:59.999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            &["CVE-2021-0001", "CVE-2021-0002"],
            0,
            3,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("startIndex", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["CVE-2021-0003"], 2, 3)))
        .expect(1)
        .mount(&server)
        .await;

    let window = year_windows(2021, 2021).unwrap()[0];
    let records = client(&server, None)
        .with_page_size(2)
        .fetch_window(window, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<_> = records.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["CVE-2021-0001", "CVE-2021-0002", "CVE-2021-0003"]);
}

#[tokio::test]
async fn test_api_key_sent_as_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("apiKey", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["CVE-2021-0001"], 0, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let window = year_windows(2021, 2021).unwrap()[0];
    let records = client(&server, Some("secret-key"))
        .fetch_window(window, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_rate_limited_response_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["CVE-2021-0001"], 0, 1)))
        .with_priority(2)
        .mount(&server)
        .await;

    let window = year_windows(2021, 2021).unwrap()[0];
    let records = client(&server, None)
        .fetch_window(window, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let window = year_windows(2021, 2021).unwrap()[0];
    let err = client(&server, None)
        .fetch_window(window, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Transient(_)));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let window = year_windows(2021, 2021).unwrap()[0];
    let err = client(&server, None)
        .fetch_window(window, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::Failed(_)));
}

#[tokio::test]
async fn test_fetch_years_fans_out_windows() {
    common::init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("pubStartDate", "2021-08-29T00:00:00.000"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["CVE-2021-0001"], 0, 1)))
        .with_priority(2)
        .mount(&server)
        .await;

    let client = Arc::new(client(&server, None));
    let fetched = client
        .fetch_years(2021, 2021, 2, CancellationToken::new())
        .await
        .unwrap();

    // Four windows in 2021, the third one fails
    assert_eq!(fetched.records.len(), 3);
    assert_eq!(fetched.failed_windows.len(), 1);
    assert_eq!(fetched.failed_windows[0].0, year_windows(2021, 2021).unwrap()[2]);
}
