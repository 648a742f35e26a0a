//! Reference Data Integration Tests
//!
//! Runs the HTTP client against a local mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use c9t_stream_client::{FetchError, Interval, ReferenceDataClient};

async fn setup() -> (MockServer, ReferenceDataClient) {
    let server = MockServer::start().await;
    let client = ReferenceDataClient::with_urls(
        &format!("{}/api/v1/instruments", server.uri()),
        &format!("{}/historical", server.uri()),
    )
    .unwrap();
    (server, client)
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    instrument_id: String,
    display_name: String,
}

#[tokio::test]
async fn instruments_decode_into_caller_type() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/instruments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"instrumentId": "EUR_USD", "displayName": "EUR/USD", "pip": 0.0001},
            {"instrumentId": "XAU_USD", "displayName": "Gold"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let instruments: Vec<Instrument> = client.fetch_instruments().await.unwrap();

    assert_eq!(
        instruments,
        vec![
            Instrument {
                instrument_id: "EUR_USD".to_string(),
                display_name: "EUR/USD".to_string(),
            },
            Instrument {
                instrument_id: "XAU_USD".to_string(),
                display_name: "Gold".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn historical_query_with_open_end() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/historical"))
        .and(query_param("instrumentId", "EUR_USD"))
        .and(query_param("interval", "M15"))
        .and(query_param("start", "2024-03-01T00:00:00.000Z"))
        .and(query_param("end", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[1_709_251_200_000_i64, 1.08]])))
        .expect(1)
        .mount(&server)
        .await;

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let prices: Value = client
        .fetch_historical_price("EUR_USD", Interval::M15, start, None)
        .await
        .unwrap();

    assert_eq!(prices, json!([[1_709_251_200_000_i64, 1.08]]));
}

#[tokio::test]
async fn historical_query_with_end() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/historical"))
        .and(query_param("interval", "D1"))
        .and(query_param("end", "2024-03-08T12:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap();
    let prices: Vec<Value> = client
        .fetch_historical_price("EUR_USD", Interval::D1, start, Some(end))
        .await
        .unwrap();

    assert!(prices.is_empty());
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/instruments"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client.fetch_instruments::<Value>().await.unwrap_err();

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_json_is_a_decode_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/instruments"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client.fetch_instruments::<Value>().await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn unreachable_host_is_a_network_error() {
    let client = ReferenceDataClient::with_urls("http://127.0.0.1:9/instruments", "http://127.0.0.1:9/historical")
        .unwrap();

    let err = client.fetch_instruments::<Value>().await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}
