//! Tests for the observations module

use super::*;
use crate::error::Error;
use crate::http::{HttpClient, HttpClientConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_record() -> serde_json::Value {
    json!({
        "speciesCode": "gyrfal",
        "comName": "Gyrfalcon",
        "sciName": "Falco rusticolus",
        "locId": "L123456",
        "locName": "Samish Flats",
        "obsDt": "2024-01-14 10:05",
        "howMany": 1,
        "lat": 48.55,
        "lng": -122.42,
        "obsValid": true,
        "obsReviewed": false,
        "locationPrivate": false,
        "subId": "S158000000",
        "exoticCategory": "N"
    })
}

fn client_for(server: &MockServer) -> ObservationsClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .max_retries(0)
        .no_rate_limit()
        .build();
    ObservationsClient::new(HttpClient::with_config(config).unwrap(), "test-token")
}

#[test]
fn test_observation_decodes_camel_case_and_keeps_extra_fields() {
    let obs: Observation = serde_json::from_value(sample_record()).unwrap();

    assert_eq!(obs.species_code.as_deref(), Some("gyrfal"));
    assert_eq!(obs.how_many, Some(1));
    assert_eq!(obs.lat, Some(48.55));
    assert_eq!(obs.year_month(), Some("2024-01"));
    assert_eq!(obs.extra.get("exoticCategory"), Some(&json!("N")));

    let encoded = serde_json::to_value(&obs).unwrap();
    assert_eq!(encoded["speciesCode"], "gyrfal");
    assert_eq!(encoded["exoticCategory"], "N");
}

#[test]
fn test_observation_with_missing_fields() {
    let obs: Observation =
        serde_json::from_value(json!({"speciesCode": "snoowl1", "obsDt": "2024-02"})).unwrap();

    assert!(obs.how_many.is_none());
    assert!(obs.lat.is_none());
    assert_eq!(obs.year_month(), Some("2024-02"));

    let short: Observation = serde_json::from_value(json!({"obsDt": "2024"})).unwrap();
    assert_eq!(short.year_month(), None);
}

#[test]
fn test_to_json_lines() {
    let first: Observation = serde_json::from_value(sample_record()).unwrap();
    let second = Observation {
        species_code: Some("snoowl1".to_string()),
        ..Observation::default()
    };

    let lines = to_json_lines(&[first, second]).unwrap();
    let split: Vec<&str> = lines.split('\n').collect();

    assert_eq!(split.len(), 2);
    assert!(!lines.ends_with('\n'));
    let parsed: serde_json::Value = serde_json::from_str(split[1]).unwrap();
    assert_eq!(parsed["speciesCode"], "snoowl1");
    assert!(parsed["howMany"].is_null());
}

#[test]
fn test_to_json_lines_empty() {
    assert_eq!(to_json_lines::<serde_json::Value>(&[]).unwrap(), "");
}

#[test]
fn test_year_months_skips_undecodable_records() {
    let records = vec![
        sample_record(),
        json!({"obsDt": "2023-12-30"}),
        json!({"obsDt": "2024-01-02 07:30"}),
        json!({"obsDt": 20240101}),
        json!({"speciesCode": "snoowl1"}),
    ];

    let months: Vec<String> = year_months(&records).into_iter().collect();
    assert_eq!(months, vec!["2023-12".to_string(), "2024-01".to_string()]);
}

#[test]
fn test_client_debug_redacts_api_key() {
    let client = ObservationsClient::new(
        HttpClient::with_config(HttpClientConfig::builder().no_rate_limit().build()).unwrap(),
        "secret-token",
    );

    let debug = format!("{client:?}");
    assert!(debug.contains("<redacted>"));
    assert!(!debug.contains("secret-token"));
}

#[tokio::test]
async fn test_recent_notable_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/obs/US-WA-073/recent/notable"))
        .and(query_param("maxResults", "1000"))
        .and(query_param("back", "7"))
        .and(header(API_TOKEN_HEADER, "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([sample_record()])))
        .expect(1)
        .mount(&server)
        .await;

    let records = client_for(&server)
        .recent_notable("US-WA-073", 1000, 7)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0], sample_record());
}

#[tokio::test]
async fn test_recent_notable_keeps_records_verbatim() {
    let server = MockServer::start().await;
    let odd = json!({"speciesCode": "snoowl1", "howMany": "X", "lat": 48.1});

    Mock::given(method("GET"))
        .and(path("/data/obs/US-WA-073/recent/notable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([sample_record(), odd])))
        .mount(&server)
        .await;

    let records = client_for(&server)
        .recent_notable("US-WA-073", 10, 1)
        .await
        .unwrap();

    let lines = to_json_lines(&records).unwrap();
    let second: serde_json::Value = serde_json::from_str(lines.lines().nth(1).unwrap()).unwrap();
    assert_eq!(second, odd);
    assert!(second.get("comName").is_none());
}

#[tokio::test]
async fn test_recent_notable_rejects_non_array() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/obs/US-WA-073/recent/notable"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": []})))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .recent_notable("US-WA-073", 10, 1)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { .. }));
}

#[tokio::test]
async fn test_recent_notable_bad_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .recent_notable("US-WA-073", 10, 1)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 403, .. }));
}
