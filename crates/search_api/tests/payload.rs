use search_api::{AskRequest, SearchApiClient, SearchApiConfig};
use serde_json::Value;

#[test]
fn payload_serialization_defaults() {
    let request = AskRequest::new("what is rust");
    let body = serde_json::to_value(&request).expect("serialize payload");

    assert_eq!(body["query_str"], Value::String("what is rust".to_owned()));
    let params = &body["params"];
    assert_eq!(params["mode"], "concise");
    assert_eq!(params["sources"], serde_json::json!(["web"]));
    assert_eq!(params["language"], "en-US");
    assert_eq!(params["use_schematized_api"], Value::Bool(true));
    assert_eq!(params["send_back_text_in_streaming_api"], Value::Bool(false));
    assert_eq!(params["is_incognito"], Value::Bool(false));
    assert!(params.get("model_preference").is_none());
    assert!(params.get("last_backend_uuid").is_none());
    assert_eq!(
        params["frontend_uuid"].as_str().map(str::len),
        Some(36),
        "frontend uuid should be a hyphenated v4 uuid"
    );
}

#[test]
fn payload_builders_set_optional_fields() {
    let request = AskRequest::new("follow")
        .with_mode("copilot")
        .with_model("pplx_pro")
        .with_sources(["web", "scholar"])
        .with_language("de-DE")
        .follow_up("backend-1")
        .incognito(true);
    let body = serde_json::to_value(&request).expect("serialize payload");
    let params = &body["params"];

    assert_eq!(params["mode"], "copilot");
    assert_eq!(params["model_preference"], "pplx_pro");
    assert_eq!(params["sources"], serde_json::json!(["web", "scholar"]));
    assert_eq!(params["language"], "de-DE");
    assert_eq!(params["last_backend_uuid"], "backend-1");
    assert_eq!(params["query_source"], "followup");
    assert_eq!(params["is_incognito"], Value::Bool(true));
}

#[test]
fn payload_frontend_uuid_is_fresh_per_request() {
    let first = AskRequest::new("a");
    let second = AskRequest::new("a");
    assert_ne!(first.params.frontend_uuid, second.params.frontend_uuid);
}

#[test]
fn payload_is_sent_as_json_body() {
    let client = SearchApiClient::new(SearchApiConfig::new()).expect("client");
    let request = client
        .build_request(&AskRequest::new("body check"))
        .expect("build request")
        .build()
        .expect("request");

    let body = request
        .body()
        .and_then(|body| body.as_bytes())
        .expect("buffered JSON body");
    let parsed: Value = serde_json::from_slice(body).expect("JSON body");
    assert_eq!(parsed["query_str"], "body check");
}
