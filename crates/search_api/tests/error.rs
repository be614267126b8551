use reqwest::StatusCode;

use search_api::error::parse_error_message;
use search_api::SearchApiError;

#[test]
fn parse_error_message_prefers_error_message_field() {
    let body = r#"{"error":{"code":"bad_request","message":"invalid query"}}"#;
    let message = parse_error_message(StatusCode::BAD_REQUEST, body);
    assert_eq!(message, "invalid query");
}

#[test]
fn parse_error_message_reads_detail_string_and_object() {
    let message = parse_error_message(StatusCode::FORBIDDEN, r#"{"detail":"login required"}"#);
    assert_eq!(message, "login required");

    let message = parse_error_message(
        StatusCode::TOO_MANY_REQUESTS,
        r#"{"detail":{"message":"slow down"}}"#,
    );
    assert_eq!(message, "slow down");
}

#[test]
fn parse_error_message_falls_back_to_raw_body_or_reason() {
    let message = parse_error_message(StatusCode::INTERNAL_SERVER_ERROR, "raw failure text");
    assert_eq!(message, "raw failure text");

    let message = parse_error_message(StatusCode::BAD_GATEWAY, "");
    assert_eq!(message, "Bad Gateway");
}

#[test]
fn stream_failure_display_includes_code() {
    let error = SearchApiError::StreamFailed {
        code: Some("E1".to_owned()),
        message: "quota exceeded".to_owned(),
    };
    assert_eq!(error.to_string(), "stream failed (E1): quota exceeded");

    let error = SearchApiError::StreamFailed {
        code: None,
        message: "quota exceeded".to_owned(),
    };
    assert_eq!(error.to_string(), "stream failed: quota exceeded");
}
