use std::time::Duration;

use search_api::{normalize_ask_url, SearchApiClient, SearchApiConfig};

#[test]
fn smoke_client_constructs_from_config() {
    let config = SearchApiConfig::new()
        .with_base_url("https://www.perplexity.ai")
        .with_cookie("session", "abc")
        .with_timeout(Duration::from_secs(90));

    let client = SearchApiClient::new(config).expect("client creation should succeed");
    assert_eq!(
        normalize_ask_url("https://www.perplexity.ai"),
        client.ask_endpoint()
    );
    assert_eq!(
        client.config().cookies.get("session"),
        Some(&"abc".to_owned())
    );
    assert_eq!(client.config().timeout, Some(Duration::from_secs(90)));
}
