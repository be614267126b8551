use url::Url;

use crate::error::SearchApiError;

/// Default base URL for search requests.
pub const DEFAULT_BASE_URL: &str = "https://www.perplexity.ai";
/// Path of the streaming ask endpoint.
pub const ASK_PATH: &str = "/rest/sse/perplexity_ask";

/// Normalize a base URL to the streaming ask endpoint.
///
/// Normalization rules:
/// 1) empty input falls back to [`DEFAULT_BASE_URL`]
/// 2) keep URLs that already end in the ask path
/// 3) append the ask path otherwise
pub fn normalize_ask_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(ASK_PATH) {
        return trimmed.to_string();
    }
    format!("{trimmed}{ASK_PATH}")
}

/// Endpoint that resumes streaming an unfinished entry.
pub fn reconnect_url(
    base: &str,
    entry_uuid: &str,
    cursor: Option<&str>,
) -> Result<Url, SearchApiError> {
    let endpoint = normalize_ask_url(base);
    let mut url = Url::parse(&endpoint)
        .map_err(|error| SearchApiError::InvalidBaseUrl(format!("{endpoint}: {error}")))?;

    url.path_segments_mut()
        .map_err(|()| SearchApiError::InvalidBaseUrl(endpoint.clone()))?
        .push("reconnect")
        .push(entry_uuid);

    if let Some(cursor) = cursor.map(str::trim).filter(|value| !value.is_empty()) {
        url.query_pairs_mut().append_pair("cursor", cursor);
    }

    Ok(url)
}
