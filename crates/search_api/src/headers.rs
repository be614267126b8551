use std::collections::BTreeMap;

use url::Url;

use crate::config::SearchApiConfig;
use crate::error::SearchApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_COOKIE: &str = "cookie";
pub const HEADER_ORIGIN: &str = "origin";
pub const HEADER_REFERER: &str = "referer";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Build a deterministic header map for streaming search requests.
pub fn build_headers(
    config: &SearchApiConfig,
    user_agent: Option<&str>,
) -> Result<BTreeMap<String, String>, SearchApiError> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_ACCEPT.to_owned(), "text/event-stream".to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    if let Some(origin) = site_origin(&config.base_url) {
        headers.insert(HEADER_REFERER.to_owned(), format!("{origin}/"));
        headers.insert(HEADER_ORIGIN.to_owned(), origin);
    }

    let ua = match (user_agent, config.user_agent.as_deref()) {
        (Some(explicit), _) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        (_, Some(explicit)) if !explicit.trim().is_empty() => explicit.trim().to_owned(),
        _ => default_user_agent(),
    };
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    if let Some(cookie) = cookie_header(&config.cookies)? {
        headers.insert(HEADER_COOKIE.to_owned(), cookie);
    }

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

/// Render cookies as a `Cookie` header value, `None` when there are none.
pub fn cookie_header(cookies: &BTreeMap<String, String>) -> Result<Option<String>, SearchApiError> {
    let mut pairs = Vec::with_capacity(cookies.len());
    for (name, value) in cookies {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if name.contains(|c: char| c == '=' || c == ';') || value.contains(';') {
            return Err(SearchApiError::InvalidHeader(format!(
                "cookie '{name}' contains a reserved character"
            )));
        }
        pairs.push(format!("{name}={}", value.trim()));
    }

    if pairs.is_empty() {
        Ok(None)
    } else {
        Ok(Some(pairs.join("; ")))
    }
}

/// Split a `Cookie` header string into name/value pairs. Malformed pairs are skipped.
pub fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                None
            } else {
                Some((name.to_owned(), value.trim().to_owned()))
            }
        })
        .collect()
}

/// `scheme://host[:port]` of the base URL, `None` when it has no usable origin.
fn site_origin(base_url: &str) -> Option<String> {
    let origin = Url::parse(base_url.trim()).ok()?.origin();
    origin
        .is_tuple()
        .then(|| origin.ascii_serialization())
}

fn default_user_agent() -> String {
    format!(
        "searchterm/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
