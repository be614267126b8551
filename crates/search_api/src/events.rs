use entry_merge::{Entry, EntryStatus};
use serde_json::Value;

use crate::error::SearchApiError;

const FALLBACK_FAILURE_MESSAGE: &str = "search request failed";

/// Classify one decoded SSE payload.
///
/// - `Ok(Some(entry))`: a partial entry to merge.
/// - `Ok(None)`: noise (not JSON, or JSON that is not an entry); skip it.
/// - `Err(StreamFailed)`: the server reported a failure; the stream must end.
pub fn decode_entry(payload: &str) -> Result<Option<Entry>, SearchApiError> {
    let value = match serde_json::from_str::<Value>(payload) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(%error, "skipping unparseable stream payload");
            return Ok(None);
        }
    };

    if let Some(failure) = stream_failure(&value) {
        return Err(failure);
    }

    match serde_json::from_value::<Entry>(value) {
        Ok(entry) => Ok(Some(entry)),
        Err(error) => {
            tracing::debug!(%error, "skipping stream payload that is not an entry");
            Ok(None)
        }
    }
}

/// Server-declared failure carried by a payload, if any.
pub fn stream_failure(value: &Value) -> Option<SearchApiError> {
    let object = value.as_object()?;

    let failed_status = object
        .get("status")
        .and_then(Value::as_str)
        .map(EntryStatus::parse)
        .is_some_and(|status| status.is_failure());
    let code = object.get("error_code").and_then(non_empty_code);

    if !failed_status && code.is_none() {
        return None;
    }

    let message = ["text", "error_message", "message"]
        .iter()
        .find_map(|key| {
            object
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .unwrap_or(FALLBACK_FAILURE_MESSAGE)
        .to_owned();

    Some(SearchApiError::StreamFailed { code, message })
}

fn non_empty_code(value: &Value) -> Option<String> {
    match value {
        Value::String(code) if !code.trim().is_empty() => Some(code.trim().to_owned()),
        Value::Number(code) => Some(code.to_string()),
        _ => None,
    }
}
