use std::time::Duration;

use serde_json::Value;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, USER_AGENT};
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::error::SocketRpcError;

pub const DEFAULT_SOCKET_URL: &str = "wss://www.perplexity.ai/socket.io/?EIO=4&transport=websocket";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SocketRpcConfig {
    pub url: String,
    /// Raw `Cookie` header sent with the upgrade request.
    pub cookie_header: Option<String>,
    pub user_agent: Option<String>,
    /// Payload of the namespace join frame.
    pub auth: Option<Value>,
    /// Bounds the whole handshake: socket open, open frame, join ack.
    pub connect_timeout: Duration,
    /// Per-call default for [`crate::SocketRpcClient::emit_with_ack`].
    pub ack_timeout: Duration,
}

impl Default for SocketRpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOCKET_URL.to_owned(),
            cookie_header: None,
            user_agent: None,
            auth: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

impl SocketRpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_cookie_header(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookie_header = Some(cookie_header.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Upgrade request carrying the configured cookie and user agent.
    pub fn client_request(&self) -> Result<Request, SocketRpcError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|error| SocketRpcError::InvalidUrl(format!("{}: {error}", self.url)))?;

        let headers = [
            (COOKIE, self.cookie_header.as_deref()),
            (USER_AGENT, self.user_agent.as_deref()),
        ];
        for (name, value) in headers {
            let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
                continue;
            };
            let value = HeaderValue::from_str(value).map_err(|_| {
                SocketRpcError::InvalidUrl(format!("invalid {name} header value"))
            })?;
            request.headers_mut().insert(name, value);
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timeouts() {
        let config = SocketRpcConfig::new();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ack_timeout, Duration::from_secs(30));
        assert!(config.url.contains("EIO=4"));
    }

    #[test]
    fn client_request_carries_cookie_and_user_agent() {
        let request = SocketRpcConfig::new()
            .with_url("ws://127.0.0.1:9/socket.io/?EIO=4&transport=websocket")
            .with_cookie_header("session=abc")
            .with_user_agent("searchterm-test")
            .client_request()
            .expect("request");

        assert_eq!(request.uri().host(), Some("127.0.0.1"));
        assert_eq!(
            request.headers().get(COOKIE).and_then(|v| v.to_str().ok()),
            Some("session=abc")
        );
        assert_eq!(
            request.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()),
            Some("searchterm-test")
        );
    }

    #[test]
    fn client_request_rejects_bad_url() {
        let error = SocketRpcConfig::new()
            .with_url("not a url")
            .client_request()
            .expect_err("invalid url");
        assert!(matches!(error, SocketRpcError::InvalidUrl(_)));
    }
}
