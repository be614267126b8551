use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};

use crate::cancel::{await_or_cancel, is_cancelled, CancellationSignal};
use crate::config::SearchApiConfig;
use crate::error::{parse_error_message, SearchApiError};
use crate::headers::build_headers;
use crate::payload::AskRequest;
use crate::stream::{drive_stream, AskResponse, EntryStream};
use crate::url::{normalize_ask_url, reconnect_url};
use entry_merge::StreamUpdate;

/// Response body as a boxed byte stream.
pub type BodyStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Entry stream backed by an HTTP response body.
pub type ResponseEntryStream = EntryStream<BodyStream>;

#[derive(Debug)]
pub struct SearchApiClient {
    http: Client,
    config: SearchApiConfig,
}

impl SearchApiClient {
    pub fn new(config: SearchApiConfig) -> Result<Self, SearchApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(SearchApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SearchApiConfig {
        &self.config
    }

    pub fn ask_endpoint(&self) -> String {
        normalize_ask_url(&self.config.base_url)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, SearchApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    SearchApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    SearchApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_request(&self, request: &AskRequest) -> Result<RequestBuilder, SearchApiError> {
        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        Ok(self
            .http
            .post(self.ask_endpoint())
            .headers(headers)
            .json(request))
    }

    pub fn build_reconnect_request(
        &self,
        entry_uuid: &str,
        cursor: Option<&str>,
    ) -> Result<RequestBuilder, SearchApiError> {
        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let url = reconnect_url(&self.config.base_url, entry_uuid, cursor)?;
        Ok(self.http.get(url).headers(headers))
    }

    /// Send a prepared request. Non-2xx responses become [`SearchApiError::Status`];
    /// nothing is retried here.
    async fn send(
        &self,
        request: RequestBuilder,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, SearchApiError> {
        if is_cancelled(cancellation) {
            return Err(SearchApiError::Cancelled);
        }

        let response = await_or_cancel(request.send(), cancellation).await??;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = await_or_cancel(response.text(), cancellation)
            .await?
            .unwrap_or_default();
        let message = parse_error_message(status, &body);
        tracing::warn!(status = status.as_u16(), %message, "search request rejected");
        Err(SearchApiError::Status(status, message))
    }

    fn entry_stream(
        response: Response,
        cancellation: Option<&CancellationSignal>,
    ) -> ResponseEntryStream {
        EntryStream::new(response.bytes_stream().boxed(), cancellation.cloned())
    }

    /// Start an ask and return the raw entry stream.
    pub async fn open_stream(
        &self,
        request: &AskRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ResponseEntryStream, SearchApiError> {
        tracing::debug!(
            frontend_uuid = %request.params.frontend_uuid,
            mode = %request.params.mode,
            "opening ask stream"
        );
        let response = self
            .send(self.build_request(request)?, cancellation)
            .await?;
        Ok(Self::entry_stream(response, cancellation))
    }

    /// Resume streaming an unfinished entry.
    pub async fn open_reconnect_stream(
        &self,
        entry_uuid: &str,
        cursor: Option<&str>,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<ResponseEntryStream, SearchApiError> {
        tracing::debug!(%entry_uuid, cursor = cursor.unwrap_or(""), "reconnecting to entry stream");
        let response = self
            .send(self.build_reconnect_request(entry_uuid, cursor)?, cancellation)
            .await?;
        Ok(Self::entry_stream(response, cancellation))
    }

    pub async fn stream_with_handler<F>(
        &self,
        request: &AskRequest,
        cancellation: Option<&CancellationSignal>,
        on_update: F,
    ) -> Result<AskResponse, SearchApiError>
    where
        F: FnMut(&StreamUpdate),
    {
        let mut stream = self.open_stream(request, cancellation).await?;
        drive_stream(&mut stream, on_update).await
    }

    pub async fn ask(
        &self,
        request: &AskRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<AskResponse, SearchApiError> {
        self.stream_with_handler(request, cancellation, |_| {}).await
    }

    pub async fn reconnect<F>(
        &self,
        entry_uuid: &str,
        cursor: Option<&str>,
        cancellation: Option<&CancellationSignal>,
        on_update: F,
    ) -> Result<AskResponse, SearchApiError>
    where
        F: FnMut(&StreamUpdate),
    {
        let mut stream = self
            .open_reconnect_stream(entry_uuid, cursor, cancellation)
            .await?;
        drive_stream(&mut stream, on_update).await
    }
}
