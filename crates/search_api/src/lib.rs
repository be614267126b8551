//! Transport for the conversational search answer stream.
//!
//! This crate owns request building, response framing and the streaming
//! lifecycle of one ask. It contains no credential handling and no rendering:
//! callers hand in cookies and receive [`StreamUpdate`]s.
//!
//! Bytes are framed into SSE payloads by [`SseFrameDecoder`], classified into
//! entries or fatal server failures by [`events::decode_entry`], and merged by
//! a fresh [`entry_merge::StreamAccumulator`] per request.

pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod sse;
pub mod stream;
pub mod url;

pub use cancel::CancellationSignal;
pub use client::SearchApiClient;
pub use config::SearchApiConfig;
pub use entry_merge::{Entry, SourceLink, StreamUpdate};
pub use error::SearchApiError;
pub use payload::{AskParams, AskRequest};
pub use sse::SseFrameDecoder;
pub use stream::{drive_stream, AskResponse, EntryStream};
pub use url::{normalize_ask_url, reconnect_url};
