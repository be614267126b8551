use std::collections::VecDeque;

use entry_merge::{Entry, SourceLink, StreamAccumulator, StreamUpdate};
use futures_util::{Stream, StreamExt};

use crate::cancel::{await_or_cancel, CancellationSignal};
use crate::error::SearchApiError;
use crate::events::decode_entry;
use crate::sse::SseFrameDecoder;

/// Final consolidated result of one ask.
#[derive(Debug, Clone, PartialEq)]
pub struct AskResponse {
    pub entry: Entry,
    pub answer: String,
    pub sources: Vec<SourceLink>,
}

/// Lazy, single-pass sequence of partial entries decoded from a byte stream.
///
/// The body is owned by the stream and dropped as soon as the sequence ends,
/// fails, or is cancelled; dropping the `EntryStream` releases it too.
pub struct EntryStream<S> {
    body: Option<S>,
    decoder: SseFrameDecoder,
    ready: VecDeque<String>,
    cancellation: Option<CancellationSignal>,
}

impl<S, B, E> EntryStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<SearchApiError>,
{
    pub fn new(body: S, cancellation: Option<CancellationSignal>) -> Self {
        Self {
            body: Some(body),
            decoder: SseFrameDecoder::default(),
            ready: VecDeque::new(),
            cancellation,
        }
    }

    /// Next entry, `None` once the body ends or `[DONE]` arrives.
    ///
    /// A server-declared failure, transport error, or cancellation is yielded
    /// once as `Some(Err(..))`; the stream is exhausted afterwards.
    pub async fn next(&mut self) -> Option<Result<Entry, SearchApiError>> {
        loop {
            while let Some(payload) = self.ready.pop_front() {
                match decode_entry(&payload) {
                    Ok(Some(entry)) => return Some(Ok(entry)),
                    Ok(None) => continue,
                    Err(error) => {
                        tracing::warn!(%error, "server reported stream failure");
                        self.ready.clear();
                        self.release();
                        return Some(Err(error));
                    }
                }
            }

            if self.decoder.is_done() {
                self.release();
            }
            let body = self.body.as_mut()?;

            let chunk = match await_or_cancel(body.next(), self.cancellation.as_ref()).await {
                Ok(chunk) => chunk,
                Err(error) => {
                    self.release();
                    return Some(Err(error));
                }
            };

            match chunk {
                Some(Ok(bytes)) => self.ready.extend(self.decoder.feed(bytes.as_ref())),
                Some(Err(error)) => {
                    self.release();
                    return Some(Err(error.into()));
                }
                None => {
                    self.ready.extend(self.decoder.finish());
                    self.release();
                }
            }
        }
    }

    /// True once the underlying body has been released.
    pub fn is_released(&self) -> bool {
        self.body.is_none()
    }

    fn release(&mut self) {
        if self.body.take().is_some() {
            tracing::trace!("released response body");
        }
    }
}

/// Feed every entry of `stream` through a fresh accumulator, invoking
/// `on_update` in arrival order, until the final update or the end of the body.
pub async fn drive_stream<S, B, E, F>(
    stream: &mut EntryStream<S>,
    mut on_update: F,
) -> Result<AskResponse, SearchApiError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Into<SearchApiError>,
    F: FnMut(&StreamUpdate),
{
    let mut accumulator = StreamAccumulator::new();
    let mut received = false;

    while let Some(entry) = stream.next().await {
        let update = accumulator.update(entry?);
        received = true;
        on_update(&update);
        if update.is_final {
            stream.release();
            break;
        }
    }

    if !received {
        return Err(SearchApiError::EmptyStream);
    }

    let sources = accumulator.sources();
    let (entry, answer) = accumulator.into_parts();
    Ok(AskResponse {
        entry,
        answer,
        sources,
    })
}
