use crate::error::ModelResult;
use crate::models::{Message, MessageChunk, StreamingChatResponse};
use futures::{future, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Runtime;

/// Raw fragments as produced by a provider
pub type StreamingResponse = Pin<Box<dyn Stream<Item = ModelResult<StreamingChatResponse>> + Send>>;

/// Text deltas of one streamed reply.
///
/// Fragments without content (role announcements, finish markers, usage-only
/// chunks) are skipped. Single pass; dropping it stops consumption.
pub struct DeltaStream {
    inner: Pin<Box<dyn Stream<Item = ModelResult<MessageChunk>> + Send>>,
}

impl DeltaStream {
    pub fn new(fragments: StreamingResponse) -> Self {
        let inner = fragments.filter_map(|fragment| {
            future::ready(match fragment {
                Ok(chunk) => chunk.delta_content().map(|text| Ok(MessageChunk::new(text))),
                Err(e) => Some(Err(e)),
            })
        });
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Wrap an already-filtered chunk stream
    pub fn from_chunks(chunks: impl Stream<Item = ModelResult<MessageChunk>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(chunks),
        }
    }

    /// Drain the stream into a single assistant message
    pub async fn collect_message(mut self) -> ModelResult<Message> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk?);
        }
        Ok(MessageChunk::concat(&chunks))
    }
}

impl Stream for DeltaStream {
    type Item = ModelResult<MessageChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Synchronous view over a [`DeltaStream`], driven by a borrowed runtime
pub struct BlockingDeltaStream<'a> {
    runtime: &'a Runtime,
    inner: DeltaStream,
}

impl<'a> BlockingDeltaStream<'a> {
    pub(crate) fn new(runtime: &'a Runtime, inner: DeltaStream) -> Self {
        Self { runtime, inner }
    }
}

impl Iterator for BlockingDeltaStream<'_> {
    type Item = ModelResult<MessageChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.runtime.block_on(self.inner.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn fragments(deltas: Vec<Option<&'static str>>) -> StreamingResponse {
        Box::pin(stream::iter(
            deltas
                .into_iter()
                .map(|d| Ok(StreamingChatResponse::from_delta(d))),
        ))
    }

    #[test]
    fn null_deltas_are_dropped() {
        let deltas = DeltaStream::new(fragments(vec![Some("Neu"), Some("tral"), None, Some(".")]));
        let texts: Vec<String> = tokio_test::block_on(
            deltas.map(|c| c.unwrap().content).collect::<Vec<_>>(),
        );
        assert_eq!(texts, vec!["Neu", "tral", "."]);
    }

    #[test]
    fn collect_message_stops_at_first_error() {
        let items: Vec<ModelResult<StreamingChatResponse>> = vec![
            Ok(StreamingChatResponse::from_delta(Some("partial"))),
            Err(ModelError::Stream("reset".into())),
            Ok(StreamingChatResponse::from_delta(Some("never"))),
        ];
        let deltas = DeltaStream::new(Box::pin(stream::iter(items)));
        let err = tokio_test::block_on(deltas.collect_message()).unwrap_err();
        assert!(matches!(err, ModelError::Stream(msg) if msg == "reset"));
    }
}
