//! Single-node conversation graph: start -> chat -> end.
//!
//! Each turn loads the thread's latest state, appends the input, checkpoints,
//! runs the chat node over the whole history, appends the reply and
//! checkpoints again.

use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::client::ChatAdapter;
use crate::error::ModelResult;
use crate::models::{Message, MessageChunk};
use crate::streaming::DeltaStream;
use crate::types::ThreadId;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Conversation state; updates are merged by concatenation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatState {
    pub messages: Vec<Message>,
}

impl ChatState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn merge(&mut self, update: impl IntoIterator<Item = Message>) {
        self.messages.extend(update);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[derive(Clone)]
pub struct ChatGraph {
    adapter: Arc<ChatAdapter>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl ChatGraph {
    pub fn new(adapter: Arc<ChatAdapter>, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            adapter,
            checkpointer,
        }
    }

    pub fn adapter(&self) -> &ChatAdapter {
        &self.adapter
    }

    /// Latest state of a thread; unknown threads start empty.
    pub async fn get_state(&self, thread: &ThreadId) -> ModelResult<ChatState> {
        Ok(self
            .checkpointer
            .get(thread)
            .await?
            .map(|c| c.state)
            .unwrap_or_default())
    }

    /// Distinct thread ids, most recently active first
    pub async fn list_threads(&self) -> ModelResult<Vec<ThreadId>> {
        self.checkpointer.list_threads().await
    }

    /// Run one turn and return the thread's new state
    pub async fn invoke(&self, thread: &ThreadId, input: Vec<Message>) -> ModelResult<ChatState> {
        let (mut state, step) = self.begin_turn(thread, input).await?;
        let reply = self
            .adapter
            .invoke(&state.messages)
            .instrument(tracing::debug_span!("chat_node", thread = %thread, step))
            .await?;
        state.merge([reply]);
        self.checkpointer
            .put(Checkpoint::new(thread.clone(), step + 1, state.clone()))
            .await?;
        Ok(state)
    }

    /// Run one turn, yielding the reply as it streams in.
    ///
    /// The reply is checkpointed once the stream is exhausted; a failed or
    /// abandoned stream leaves only the input checkpoint behind.
    pub async fn stream(&self, thread: &ThreadId, input: Vec<Message>) -> ModelResult<DeltaStream> {
        let (state, step) = self.begin_turn(thread, input).await?;
        tracing::debug!(thread = %thread, step, "streaming chat node");
        let deltas = self.adapter.stream(&state.messages).await?;

        let turn = StreamingTurn {
            deltas,
            chunks: Vec::new(),
            state,
            thread: thread.clone(),
            step: step + 1,
            checkpointer: Arc::clone(&self.checkpointer),
        };
        let chunks = stream::unfold(Some(turn), |turn| async move {
            let Some(mut turn) = turn else {
                return None;
            };
            match turn.deltas.next().await {
                Some(Ok(chunk)) => {
                    turn.chunks.push(chunk.clone());
                    Some((Ok(chunk), Some(turn)))
                }
                Some(Err(e)) => Some((Err(e), None)),
                None => match turn.finish().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
            }
        });
        Ok(DeltaStream::from_chunks(chunks))
    }

    async fn begin_turn(&self, thread: &ThreadId, input: Vec<Message>) -> ModelResult<(ChatState, u32)> {
        let latest = self.checkpointer.get(thread).await?;
        let (mut state, step) = match latest {
            Some(c) => (c.state, c.step + 1),
            None => (ChatState::default(), 0),
        };
        state.merge(input);
        self.checkpointer
            .put(Checkpoint::new(thread.clone(), step, state.clone()))
            .await?;
        Ok((state, step))
    }
}

struct StreamingTurn {
    deltas: DeltaStream,
    chunks: Vec<MessageChunk>,
    state: ChatState,
    thread: ThreadId,
    step: u32,
    checkpointer: Arc<dyn Checkpointer>,
}

impl StreamingTurn {
    async fn finish(self) -> ModelResult<()> {
        let mut state = self.state;
        state.merge([MessageChunk::concat(&self.chunks)]);
        self.checkpointer
            .put(Checkpoint::new(self.thread, self.step, state))
            .await
    }
}
