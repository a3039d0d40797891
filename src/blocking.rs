//! Synchronous wrapper around [`ChatAdapter`].
//!
//! Owns a current-thread runtime, so it must not be used from inside another
//! tokio runtime.

use crate::client::{ChatAdapter, ChatGeneration};
use crate::error::ModelResult;
use crate::models::Message;
use crate::streaming::BlockingDeltaStream;
use tokio::runtime::{Builder, Runtime};

pub struct BlockingChatAdapter {
    inner: ChatAdapter,
    runtime: Runtime,
}

impl BlockingChatAdapter {
    pub fn new(inner: ChatAdapter) -> ModelResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn adapter(&self) -> &ChatAdapter {
        &self.inner
    }

    pub fn generate(&self, messages: &[Message]) -> ModelResult<ChatGeneration> {
        self.runtime.block_on(self.inner.generate(messages))
    }

    pub fn invoke(&self, messages: &[Message]) -> ModelResult<Message> {
        self.runtime.block_on(self.inner.invoke(messages))
    }

    /// Same filtering as [`ChatAdapter::stream`], consumed as an iterator
    pub fn stream(&self, messages: &[Message]) -> ModelResult<BlockingDeltaStream<'_>> {
        let deltas = self.runtime.block_on(self.inner.stream(messages))?;
        Ok(BlockingDeltaStream::new(&self.runtime, deltas))
    }
}
