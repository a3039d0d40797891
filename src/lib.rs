//! A drop-in chat model for OpenAI-compatible completion endpoints.
//!
//! The adapter turns role-tagged messages plus generation parameters into a
//! single blocking or streaming completion call. A small conversation graph
//! and checkpoint stores keep per-thread history on top of it.

pub mod blocking;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod providers;
pub mod streaming;
pub mod types;

// Re-export main types for convenience
pub use blocking::BlockingChatAdapter;
pub use checkpoint::{Checkpoint, Checkpointer, FileSaver, MemorySaver};
pub use client::{ChatAdapter, ChatGeneration, CompletionResult};
pub use config::{ClientConfig, GenerationConfig};
pub use error::{ModelError, ModelResult};
pub use graph::{ChatGraph, ChatState};
pub use models::{ChatRequest, ChatResponse, Message, MessageChunk, MessageRole};
pub use providers::{OpenAICompatibleProvider, Provider};
pub use streaming::{BlockingDeltaStream, DeltaStream, StreamingResponse};
pub use types::{ModelId, ProviderId, ThreadId, TokenUsage};

/// Initialize the logging system
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
