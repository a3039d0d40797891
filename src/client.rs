use crate::config::{ClientConfig, GenerationConfig};
use crate::error::{ModelError, ModelResult};
use crate::models::{format_messages, ChatRequest, Message};
use crate::providers::{OpenAICompatibleProvider, Provider};
use crate::streaming::DeltaStream;
use crate::types::ModelId;
use futures::StreamExt;
use metrics::{counter, decrement_gauge, histogram, increment_gauge};
use std::sync::Arc;
use std::time::Instant;

/// A finished assistant reply with its token accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatGeneration {
    pub message: Message,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Outcome of [`ChatAdapter::complete`], shaped by the streaming flag
pub enum CompletionResult {
    Complete(ChatGeneration),
    Streaming(DeltaStream),
}

/// Drop-in chat model backed by an OpenAI-compatible endpoint.
///
/// Holds no per-call state: every call formats its own request from the
/// messages it is given. Clones share the provider handle.
#[derive(Clone)]
pub struct ChatAdapter {
    provider: Arc<dyn Provider>,
    model: ModelId,
    config: GenerationConfig,
}

impl ChatAdapter {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<ModelId>, config: GenerationConfig) -> Self {
        Self {
            provider,
            model: model.into(),
            config,
        }
    }

    /// Build an adapter over an [`OpenAICompatibleProvider`].
    pub fn from_client_config(
        client: &ClientConfig,
        model: impl Into<ModelId>,
        config: GenerationConfig,
    ) -> ModelResult<Self> {
        let provider = OpenAICompatibleProvider::new(client)?;
        Ok(Self::new(Arc::new(provider), model, config))
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn build_request(&self, messages: &[Message]) -> ChatRequest {
        ChatRequest::new(self.model.as_str(), format_messages(messages), &self.config)
    }

    /// Dispatch on the configured streaming flag
    pub async fn complete(&self, messages: &[Message]) -> ModelResult<CompletionResult> {
        if self.config.stream {
            self.stream(messages).await.map(CompletionResult::Streaming)
        } else {
            self.generate(messages).await.map(CompletionResult::Complete)
        }
    }

    /// Return only the assistant message of a blocking call
    pub async fn invoke(&self, messages: &[Message]) -> ModelResult<Message> {
        Ok(self.generate(messages).await?.message)
    }

    /// One non-streaming call. Errors from the provider are returned as-is.
    pub async fn generate(&self, messages: &[Message]) -> ModelResult<ChatGeneration> {
        let req = self.build_request(messages).with_stream(false);
        let provider = self.provider.id().to_string();
        let model = self.model.to_string();
        tracing::debug!(
            params = %self.config.identifying_params(&self.model),
            messages = req.messages.len(),
            "sending chat completion"
        );

        increment_gauge!("llm_inflight_requests", 1.0, "provider" => provider.clone());
        let start = Instant::now();
        let resp = self.provider.chat(&req).await;
        histogram!("llm_request_latency_seconds", start.elapsed().as_secs_f64(), "provider" => provider.clone());
        decrement_gauge!("llm_inflight_requests", 1.0, "provider" => provider.clone());

        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => {
                counter!("llm_requests_total", 1, "provider" => provider, "result" => "error");
                tracing::warn!(error = %e, model = %model, "chat completion failed");
                return Err(e);
            }
        };

        let content = resp
            .choices
            .first()
            .ok_or(ModelError::MalformedResponse("choices"))?
            .message
            .content
            .clone()
            .ok_or(ModelError::MalformedResponse("message content"))?;
        let usage = resp.usage.ok_or(ModelError::MalformedResponse("usage"))?;

        counter!("llm_requests_total", 1, "provider" => provider.clone(), "result" => "success");
        counter!("llm_prompt_tokens_total", usage.prompt_tokens as u64, "provider" => provider.clone(), "model" => model.clone());
        counter!("llm_completion_tokens_total", usage.completion_tokens as u64, "provider" => provider, "model" => model);

        Ok(ChatGeneration {
            message: Message::Assistant(content),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    /// One streaming call. Only fragments with content are yielded; no token
    /// totals are available in this mode.
    pub async fn stream(&self, messages: &[Message]) -> ModelResult<DeltaStream> {
        let req = self.build_request(messages).with_stream(true);
        let provider = self.provider.id().to_string();
        let model = self.model.to_string();
        tracing::debug!(
            params = %self.config.identifying_params(&self.model),
            messages = req.messages.len(),
            "opening chat completion stream"
        );

        increment_gauge!("llm_inflight_requests", 1.0, "provider" => provider.clone());
        let start = Instant::now();
        let opened = self.provider.chat_stream(&req).await;
        histogram!("llm_request_latency_seconds", start.elapsed().as_secs_f64(), "provider" => provider.clone());
        decrement_gauge!("llm_inflight_requests", 1.0, "provider" => provider.clone());

        match opened {
            Ok(stream) => {
                counter!("llm_requests_total", 1, "provider" => provider.clone(), "result" => "success");
                let mut first = true;
                let mut last = start;
                let timed = stream.inspect(move |res| {
                    if res.is_ok() {
                        let now = Instant::now();
                        if first {
                            histogram!("llm_first_token_latency_seconds", now.duration_since(start).as_secs_f64(), "provider" => provider.clone(), "model" => model.clone());
                            first = false;
                        } else {
                            histogram!("llm_stream_intertoken_gap_seconds", now.duration_since(last).as_secs_f64(), "provider" => provider.clone(), "model" => model.clone());
                        }
                        last = now;
                    }
                });
                Ok(DeltaStream::new(Box::pin(timed)))
            }
            Err(e) => {
                counter!("llm_requests_total", 1, "provider" => provider, "result" => "error");
                tracing::warn!(error = %e, model = %model, "chat completion stream failed");
                Err(e)
            }
        }
    }
}
