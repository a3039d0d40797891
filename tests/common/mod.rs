//! Scripted provider shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chat_adapter_rs::models::{ChatChoice, ResponseMessage, StreamingChatResponse};
use chat_adapter_rs::{
    ChatAdapter, ChatRequest, ChatResponse, GenerationConfig, ModelError, ModelResult, Provider,
    ProviderId, StreamingResponse, TokenUsage,
};
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const MODEL: &str = "Meta-Llama-3.1-8B-Instruct";

pub enum Scripted {
    Reply {
        content: Option<String>,
        usage: Option<TokenUsage>,
    },
    Stream(Vec<Option<&'static str>>),
    /// Yields the deltas, then fails
    BrokenStream(Vec<Option<&'static str>>, &'static str),
    Fail(&'static str),
}

impl Scripted {
    pub fn reply(content: &str, prompt_tokens: u32, completion_tokens: u32) -> Self {
        Scripted::Reply {
            content: Some(content.to_string()),
            usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
        }
    }
}

#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, req: &ChatRequest) -> Scripted {
        self.requests.lock().unwrap().push(req.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("mock provider ran out of scripted responses")
    }
}

fn fragments(deltas: Vec<Option<&'static str>>) -> Vec<ModelResult<StreamingChatResponse>> {
    deltas
        .into_iter()
        .map(|d| Ok(StreamingChatResponse::from_delta(d)))
        .collect()
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new("mock")
    }

    async fn chat(&self, req: &ChatRequest) -> ModelResult<ChatResponse> {
        match self.next(req) {
            Scripted::Reply { content, usage } => Ok(ChatResponse {
                id: "chatcmpl-1".into(),
                object: "chat.completion".into(),
                created: 0,
                model: req.model.clone(),
                choices: vec![ChatChoice {
                    index: 0,
                    message: ResponseMessage {
                        role: None,
                        content,
                    },
                    finish_reason: Some("stop".into()),
                }],
                usage,
            }),
            Scripted::Fail(msg) => Err(ModelError::Provider(msg.to_string())),
            _ => Err(ModelError::InvalidRequest("scripted a stream".into())),
        }
    }

    async fn chat_stream(&self, req: &ChatRequest) -> ModelResult<StreamingResponse> {
        match self.next(req) {
            Scripted::Stream(deltas) => Ok(Box::pin(stream::iter(fragments(deltas)))),
            Scripted::BrokenStream(deltas, msg) => {
                let mut items = fragments(deltas);
                items.push(Err(ModelError::Stream(msg.to_string())));
                Ok(Box::pin(stream::iter(items)))
            }
            Scripted::Fail(msg) => Err(ModelError::Provider(msg.to_string())),
            Scripted::Reply { .. } => Err(ModelError::InvalidRequest("scripted a reply".into())),
        }
    }
}

pub fn adapter(provider: &Arc<MockProvider>, config: GenerationConfig) -> ChatAdapter {
    ChatAdapter::new(provider.clone(), MODEL, config)
}
