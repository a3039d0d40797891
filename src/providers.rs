use crate::config::ClientConfig;
use crate::error::{ModelError, ModelResult};
use crate::models::{ChatRequest, ChatResponse, StreamingChatResponse};
use crate::streaming::StreamingResponse;
use crate::types::ProviderId;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reqwest_eventsource::{retry, Event, EventSource};
use std::time::Duration;

/// A chat-completion transport.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;
    async fn chat(&self, req: &ChatRequest) -> ModelResult<ChatResponse>;
    async fn chat_stream(&self, req: &ChatRequest) -> ModelResult<StreamingResponse>;
}

/// Any endpoint speaking the OpenAI `/chat/completions` protocol
pub struct OpenAICompatibleProvider {
    pub api_key: String,
    pub api_base: String,
    pub client: Client,
}

impl OpenAICompatibleProvider {
    pub fn new(config: &ClientConfig) -> ModelResult<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            client: builder.build()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn post(&self, req: &ChatRequest) -> RequestBuilder {
        self.client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(req)
    }
}

#[async_trait]
impl Provider for OpenAICompatibleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(ProviderId::OPENAI_COMPATIBLE)
    }

    async fn chat(&self, req: &ChatRequest) -> ModelResult<ChatResponse> {
        let req = req.clone().with_stream(false);
        let resp = self.post(&req).send().await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let chat_resp: ChatResponse = resp.json().await?;
        Ok(chat_resp)
    }

    async fn chat_stream(&self, req: &ChatRequest) -> ModelResult<StreamingResponse> {
        let req = req.clone().with_stream(true);
        let mut source = EventSource::new(self.post(&req))
            .map_err(|e| ModelError::InvalidRequest(e.to_string()))?;
        source.set_retry_policy(Box::new(retry::Never));

        // Surface connection and status failures from the call itself.
        let pending = match source.next().await {
            Some(Ok(Event::Open)) => None,
            Some(Ok(Event::Message(message))) => Some(message.data),
            Some(Err(e)) => {
                source.close();
                return Err(event_error(e).await);
            }
            None => return Err(ModelError::Stream("event stream closed before opening".into())),
        };
        Ok(Box::pin(sse_stream(source, pending)))
    }
}

async fn status_error(resp: Response) -> ModelError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    classify_status(status, body)
}

fn classify_status(status: StatusCode, body: String) -> ModelError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Authentication(body),
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimit(body),
        _ => ModelError::UnexpectedStatus(status, body),
    }
}

async fn event_error(err: reqwest_eventsource::Error) -> ModelError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(_, resp) => status_error(resp).await,
        reqwest_eventsource::Error::Transport(e) => ModelError::Reqwest(e),
        other => ModelError::Stream(other.to_string()),
    }
}

struct SseState {
    source: EventSource,
    pending: Option<String>,
}

/// Turn an open event source into a stream of parsed chunks, ending on
/// `[DONE]`, when the server closes the connection, or after yielding the
/// error of an in-stream `{"error": ...}` event.
fn sse_stream(
    source: EventSource,
    pending: Option<String>,
) -> impl futures::Stream<Item = ModelResult<StreamingChatResponse>> + Send {
    stream::unfold(Some(SseState { source, pending }), |state| async move {
        let Some(mut state) = state else {
            return None;
        };
        loop {
            let data = match state.pending.take() {
                Some(data) => data,
                None => match state.source.next().await {
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(message))) => message.data,
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => {
                        state.source.close();
                        return None;
                    }
                    Some(Err(e)) => {
                        state.source.close();
                        tracing::warn!(error = %e, "event stream failed");
                        return Some((Err(event_error(e).await), None));
                    }
                },
            };
            if data.trim() == "[DONE]" {
                state.source.close();
                return None;
            }
            let mut chunk = match serde_json::from_str::<StreamingChatResponse>(&data) {
                Ok(chunk) => chunk,
                Err(e) => return Some((Err(e.into()), Some(state))),
            };
            if let Some(error) = chunk.error.take() {
                state.source.close();
                tracing::warn!(error = %error, "server reported an error mid-stream");
                return Some((Err(ModelError::Provider(error.to_string())), None));
            }
            return Some((Ok(chunk), Some(state)));
        }
    })
}
