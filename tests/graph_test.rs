mod common;

use chat_adapter_rs::{
    ChatGraph, Checkpointer, GenerationConfig, MemorySaver, Message, ModelError, ThreadId,
};
use common::{adapter, MockProvider, Scripted};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn graph(provider: &Arc<MockProvider>, saver: &Arc<MemorySaver>) -> ChatGraph {
    ChatGraph::new(
        Arc::new(adapter(provider, GenerationConfig::default())),
        saver.clone(),
    )
}

#[tokio::test]
async fn history_accumulates_within_a_thread() {
    let provider = MockProvider::new(vec![
        Scripted::reply("Hello! How can I assist you today?", 5, 9),
        Scripted::reply("Your name is Ada.", 20, 5),
    ]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph(&provider, &saver);
    let thread = ThreadId::new();

    graph.invoke(&thread, vec![Message::user("Hi! I'm Ada.")]).await.unwrap();
    let state = graph
        .invoke(&thread, vec![Message::user("What is my name?")])
        .await
        .unwrap();

    assert_eq!(
        state.messages,
        vec![
            Message::user("Hi! I'm Ada."),
            Message::assistant("Hello! How can I assist you today?"),
            Message::user("What is my name?"),
            Message::assistant("Your name is Ada."),
        ]
    );
    assert_eq!(provider.requests()[1].messages.len(), 3);
    assert_eq!(graph.get_state(&thread).await.unwrap(), state);
}

#[tokio::test]
async fn threads_are_isolated_and_listed_most_recent_first() {
    let provider = MockProvider::new(vec![
        Scripted::reply("a1", 1, 1),
        Scripted::reply("b1", 1, 1),
        Scripted::reply("a2", 1, 1),
    ]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph(&provider, &saver);
    let a = ThreadId::from("thread-a");
    let b = ThreadId::from("thread-b");

    graph.invoke(&a, vec![Message::user("first a")]).await.unwrap();
    graph.invoke(&b, vec![Message::user("first b")]).await.unwrap();
    graph.invoke(&a, vec![Message::user("second a")]).await.unwrap();

    let requests = provider.requests();
    let b_request = &requests[1];
    assert!(b_request.messages.iter().all(|m| !m.content.contains("a")));

    assert_eq!(graph.list_threads().await.unwrap(), vec![a.clone(), b.clone()]);
    assert_eq!(graph.get_state(&b).await.unwrap().messages.len(), 2);
    assert_eq!(graph.get_state(&a).await.unwrap().messages.len(), 4);
}

#[tokio::test]
async fn unknown_thread_has_empty_state() {
    let provider = MockProvider::new(vec![]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph(&provider, &saver);

    let state = graph.get_state(&ThreadId::from("nope")).await.unwrap();
    assert!(state.messages.is_empty());
    assert!(graph.list_threads().await.unwrap().is_empty());
}

#[tokio::test]
async fn streamed_turn_is_checkpointed_after_exhaustion() {
    let provider = MockProvider::new(vec![Scripted::Stream(vec![
        None,
        Some("Hel"),
        Some("lo"),
        None,
    ])]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph(&provider, &saver);
    let thread = ThreadId::new();

    let mut deltas = graph.stream(&thread, vec![Message::user("Hi")]).await.unwrap();
    let first = deltas.next().await.unwrap().unwrap();
    assert_eq!(first.content, "Hel");
    assert_eq!(graph.get_state(&thread).await.unwrap().messages, vec![Message::user("Hi")]);

    while let Some(chunk) = deltas.next().await {
        chunk.unwrap();
    }

    assert_eq!(
        graph.get_state(&thread).await.unwrap().messages,
        vec![Message::user("Hi"), Message::assistant("Hello")]
    );
    let steps: Vec<u32> = saver
        .list(Some(&thread))
        .await
        .unwrap()
        .iter()
        .map(|c| c.step)
        .collect();
    assert_eq!(steps, vec![1, 0]);
}

#[tokio::test]
async fn failed_stream_keeps_only_the_input() {
    let provider = MockProvider::new(vec![Scripted::BrokenStream(vec![Some("Hel")], "reset")]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph(&provider, &saver);
    let thread = ThreadId::new();

    let results: Vec<_> = graph
        .stream(&thread, vec![Message::user("Hi")])
        .await
        .unwrap()
        .collect()
        .await;

    assert!(matches!(results.last(), Some(Err(ModelError::Stream(_)))));
    assert_eq!(graph.get_state(&thread).await.unwrap().messages, vec![Message::user("Hi")]);
}

#[tokio::test]
async fn failed_call_surfaces_error_and_keeps_input() {
    let provider = MockProvider::new(vec![Scripted::Fail("unauthorized")]);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph(&provider, &saver);
    let thread = ThreadId::new();

    let err = graph
        .invoke(&thread, vec![Message::user("Hi")])
        .await
        .unwrap_err();

    assert!(matches!(err, ModelError::Provider(_)));
    assert_eq!(graph.get_state(&thread).await.unwrap().messages.len(), 1);
}
