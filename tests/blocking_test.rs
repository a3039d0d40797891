mod common;

use chat_adapter_rs::{BlockingChatAdapter, GenerationConfig, Message, ModelError};
use common::{adapter, MockProvider, Scripted};
use pretty_assertions::assert_eq;

#[test]
fn blocking_generate_matches_async_result() {
    let provider = MockProvider::new(vec![Scripted::reply("Neutral sentiment.", 40, 3)]);
    let chat = BlockingChatAdapter::new(adapter(&provider, GenerationConfig::default())).unwrap();

    let generation = chat.generate(&[Message::user("I am going out for dinner")]).unwrap();

    assert_eq!(generation.message.content(), "Neutral sentiment.");
    assert_eq!((generation.input_tokens, generation.output_tokens), (40, 3));
}

#[test]
fn blocking_stream_filters_like_async_stream() {
    let provider = MockProvider::new(vec![Scripted::Stream(vec![
        None,
        Some("Neu"),
        Some("tral"),
        None,
        Some("."),
    ])]);
    let chat = BlockingChatAdapter::new(adapter(&provider, GenerationConfig::default())).unwrap();

    let texts: Vec<String> = chat
        .stream(&[Message::user("hi")])
        .unwrap()
        .map(|c| c.unwrap().content)
        .collect();

    assert_eq!(texts, vec!["Neu", "tral", "."]);
}

#[test]
fn stopping_early_is_not_an_error() {
    let provider = MockProvider::new(vec![Scripted::Stream(vec![Some("a"), Some("b"), Some("c")])]);
    let chat = BlockingChatAdapter::new(adapter(&provider, GenerationConfig::default())).unwrap();

    let first = chat.stream(&[Message::user("hi")]).unwrap().next();
    assert_eq!(first.unwrap().unwrap().content, "a");
}

#[test]
fn blocking_stream_surfaces_mid_stream_failure() {
    let provider = MockProvider::new(vec![Scripted::BrokenStream(vec![Some("par")], "reset by peer")]);
    let chat = BlockingChatAdapter::new(adapter(&provider, GenerationConfig::default())).unwrap();

    let items: Vec<_> = chat.stream(&[Message::user("hi")]).unwrap().collect();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().content, "par");
    assert!(matches!(items[1], Err(ModelError::Stream(ref m)) if m == "reset by peer"));
}
