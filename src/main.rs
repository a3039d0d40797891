use anyhow::{Context, Result};
use chat_adapter_rs::{
    init_logging, ChatAdapter, ChatGraph, Checkpointer, ClientConfig, CompletionResult, FileSaver,
    GenerationConfig, MemorySaver, Message, ThreadId,
};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use futures::StreamExt;
use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_MODEL: &str = "Meta-Llama-3.1-8B-Instruct";
const REPL_USAGE: &str = "/new, /threads, /switch ID, /history, /quit";

/// A line typed into the chat loop
#[derive(Debug, PartialEq)]
enum ReplCommand<'a> {
    Quit,
    New,
    Threads,
    Switch(ThreadId),
    History,
    /// Malformed or unknown slash command; never sent to the model
    Usage,
    Say(&'a str),
}

impl<'a> ReplCommand<'a> {
    fn parse(line: &'a str) -> Self {
        if !line.starts_with('/') {
            return ReplCommand::Say(line);
        }
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match (cmd, arg) {
            ("/quit", "") => ReplCommand::Quit,
            ("/new", "") => ReplCommand::New,
            ("/threads", "") => ReplCommand::Threads,
            ("/history", "") => ReplCommand::History,
            ("/switch", id) if !id.is_empty() => ReplCommand::Switch(ThreadId::from(id)),
            _ => ReplCommand::Usage,
        }
    }
}

/// One-shot request file for the `complete` subcommand
#[derive(Debug, Deserialize)]
struct RequestFile {
    model: Option<String>,
    messages: Vec<Message>,
    #[serde(default)]
    parameters: GenerationConfig,
}

fn cli() -> Command {
    Command::new("chat-adapter-rs")
        .version("0.1.0")
        .about("Chat with an OpenAI-compatible model, keeping threads on disk")
        .subcommand_required(true)
        .arg(
            Arg::new("model")
                .long("model")
                .env("LLM_MODEL")
                .default_value(DEFAULT_MODEL)
                .global(true)
                .help("Model identifier sent with every request"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("FILE")
                .default_value("chatbot.jsonl")
                .global(true)
                .help("Checkpoint file for conversation threads"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Abort requests that take longer than this many seconds"),
        )
        .arg(
            Arg::new("in-memory")
                .long("in-memory")
                .global(true)
                .help("Keep threads in memory only")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("chat")
                .about("Interactive chat session")
                .arg(Arg::new("thread").long("thread").help("Resume an existing thread"))
                .arg(Arg::new("system").long("system").help("System prompt for new threads"))
                .arg(
                    Arg::new("no-stream")
                        .long("no-stream")
                        .help("Wait for whole replies instead of streaming")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("temperature")
                        .long("temperature")
                        .value_parser(value_parser!(f32)),
                )
                .arg(
                    Arg::new("max-tokens")
                        .long("max-tokens")
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(Command::new("threads").about("List threads, most recent first"))
        .subcommand(
            Command::new("history")
                .about("Print the messages of a thread")
                .arg(Arg::new("thread").required(true)),
        )
        .subcommand(
            Command::new("complete")
                .about("Send a single request read from a JSON file")
                .arg(
                    Arg::new("request-file")
                        .long("request-file")
                        .value_name("FILE")
                        .help("JSON file containing the request")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("stream")
                        .long("stream")
                        .help("Enable streaming output")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let matches = cli().get_matches();

    let checkpointer: Arc<dyn Checkpointer> = if matches.get_flag("in-memory") {
        Arc::new(MemorySaver::new())
    } else {
        let path: &String = matches.get_one("store").context("missing --store")?;
        Arc::new(FileSaver::new(path))
    };
    let model: String = matches
        .get_one::<String>("model")
        .cloned()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    match matches.subcommand() {
        Some(("threads", _)) => {
            for thread in checkpointer.list_threads().await? {
                println!("{thread}");
            }
        }
        Some(("history", sub)) => {
            let thread: &String = sub.get_one("thread").context("missing thread")?;
            let state = checkpointer
                .get(&ThreadId::from(thread.as_str()))
                .await?
                .map(|c| c.state)
                .unwrap_or_default();
            for message in &state.messages {
                println!("{}: {}", message.role(), message.content());
            }
        }
        Some(("chat", sub)) => run_chat(sub, model, checkpointer).await?,
        Some(("complete", sub)) => run_complete(sub, model).await?,
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}

/// Credentials are resolved here, on first use, not at start-up.
fn client_config(sub: &ArgMatches) -> Result<ClientConfig> {
    let client = ClientConfig::from_env()?;
    Ok(match sub.get_one::<u64>("timeout") {
        Some(secs) => client.with_timeout_secs(*secs),
        None => client,
    })
}

fn generation_config(sub: &ArgMatches) -> GenerationConfig {
    let mut config = GenerationConfig::default();
    if let Some(t) = sub.get_one::<f32>("temperature") {
        config = config.with_temperature(*t);
    }
    if let Some(n) = sub.get_one::<u32>("max-tokens") {
        config = config.with_max_tokens(*n);
    }
    config.with_stream(!sub.get_flag("no-stream"))
}

async fn run_chat(sub: &ArgMatches, model: String, checkpointer: Arc<dyn Checkpointer>) -> Result<()> {
    let config = generation_config(sub);
    let streaming = config.stream;
    let client = client_config(sub)?;
    let adapter = ChatAdapter::from_client_config(&client, model, config)?;
    let graph = ChatGraph::new(Arc::new(adapter), Arc::clone(&checkpointer));
    let system = sub.get_one::<String>("system").cloned();

    let mut thread = sub
        .get_one::<String>("thread")
        .map(|t| ThreadId::from(t.as_str()))
        .unwrap_or_default();
    println!("thread {thread} ({REPL_USAGE})");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let line = match ReplCommand::parse(line) {
            ReplCommand::Quit => break,
            ReplCommand::New => {
                thread = ThreadId::new();
                println!("thread {thread}");
                continue;
            }
            ReplCommand::Threads => {
                for id in graph.list_threads().await? {
                    let marker = if id == thread { "*" } else { " " };
                    println!("{marker} {id}");
                }
                continue;
            }
            ReplCommand::Switch(id) => {
                thread = id;
                print_history(&graph, &thread).await?;
                continue;
            }
            ReplCommand::History => {
                print_history(&graph, &thread).await?;
                continue;
            }
            ReplCommand::Usage => {
                eprintln!("{REPL_USAGE}");
                continue;
            }
            ReplCommand::Say(text) => text,
        };

        let mut input = Vec::new();
        if let Some(system) = &system {
            if graph.get_state(&thread).await?.messages.is_empty() {
                input.push(Message::system(system.clone()));
            }
        }
        input.push(Message::user(line));

        if streaming {
            let mut deltas = match graph.stream(&thread, input).await {
                Ok(deltas) => deltas,
                Err(e) => {
                    eprintln!("error: {e}");
                    continue;
                }
            };
            while let Some(chunk) = deltas.next().await {
                match chunk {
                    Ok(chunk) => {
                        print!("{chunk}");
                        io::stdout().flush()?;
                    }
                    Err(e) => {
                        eprintln!("\nerror: {e}");
                        break;
                    }
                }
            }
            println!();
        } else {
            match graph.invoke(&thread, input).await {
                Ok(state) => {
                    if let Some(reply) = state.last_message() {
                        println!("{}", reply.content());
                    }
                }
                Err(e) => eprintln!("error: {e}"),
            }
        }
    }
    Ok(())
}

async fn print_history(graph: &ChatGraph, thread: &ThreadId) -> Result<()> {
    for message in graph.get_state(thread).await?.messages {
        println!("{}: {}", message.role(), message.content());
    }
    Ok(())
}

async fn run_complete(sub: &ArgMatches, default_model: String) -> Result<()> {
    let request_file: &String = sub.get_one("request-file").context("missing --request-file")?;
    let request: RequestFile = serde_json::from_str(
        &fs::read_to_string(request_file).with_context(|| format!("reading {request_file}"))?,
    )?;
    let config = request
        .parameters
        .clone()
        .with_stream(request.parameters.stream || sub.get_flag("stream"));

    let client = client_config(sub)?;
    let adapter = ChatAdapter::from_client_config(
        &client,
        request.model.unwrap_or(default_model),
        config,
    )?;

    match adapter.complete(&request.messages).await? {
        CompletionResult::Streaming(mut deltas) => {
            while let Some(chunk) = deltas.next().await {
                let output = serde_json::json!({
                    "content": chunk?.content,
                    "role": "assistant"
                });
                println!("{}", serde_json::to_string(&output)?);
                io::stdout().flush()?;
            }
        }
        CompletionResult::Complete(generation) => {
            let output = serde_json::json!({
                "content": generation.message.content(),
                "role": "assistant",
                "input_tokens": generation.input_tokens,
                "output_tokens": generation.output_tokens,
            });
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}
