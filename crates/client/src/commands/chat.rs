// Chat command - interactive conversation over the reconciling engine

use std::sync::Arc;

use crate::output::{event_line, print_field, OutputFormat};
use anyhow::Result;
use parley_client::timeline::is_pending;
use parley_client::{
    ChatEngine, ClientError, EngineConfig, EngineUpdate, HttpTransport, ReplyStatus,
    StreamStatus, Submitted,
};
use parley_core::{ChatEvent, EventType, MessageType, Payload, Sender};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const HELP: &str = "\
/cancel          stop waiting for the current reply
/retry           resend the last message
/dismiss         clear a timeout or error
/older           load earlier messages
/sync            re-read recent history
/login           report a successful login
/action <id>     send a user action (e.g. shortlist, contact)
/quit            leave";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Text(String),
    Cancel,
    Retry,
    Dismiss,
    Older,
    Sync,
    Login,
    Action(String),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Input::Text(line.to_string());
        };
        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::trim).filter(|a| !a.is_empty());
        match (name, arg) {
            ("cancel", None) => Input::Cancel,
            ("retry", None) => Input::Retry,
            ("dismiss", None) => Input::Dismiss,
            ("older", None) => Input::Older,
            ("sync", None) => Input::Sync,
            ("login", None) => Input::Login,
            ("action", Some(id)) => Input::Action(id.to_string()),
            ("help", None) => Input::Help,
            ("quit" | "exit", None) => Input::Quit,
            _ => Input::Unknown(line.to_string()),
        }
    }
}

fn user_action(action_id: &str) -> ChatEvent {
    ChatEvent::new(
        EventType::Message,
        Sender::user(),
        Payload::new(
            MessageType::UserAction,
            serde_json::json!({ "data": { "actionId": action_id } }),
        ),
    )
}

pub async fn run(
    transport: HttpTransport,
    output: OutputFormat,
    quiet: bool,
    demo: bool,
) -> Result<()> {
    let (engine, updates) = ChatEngine::new(Arc::new(transport), EngineConfig::default());
    let printer = tokio::spawn(print_updates(updates, output, quiet));

    let resolved = engine.open(demo).await?;
    if output.is_text() && !quiet {
        print_field("Conversation", &resolved.conversation_id);
        if resolved.is_new {
            print_field("Status", "new");
        }
        println!("Type a message, or /help\n");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Input::parse(&line) {
            Input::Text(text) => report(engine.send_text(&text).await),
            Input::Action(id) => report(engine.send_action(user_action(&id)).await),
            Input::Login => report(engine.login_success().await),
            Input::Retry => report(engine.retry().await),
            Input::Cancel => {
                if !engine.cancel().await {
                    eprintln!("Nothing to cancel");
                }
            }
            Input::Dismiss => {
                if !engine.dismiss() {
                    eprintln!("Nothing to dismiss");
                }
            }
            Input::Older => match engine.load_older().await {
                Ok(0) => eprintln!("No older messages"),
                Ok(_) => {}
                Err(e) => eprintln!("Could not load older messages: {}", e),
            },
            Input::Sync => match engine.sync_history().await {
                Ok(0) => eprintln!("Up to date"),
                Ok(_) => {}
                Err(e) => eprintln!("Sync failed: {}", e),
            },
            Input::Help => println!("{}", HELP),
            Input::Quit => break,
            Input::Empty => {}
            Input::Unknown(line) => eprintln!("Unknown command: {} (try /help)", line),
        }
    }

    engine.close();
    printer.abort();
    Ok(())
}

fn report(result: Result<Submitted, ClientError>) {
    match result {
        Ok(Submitted::Accepted(_)) => {}
        Ok(Submitted::Ignored) => eprintln!("Still waiting for a reply (/cancel to stop)"),
        Err(e) => eprintln!("Send failed: {}", e),
    }
}

async fn print_updates(
    mut updates: mpsc::UnboundedReceiver<EngineUpdate>,
    output: OutputFormat,
    quiet: bool,
) {
    let mut last_label = None;
    while let Some(update) = updates.recv().await {
        match update {
            EngineUpdate::Added(event) => {
                // The user just typed it.
                if is_pending(&event.event_id) {
                    continue;
                }
                print_event(output, &event);
            }
            EngineUpdate::Prepended(events) => {
                if output.is_text() {
                    println!("--- earlier ---");
                }
                for event in &events {
                    print_event(output, event);
                }
                if output.is_text() {
                    println!("---");
                }
            }
            EngineUpdate::Status(status) => {
                if status != ReplyStatus::Awaiting {
                    last_label = None;
                }
                match status {
                    ReplyStatus::Timeout => {
                        eprintln!("No reply yet. /retry to resend or /dismiss")
                    }
                    ReplyStatus::Error => eprintln!("Message not sent. /retry or /dismiss"),
                    _ => {}
                }
            }
            EngineUpdate::Elapsed { label, .. } => {
                if !quiet && last_label != Some(label) {
                    eprintln!("... {}", label);
                    last_label = Some(label);
                }
            }
            EngineUpdate::Stream(status) => {
                if !quiet && status == StreamStatus::Error {
                    eprintln!("(stream closed)");
                }
            }
        }
    }
}

fn print_event(output: OutputFormat, event: &parley_core::StoredEvent) {
    if output.is_text() {
        println!("{}", event_line(event));
    } else if let Err(e) = output.print_value(event) {
        eprintln!("Could not format event: {}", e);
    }
}
