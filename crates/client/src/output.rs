// Output formatting for CLI

use anyhow::Result;
use parley_core::{MessageType, StoredEvent};
use serde::Serialize;

#[derive(Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(value)?);
            }
            OutputFormat::Text => {
                // Text format is handled by each command
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Print a table header
pub fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Print a table row
pub fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width || width < 3 {
        return value.to_string();
    }
    let kept: String = value.chars().take(width - 3).collect();
    format!("{}...", kept)
}

/// One-line rendering of an event for the chat transcript.
pub fn event_line(event: &StoredEvent) -> String {
    let time = event.created_at.format("%H:%M:%S");
    format!("[{}] {}: {}", time, event.sender.kind, summary(event))
}

fn summary(event: &StoredEvent) -> String {
    let payload = &event.payload;
    let body = match payload.message_type {
        MessageType::Text | MessageType::Markdown | MessageType::Html => payload
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| payload.content.to_string()),
        MessageType::Template => {
            let template = payload
                .content
                .get("templateId")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown");
            format!("<{}>", template)
        }
        MessageType::UserAction => {
            let action = payload
                .data()
                .and_then(|d| d.get("actionId").or_else(|| d.get("selectedId")))
                .and_then(|a| a.as_str())
                .unwrap_or("action");
            format!("({})", action)
        }
        MessageType::Context | MessageType::Analytics => format!("[{}]", payload.message_type),
    };

    match &payload.actions {
        Some(actions) if !actions.is_empty() => {
            let labels: Vec<String> = actions
                .iter()
                .map(|a| format!("{}={}", a.id, a.label))
                .collect();
            format!("{}  {{{}}}", body, labels.join(", "))
        }
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_core::{ActionScope, ChatAction, ChatEvent, EventType, Payload, ReplyType, Sender};

    fn stored(event: ChatEvent) -> StoredEvent {
        event.into_stored("evt_1".to_string(), "conv_1".to_string(), Utc::now())
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("conversation_identifier", 10), "convers...");
    }

    #[test]
    fn test_event_line_for_text() {
        let line = event_line(&stored(ChatEvent::user_text("conv_1", "hello")));
        assert!(line.ends_with("user: hello"));
    }

    #[test]
    fn test_event_line_for_template_with_actions() {
        let mut payload = Payload::new(
            MessageType::Template,
            serde_json::json!({ "templateId": "seller_info", "data": {} }),
        );
        payload.actions = Some(vec![ChatAction {
            id: "call_now".to_string(),
            label: "Call Now".to_string(),
            reply_type: ReplyType::Hidden,
            scope: ActionScope::Message,
        }]);
        let event = ChatEvent::new(EventType::Message, Sender::bot("re_bot"), payload);

        let line = event_line(&stored(event));
        assert!(line.ends_with("bot: <seller_info>  {call_now=Call Now}"));
    }
}
