// History command - print a slice of a conversation

use crate::output::{event_line, print_field, OutputFormat};
use anyhow::Result;
use clap::Args;
use parley_client::{ChatTransport, HttpTransport};
use parley_core::HistoryParams;

#[derive(Args)]
pub struct HistoryArgs {
    /// Conversation ID (resolved from the server if omitted)
    #[arg(long, short)]
    pub conversation: Option<String>,

    /// Only the final N events
    #[arg(long, conflicts_with_all = ["before", "after", "page"])]
    pub last: Option<usize>,

    /// Events strictly before this event ID
    #[arg(long, conflicts_with_all = ["after", "page"])]
    pub before: Option<String>,

    /// Events strictly after this event ID
    #[arg(long, conflicts_with = "page")]
    pub after: Option<String>,

    /// Page number (0-based), used with --page-size
    #[arg(long, requires = "page_size")]
    pub page: Option<usize>,

    /// Page size for --page and --before
    #[arg(long)]
    pub page_size: Option<usize>,
}

impl HistoryArgs {
    fn params(&self, conversation_id: String) -> HistoryParams {
        HistoryParams {
            conversation_id: Some(conversation_id),
            page: self.page,
            page_size: self.page_size,
            messages_after: self.after.clone(),
            messages_before: self.before.clone(),
            last: self.last,
        }
    }
}

pub async fn run(transport: &HttpTransport, output: OutputFormat, args: HistoryArgs) -> Result<()> {
    let conversation_id = match &args.conversation {
        Some(id) => id.clone(),
        None => transport.conversation_id(false).await?.conversation_id,
    };

    let history = transport.history(&args.params(conversation_id)).await?;

    if output.is_text() {
        print_field("Conversation", &history.conversation_id);
        print_field("Events", &history.messages.len().to_string());
        print_field("More", if history.has_more { "yes" } else { "no" });
        println!();
        for event in &history.messages {
            println!("{}  {}", event.event_id, event_line(event));
        }
    } else {
        output.print_value(&history)?;
    }

    Ok(())
}
