// Conversation listing

use crate::output::{print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use parley_client::HttpTransport;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub async fn run(transport: &HttpTransport, output: OutputFormat) -> Result<()> {
    let response = transport.chats().await?;

    if output.is_text() {
        if response.chats.is_empty() {
            println!("No conversations found");
            return Ok(());
        }

        print_table_header(&[("CONVERSATION", 24), ("CREATED", 20), ("LAST ACTIVITY", 20)]);

        for chat in &response.chats {
            let created = chat.created_at.format(TIME_FORMAT).to_string();
            let last_activity = chat.last_activity_at.format(TIME_FORMAT).to_string();
            print_table_row(&[
                (&chat.conversation_id, 24),
                (&created, 20),
                (&last_activity, 20),
            ]);
        }
    } else {
        output.print_value(&response)?;
    }

    Ok(())
}
