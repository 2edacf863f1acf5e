// Parley CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: The chat loop is a thin shell over the library's engine.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use parley_client::{Client, HttpTransport};
use parley_core::telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI - Chat with a Parley server and inspect conversation history")]
#[command(version)]
pub struct Cli {
    /// API base URL
    #[arg(long, env = "PARLEY_API_URL", default_value = "http://localhost:9000")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open the conversation and chat interactively
    Chat {
        /// Seed demo fixtures when the conversation is new
        #[arg(long)]
        demo: bool,
    },

    /// Print conversation history
    History(commands::history::HistoryArgs),

    /// List conversations
    Chats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let telemetry_config = TelemetryConfig::from_env()
        .with_service_name("parley")
        .with_default_filter("warn");
    init_telemetry(&telemetry_config);

    let transport = HttpTransport::new(Client::new(&cli.api_url));
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Chat { demo } => {
            commands::chat::run(transport, output_format, cli.quiet, demo).await
        }
        Commands::History(args) => commands::history::run(&transport, output_format, args).await,
        Commands::Chats => commands::chats::run(&transport, output_format).await,
    }
}
