//! CLI parser and dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docshunter::tools::DetailLevel;
use docshunter::Config;

#[derive(Parser)]
#[command(name = "docshunter")]
#[command(about = "Ask an answer engine and extract web content through a headless browser")]
#[command(version)]
pub struct Cli {
    /// Config file (JSON, TOML or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Search and print the answer
    Search {
        /// Question to ask
        query: String,
        /// Answer detail: brief, normal or detailed
        #[arg(short, long, default_value = "normal")]
        detail: DetailLevel,
    },

    /// Extract readable content from a URL
    Extract {
        /// Page to extract
        url: String,
        /// Crawl depth (1-5), following same-domain links above 1
        #[arg(short, long)]
        depth: Option<u32>,
    },

    /// Send a chat message
    Chat {
        /// Message text
        message: String,
        /// Continue an earlier conversation
        #[arg(long)]
        chat_id: Option<String>,
        /// JSON file holding conversations between runs
        #[arg(long, env = "DOCSHUNTER_CHAT_HISTORY", default_value = "docshunter-chats.json")]
        history: PathBuf,
    },

    /// Get documentation and usage examples for a technology
    Docs {
        /// Technology, library or API
        query: String,
        /// Aspect to focus on
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Find APIs for a requirement
    Apis {
        /// What the API should do
        requirement: String,
        /// Extra context
        #[arg(short, long)]
        context: Option<String>,
    },

    /// Check a code snippet for deprecated patterns
    Deprecated {
        /// Code to check, or `-` to read stdin
        code: String,
        /// Language or framework
        #[arg(short, long)]
        technology: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    match cli.command {
        Commands::Search { query, detail } => commands::cmd_search(config, &query, detail).await,
        Commands::Extract { url, depth } => commands::cmd_extract(config, &url, depth).await,
        Commands::Chat {
            message,
            chat_id,
            history,
        } => commands::cmd_chat(config, &message, chat_id.as_deref(), history).await,
        Commands::Docs { query, context } => {
            commands::cmd_docs(config, &query, context.as_deref()).await
        }
        Commands::Apis {
            requirement,
            context,
        } => commands::cmd_apis(config, &requirement, context.as_deref()).await,
        Commands::Deprecated { code, technology } => {
            commands::cmd_deprecated(config, &code, technology.as_deref()).await
        }
    }
}
