use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vlessbot")]
#[command(author, version, about = "Telegram admin bot for VLESS workers on Cloudflare", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot in normal mode
    Run {
        /// Use webhook mode instead of long polling
        #[arg(long)]
        webhook: bool,
    },

    /// Register WEBHOOK_URL with Telegram and exit
    SetWebhook {
        /// Override the WEBHOOK_URL environment variable
        #[arg(long)]
        url: Option<String>,
    },

    /// Remove the registered webhook and exit
    DeleteWebhook,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
