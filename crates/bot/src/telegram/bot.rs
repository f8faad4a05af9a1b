//! Bot instance creation and the command set.

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use vlesscore::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Perintah yang tersedia:")]
pub enum Command {
    #[command(description = "tampilkan menu utama")]
    Start,
    #[command(description = "batalkan dialog yang sedang berjalan")]
    Cancel,
    #[command(description = "jalankan health check sekarang (admin)")]
    Check,
    #[command(description = "daftar endpoint terdaftar (admin)")]
    List,
}

/// Creates a Bot instance with the shared request timeout applied.
pub fn create_bot() -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(config::BOT_TOKEN.clone(), client))
}

/// Registers the command list in the Telegram UI.
pub async fn setup_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(Command::bot_commands()).await?;
    Ok(())
}
