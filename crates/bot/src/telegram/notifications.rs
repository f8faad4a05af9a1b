//! Outbound Telegram notifications: monitor alerts to the configured
//! channel and best-effort admin pings.

use async_trait::async_trait;
use teloxide::prelude::*;

use vlesscore::config::admin::ADMIN_USER_ID;
use vlesscore::error::AppResult;
use vlesscore::monitor::Notifier;
use vlesscore::storage::db::DbPool;
use vlesscore::storage::get_connection;
use vlesscore::storage::registry::{self, SETTING_MONITOR_CHANNEL};

/// Sends monitor alerts to the channel stored by the feeder wizard.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }

    /// Builds a notifier from the stored alert channel, or `None` when
    /// no feeder has been provisioned yet.
    pub fn from_settings(bot: Bot, pool: &DbPool) -> AppResult<Option<Self>> {
        let conn = get_connection(pool)?;
        let channel = registry::get_setting(&conn, SETTING_MONITOR_CHANNEL)?;
        Ok(channel
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|chat_id| Self::new(bot, chat_id)))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> AppResult<()> {
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }
}

/// Best-effort startup ping to the admin chat. Failures are logged and
/// swallowed so a missing admin id never blocks startup.
pub async fn notify_admin_startup(bot: &Bot, mode: &str) {
    let admin_id = *ADMIN_USER_ID;
    if admin_id == 0 {
        log::warn!("ADMIN_USER_ID not set, skipping startup notification");
        return;
    }

    let message = format!("🤖 Bot aktif (mode: {}).", mode);
    if let Err(e) = bot.send_message(ChatId(admin_id), message).await {
        log::error!("Failed to send startup notification: {}", e);
    }
}
