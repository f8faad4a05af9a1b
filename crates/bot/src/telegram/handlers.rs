//! Dispatcher schema and handler chain builders.
//!
//! The same schema drives polling and webhook mode. Commands are
//! routed first, then free text (wizard/bug input), then callback
//! queries from the inline menus.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, Message, MessageId};

use vlesscore::cloudflare::CfClient;
use vlesscore::error::AppResult;
use vlesscore::monitor::{self, ProbeOutcome};
use vlesscore::provision::ENDPOINT_KIND;
use vlesscore::storage::db::DbPool;
use vlesscore::storage::get_connection;
use vlesscore::storage::registry::{self, AccountKind, Worker};

use super::admin;
use super::bot::Command;
use super::menu;
use super::wizard::{self, InjectMethod, SessionStore, WizardFlow};

pub const WELCOME: &str = "Selamat datang di bot VLESS Worker.\n\nSilahkan pilih menu di bawah ini:";
const NO_SERVERS: &str = "⚠️ Belum ada server yang tersedia. Hubungi Admin.";

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub cf: CfClient,
    pub sessions: SessionStore,
}

impl HandlerDeps {
    pub fn new(db_pool: Arc<DbPool>, cf: CfClient) -> Self {
        Self {
            db_pool,
            cf,
            sessions: wizard::new_store(),
        }
    }
}

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same handler tree is used in production and in integration
/// tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);
                let user_id = msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok()).unwrap_or(0);

                match cmd {
                    Command::Start => {
                        bot.send_message(msg.chat.id, WELCOME).reply_markup(menu::main_menu()).await?;
                    }
                    Command::Cancel => {
                        let text = if wizard::cancel_dialogue(&deps.sessions, msg.chat.id.0) {
                            "✅ Dialog dibatalkan."
                        } else {
                            "Tidak ada dialog yang sedang berjalan."
                        };
                        bot.send_message(msg.chat.id, text).await?;
                    }
                    Command::Check => {
                        if !admin::is_admin(user_id) {
                            bot.send_message(msg.chat.id, admin::DENIED).await?;
                        } else if let Err(e) = admin::run_manual_check(&bot, &deps, msg.chat.id).await {
                            log::error!("Manual check failed: {}", e);
                            bot.send_message(msg.chat.id, format!("❌ Gagal menjalankan check: {}", e))
                                .await?;
                        }
                    }
                    Command::List => {
                        if !admin::is_admin(user_id) {
                            bot.send_message(msg.chat.id, admin::DENIED).await?;
                        } else {
                            let workers = list_endpoints(&deps)?;
                            bot.send_message(msg.chat.id, endpoint_list_text(&workers))
                                .reply_markup(menu::back_to_main())
                                .await?;
                        }
                    }
                }
                Ok(())
            }
        },
    ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.text()
                .map(|text| !text.trim().is_empty() && !text.trim_start().starts_with('/'))
                .unwrap_or(false)
        })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let text = msg.text().unwrap_or_default().to_string();
                if let Err(e) = wizard::handle_text(&bot, &deps, msg.chat.id, &text).await {
                    log::error!("Dialogue step failed for chat {}: {}", msg.chat.id, e);
                    let _ = bot
                        .send_message(msg.chat.id, format!("❌ Gagal: {}. Dialog dibatalkan.", e))
                        .await;
                }
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            match handle_callback(bot, q, deps).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    log::error!("Callback handler failed: {}", e);
                    Err(Box::new(e) as HandlerError)
                }
            }
        }
    })
}

fn list_endpoints(deps: &HandlerDeps) -> AppResult<Vec<Worker>> {
    let conn = get_connection(&deps.db_pool)?;
    Ok(registry::list_workers_by_kind(&conn, ENDPOINT_KIND)?)
}

fn endpoint_list_text(workers: &[Worker]) -> String {
    if workers.is_empty() {
        return NO_SERVERS.to_string();
    }
    let mut out = String::from("📄 Daftar VLESS Worker:\n");
    for w in workers {
        out.push_str(&format!("\n{} {} ({})\n  {}", w.flag, w.worker_name, w.country_code, w.subdomain));
    }
    out
}

/// Hostnames behind a wildcard route, i.e. endpoints bound to a custom
/// domain rather than the default workers.dev host.
fn wildcard_list_text(workers: &[Worker]) -> String {
    let customs: Vec<&Worker> = workers
        .iter()
        .filter(|w| !w.subdomain.ends_with(".workers.dev"))
        .collect();
    if customs.is_empty() {
        return "🌍 Belum ada domain wildcard terdaftar.".to_string();
    }
    let mut out = String::from("🌍 Domain Wildcard aktif:\n");
    for w in customs {
        out.push_str(&format!("\n• *.{} → {}", w.subdomain, w.worker_name));
    }
    out
}

/// Handles callback queries from the menu inline keyboards.
///
/// Answers the query first, then either edits the menu message in
/// place (navigation) or sends new messages (wizard prompts, cards).
async fn handle_callback(bot: Bot, q: CallbackQuery, deps: HandlerDeps) -> AppResult<()> {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let chat_id = q.message.as_ref().map(|m| m.chat().id);
    let message_id = q.message.as_ref().map(|m| m.id());
    let (Some(chat_id), Some(message_id)) = (chat_id, message_id) else {
        return Ok(());
    };
    let user_id = i64::try_from(q.from.id.0).unwrap_or(0);

    log::info!("Callback '{}' from chat {}", data, chat_id);

    match data.as_str() {
        "menu_main" => {
            edit(&bot, chat_id, message_id, WELCOME, menu::main_menu()).await?;
        }
        "action_create_vless" => {
            let workers = list_endpoints(&deps)?;
            if workers.is_empty() {
                edit(&bot, chat_id, message_id, NO_SERVERS, menu::main_menu()).await?;
            } else {
                edit(
                    &bot,
                    chat_id,
                    message_id,
                    "Pilih server untuk membuat VLESS:",
                    menu::server_list(&workers, "select_server_"),
                )
                .await?;
            }
        }
        "action_list_vless" => {
            let workers = list_endpoints(&deps)?;
            edit(&bot, chat_id, message_id, &endpoint_list_text(&workers), menu::back_to_main()).await?;
        }
        "action_list_wildcard" => {
            let workers = list_endpoints(&deps)?;
            edit(&bot, chat_id, message_id, &wildcard_list_text(&workers), menu::back_to_main()).await?;
        }
        "action_all_status" => {
            let workers = list_endpoints(&deps)?;
            if workers.is_empty() {
                edit(&bot, chat_id, message_id, NO_SERVERS, menu::main_menu()).await?;
                return Ok(());
            }
            edit(
                &bot,
                chat_id,
                message_id,
                &format!("⏳ Memeriksa {} endpoint...", workers.len()),
                menu::back_to_main(),
            )
            .await?;

            let http = monitor::probe_client()?;
            let mut lines = String::from("📊 Status semua endpoint:\n");
            for worker in &workers {
                match monitor::probe_endpoint(&http, &worker.subdomain).await {
                    ProbeOutcome::Up { .. } => {
                        lines.push_str(&format!("\n✅ {} ({})", worker.worker_name, worker.subdomain));
                    }
                    ProbeOutcome::Down { .. } => {
                        lines.push_str(&format!("\n🔴 {} ({})", worker.worker_name, worker.subdomain));
                    }
                }
            }
            edit(&bot, chat_id, message_id, &lines, menu::back_to_main()).await?;
        }
        "action_check_status_vless" => {
            let workers = list_endpoints(&deps)?;
            if workers.is_empty() {
                edit(&bot, chat_id, message_id, NO_SERVERS, menu::main_menu()).await?;
            } else {
                edit(
                    &bot,
                    chat_id,
                    message_id,
                    "Pilih server untuk cek status:",
                    menu::server_list(&workers, "status_"),
                )
                .await?;
            }
        }
        "action_admin_menu" => {
            if !admin::is_admin(user_id) {
                bot.send_message(chat_id, admin::DENIED).await?;
                return Ok(());
            }
            edit(&bot, chat_id, message_id, "🛠 Admin Menu", menu::admin_menu()).await?;
        }
        "admin_cf_settings" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            edit(&bot, chat_id, message_id, "⚙️ Pengaturan API CF", menu::cf_settings_menu()).await?;
        }
        "admin_list_cf_vpn" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            let accounts = admin::list_accounts(&deps, AccountKind::Vpn)?;
            edit(
                &bot,
                chat_id,
                message_id,
                &admin::account_list_text("🔐 Akun CF VPN", &accounts),
                menu::cf_settings_menu(),
            )
            .await?;
        }
        "admin_cf_feeder" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            let accounts = admin::list_accounts(&deps, AccountKind::Feeder)?;
            edit(
                &bot,
                chat_id,
                message_id,
                &admin::account_list_text("📡 Akun CF Feeder", &accounts),
                menu::feeder_menu(),
            )
            .await?;
        }
        "admin_add_feeder" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            let prompt = wizard::start_wizard(&deps.sessions, chat_id.0, WizardFlow::Feeder);
            bot.send_message(chat_id, prompt).await?;
        }
        // Members may register their own accounts; deployment still
        // lands on their credentials only.
        "admin_add_cf_account" => {
            let prompt = wizard::start_wizard(&deps.sessions, chat_id.0, WizardFlow::Proxy);
            bot.send_message(chat_id, prompt).await?;
        }
        "admin_add_proxy" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            let prompt = wizard::start_wizard(&deps.sessions, chat_id.0, WizardFlow::ProxyExisting);
            bot.send_message(chat_id, prompt).await?;
        }
        "admin_del_proxy" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            let workers = list_endpoints(&deps)?;
            if workers.is_empty() {
                edit(&bot, chat_id, message_id, NO_SERVERS, menu::admin_menu()).await?;
            } else {
                edit(
                    &bot,
                    chat_id,
                    message_id,
                    "Pilih worker yang akan dihapus:",
                    menu::server_list(&workers, "delete_"),
                )
                .await?;
            }
        }
        "admin_stats" => {
            if !admin::is_admin(user_id) {
                return Ok(());
            }
            let text = admin::stats_text(&deps)?;
            edit(&bot, chat_id, message_id, &text, menu::admin_menu()).await?;
        }
        "method_ws" => {
            wizard::set_method(&deps.sessions, chat_id.0, InjectMethod::Ws);
            bot.send_message(chat_id, "⚡ Kirimkan BUG WS yang ingin digunakan.").await?;
        }
        "method_sni" | "method_wildcard" => {
            let method = if data == "method_sni" {
                InjectMethod::Sni
            } else {
                InjectMethod::Wildcard
            };
            wizard::set_method(&deps.sessions, chat_id.0, method);

            let workers = list_endpoints(&deps)?;
            let subdomains: Vec<String> = workers.into_iter().map(|w| w.subdomain).collect();
            edit(
                &bot,
                chat_id,
                message_id,
                &format!("Pilih salah satu subdomain untuk metode {}:", method.label()),
                menu::wildcard_list(&subdomains),
            )
            .await?;
        }
        other => {
            if let Some(subdomain) = other.strip_prefix("select_server_") {
                let worker = {
                    let conn = get_connection(&deps.db_pool)?;
                    registry::get_worker_by_subdomain(&conn, subdomain)?
                };
                let Some(worker) = worker else {
                    edit(&bot, chat_id, message_id, "⚠️ Server tidak ditemukan.", menu::back_to_main()).await?;
                    return Ok(());
                };
                wizard::select_server(&deps.sessions, chat_id.0, &worker.subdomain);
                edit(
                    &bot,
                    chat_id,
                    message_id,
                    &format!("✅ Server Terpilih: {} {}\n\nPilih metode inject:", worker.worker_name, worker.flag),
                    menu::method_menu(),
                )
                .await?;
            } else if let Some(selected) = other.strip_prefix("select_wildcard_") {
                let Some(server) = wizard::selected_server(&deps.sessions, chat_id.0) else {
                    edit(&bot, chat_id, message_id, "⚠️ Pilih server dulu dari menu Buat VLESS.", menu::main_menu())
                        .await?;
                    return Ok(());
                };
                let method = wizard::current_method(&deps.sessions, chat_id.0).unwrap_or(InjectMethod::Sni);
                wizard::send_config_card(&bot, &deps, chat_id, &server, method, selected).await?;
            } else if let Some(subdomain) = other.strip_prefix("status_") {
                edit(&bot, chat_id, message_id, &format!("⏳ Memeriksa {}...", subdomain), menu::back_to_main())
                    .await?;
                let http = monitor::probe_client()?;
                let text = match monitor::probe_endpoint(&http, subdomain).await {
                    ProbeOutcome::Up { status } => format!("✅ {} aktif (HTTP {}).", subdomain, status),
                    ProbeOutcome::Down { reason } => format!("🔴 {} down: {}", subdomain, reason),
                };
                edit(&bot, chat_id, message_id, &text, menu::back_to_main()).await?;
            } else if let Some(subdomain) = other.strip_prefix("delete_") {
                if !admin::is_admin(user_id) {
                    return Ok(());
                }
                let deleted = {
                    let conn = get_connection(&deps.db_pool)?;
                    match registry::get_worker_by_subdomain(&conn, subdomain)? {
                        Some(worker) => registry::delete_worker(&conn, worker.id)? > 0,
                        None => false,
                    }
                };
                let text = if deleted {
                    "🗑 Dihapus dari daftar (worker di Cloudflare tidak disentuh)."
                } else {
                    "⚠️ Worker tidak ditemukan."
                };
                edit(&bot, chat_id, message_id, text, menu::admin_menu()).await?;
            } else {
                log::warn!("Unhandled callback data: {}", other);
            }
        }
    }

    Ok(())
}

async fn edit(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    text: &str,
    keyboard: InlineKeyboardMarkup,
) -> AppResult<()> {
    bot.edit_message_text(chat_id, message_id, text).reply_markup(keyboard).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn worker(name: &str, subdomain: &str) -> Worker {
        Worker {
            id: 1,
            subdomain: subdomain.to_string(),
            account_id: 1,
            worker_name: name.to_string(),
            kind: ENDPOINT_KIND.to_string(),
            country_code: "ID".to_string(),
            flag: "🇮🇩".to_string(),
        }
    }

    #[test]
    fn endpoint_listing_shows_host_and_name() {
        let text = endpoint_list_text(&[worker("vless-sg1", "vless-sg1.abcd.workers.dev")]);
        assert!(text.contains("vless-sg1"));
        assert!(text.contains("vless-sg1.abcd.workers.dev"));
    }

    #[test]
    fn empty_endpoint_listing_points_at_the_admin() {
        assert_eq!(endpoint_list_text(&[]), NO_SERVERS);
    }

    #[test]
    fn wildcard_listing_keeps_only_custom_domains() {
        let workers = vec![
            worker("vless-sg1", "vless-sg1.abcd.workers.dev"),
            worker("vless-vip", "vip.example.com"),
        ];
        let text = wildcard_list_text(&workers);
        assert!(text.contains("*.vip.example.com"));
        assert!(!text.contains("workers.dev"));
    }

    #[test]
    fn wildcard_listing_handles_no_custom_domains() {
        let workers = vec![worker("vless-sg1", "vless-sg1.abcd.workers.dev")];
        assert_eq!(wildcard_list_text(&workers), "🌍 Belum ada domain wildcard terdaftar.");
    }
}
