//! Per-chat dialogue state.
//!
//! One `ChatState` per chat id holds the active provisioning wizard plus
//! the picked server/method for link building. A chat advances one step
//! per inbound message; starting a new wizard replaces the old one. The
//! session is taken out of the map before any network call and put back
//! only if the dialogue continues, so the store lock never spans a
//! request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;

use vlesscore::cloudflare::{mask_key, CfAuth, Zone};
use vlesscore::config;
use vlesscore::error::AppResult;
use vlesscore::links::{self, LinkMethod};
use vlesscore::provision::{self, DomainChoice, DomainResolution, FeederDraft, ProvisionWarning, ProxyDraft};
use vlesscore::storage::get_connection;
use vlesscore::storage::registry;

use super::handlers::HandlerDeps;
use super::menu;

const PROMPT_EMAIL: &str = "📧 Masukkan Email Cloudflare Anda:";
const PROMPT_KEY: &str = "🔑 Masukkan Global API Key / Token:";
const PROMPT_ACCOUNT: &str = "🆔 Masukkan Account ID:";
const PROMPT_EXISTING_ACCOUNT: &str = "🆔 Masukkan Account ID Cloudflare target deployment:";
const PROMPT_NAME: &str = "📝 Masukkan Nama Worker (ex: vless-sg1) atau ketik 'skip':";
const PROMPT_DOMAIN: &str = "🌐 Gunakan Custom Domain? (Ketik domain atau 'skip'):";
const PROMPT_CHANNEL: &str = "📡 Masukkan Channel ID untuk alert monitor:";
const PROMPT_TARGET_URL: &str = "🔗 Masukkan URL bot untuk trigger monitor (https://...):";
const VERIFYING: &str = "⏳ Memverifikasi akun...";

/// Which provisioning dialogue is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardFlow {
    /// Collect fresh credentials, then deploy a proxy worker.
    Proxy,
    /// Deploy a proxy worker onto an already registered account.
    ProxyExisting,
    /// Collect credentials for the feeder account, then deploy the monitor.
    Feeder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WizardStep {
    AwaitEmail,
    AwaitApiKey,
    AwaitAccountId,
    AwaitExistingAccount,
    AwaitWorkerName,
    AwaitDomain,
    AwaitChannelId,
    AwaitTargetUrl,
}

/// Accumulated answers of one provisioning dialogue.
#[derive(Debug, Clone)]
pub struct WizardSession {
    flow: WizardFlow,
    step: WizardStep,
    email: String,
    api_key: String,
    account_id: String,
    zones: Vec<Zone>,
    worker_name: String,
    channel_id: i64,
}

impl WizardSession {
    fn new(flow: WizardFlow) -> Self {
        let step = match flow {
            WizardFlow::Proxy | WizardFlow::Feeder => WizardStep::AwaitEmail,
            WizardFlow::ProxyExisting => WizardStep::AwaitExistingAccount,
        };
        Self {
            flow,
            step,
            email: String::new(),
            api_key: String::new(),
            account_id: String::new(),
            zones: Vec::new(),
            worker_name: String::new(),
            channel_id: 0,
        }
    }

    fn auth(&self) -> CfAuth {
        CfAuth::new(&self.email, &self.api_key, &self.account_id)
    }
}

/// Link method picked from the inject menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectMethod {
    Ws,
    Sni,
    Wildcard,
}

impl InjectMethod {
    pub fn label(self) -> &'static str {
        match self {
            InjectMethod::Ws => "WS",
            InjectMethod::Sni => "SNI",
            InjectMethod::Wildcard => "WILDCARD",
        }
    }
}

/// Everything the bot remembers about one chat between messages.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    wizard: Option<WizardSession>,
    selected_server: Option<String>,
    method: Option<InjectMethod>,
    awaiting_bug: bool,
}

pub type SessionStore = Arc<Mutex<HashMap<i64, ChatState>>>;

pub fn new_store() -> SessionStore {
    Arc::new(Mutex::new(HashMap::new()))
}

fn lock(store: &SessionStore) -> MutexGuard<'_, HashMap<i64, ChatState>> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Begin a dialogue, replacing whatever was active in this chat.
/// Returns the first prompt to send.
pub fn start_wizard(store: &SessionStore, chat_id: i64, flow: WizardFlow) -> &'static str {
    let mut map = lock(store);
    let state = map.entry(chat_id).or_default();
    state.wizard = Some(WizardSession::new(flow));
    state.awaiting_bug = false;
    match flow {
        WizardFlow::Proxy | WizardFlow::Feeder => PROMPT_EMAIL,
        WizardFlow::ProxyExisting => PROMPT_EXISTING_ACCOUNT,
    }
}

/// Drop any active dialogue or pending input. Returns whether one existed.
pub fn cancel_dialogue(store: &SessionStore, chat_id: i64) -> bool {
    let mut map = lock(store);
    match map.get_mut(&chat_id) {
        Some(state) if state.wizard.is_some() || state.awaiting_bug => {
            state.wizard = None;
            state.awaiting_bug = false;
            true
        }
        _ => false,
    }
}

pub fn select_server(store: &SessionStore, chat_id: i64, subdomain: &str) {
    let mut map = lock(store);
    let state = map.entry(chat_id).or_default();
    state.selected_server = Some(subdomain.to_string());
    state.method = None;
    state.awaiting_bug = false;
}

pub fn set_method(store: &SessionStore, chat_id: i64, method: InjectMethod) {
    let mut map = lock(store);
    let state = map.entry(chat_id).or_default();
    state.method = Some(method);
    state.awaiting_bug = method == InjectMethod::Ws;
}

pub fn selected_server(store: &SessionStore, chat_id: i64) -> Option<String> {
    lock(store).get(&chat_id).and_then(|s| s.selected_server.clone())
}

pub fn current_method(store: &SessionStore, chat_id: i64) -> Option<InjectMethod> {
    lock(store).get(&chat_id).and_then(|s| s.method)
}

enum TextTarget {
    Wizard(WizardSession),
    Bug { subdomain: String },
    Ignored,
}

fn take_text_target(store: &SessionStore, chat_id: i64) -> TextTarget {
    let mut map = lock(store);
    let Some(state) = map.get_mut(&chat_id) else {
        return TextTarget::Ignored;
    };
    if let Some(session) = state.wizard.take() {
        return TextTarget::Wizard(session);
    }
    if state.awaiting_bug {
        state.awaiting_bug = false;
        if let Some(subdomain) = state.selected_server.clone() {
            return TextTarget::Bug { subdomain };
        }
    }
    TextTarget::Ignored
}

fn resume(store: &SessionStore, chat_id: i64, session: WizardSession) {
    lock(store).entry(chat_id).or_default().wizard = Some(session);
}

/// Route a free-text message into whatever this chat is waiting for.
/// Chats with nothing pending are left alone.
pub async fn handle_text(bot: &Bot, deps: &HandlerDeps, chat_id: ChatId, text: &str) -> AppResult<()> {
    match take_text_target(&deps.sessions, chat_id.0) {
        TextTarget::Ignored => Ok(()),
        TextTarget::Bug { subdomain } => {
            send_config_card(bot, deps, chat_id, &subdomain, InjectMethod::Ws, text.trim()).await
        }
        TextTarget::Wizard(session) => advance_wizard(bot, deps, chat_id, session, text).await,
    }
}

async fn advance_wizard(
    bot: &Bot,
    deps: &HandlerDeps,
    chat_id: ChatId,
    mut session: WizardSession,
    text: &str,
) -> AppResult<()> {
    let input = text.trim();

    match session.step {
        WizardStep::AwaitEmail => {
            session.email = input.to_string();
            session.step = WizardStep::AwaitApiKey;
            resume(&deps.sessions, chat_id.0, session);
            bot.send_message(chat_id, PROMPT_KEY).await?;
        }
        WizardStep::AwaitApiKey => {
            session.api_key = input.to_string();
            session.step = WizardStep::AwaitAccountId;
            resume(&deps.sessions, chat_id.0, session);
            bot.send_message(chat_id, PROMPT_ACCOUNT).await?;
        }
        WizardStep::AwaitAccountId => {
            session.account_id = input.to_string();
            match provision::validate_credentials(&session.email, &session.api_key, &session.account_id) {
                Ok(auth) => {
                    session.email = auth.email.clone();
                    session.api_key = auth.api_key.clone();
                    session.account_id = auth.account_id.clone();
                    verify_and_continue(bot, deps, chat_id, session).await?;
                }
                Err(e) => {
                    bot.send_message(chat_id, format!("❌ {}\nDialog dibatalkan, ulangi dari menu.", e))
                        .await?;
                }
            }
        }
        WizardStep::AwaitExistingAccount => {
            let account = {
                let conn = get_connection(&deps.db_pool)?;
                registry::get_account_by_account_id(&conn, input)?
            };
            match account {
                Some(account) => {
                    session.email = account.email;
                    session.api_key = account.api_key;
                    session.account_id = account.account_id;
                    verify_and_continue(bot, deps, chat_id, session).await?;
                }
                None => {
                    bot.send_message(
                        chat_id,
                        "⚠️ Akun ID tidak ditemukan di database. Tambahkan akun dulu di menu Admin.",
                    )
                    .await?;
                }
            }
        }
        WizardStep::AwaitWorkerName => {
            session.worker_name = provision::resolve_worker_name(input);
            session.step = WizardStep::AwaitDomain;
            resume(&deps.sessions, chat_id.0, session);
            bot.send_message(chat_id, PROMPT_DOMAIN).await?;
        }
        WizardStep::AwaitDomain => {
            let domain = match provision::resolve_domain(&session.zones, input) {
                DomainResolution::Default => None,
                DomainResolution::Matched { hostname, zone_id } => {
                    bot.send_message(chat_id, "⚙️ Mengikat Custom Domain & Routing Wildcard...")
                        .await?;
                    Some(DomainChoice { hostname, zone_id })
                }
                DomainResolution::Unmatched { hostname } => {
                    bot.send_message(
                        chat_id,
                        format!(
                            "⚠️ Domain {} tidak ada di zona akun Anda. Tetap menggunakan subdomain standar.",
                            hostname
                        ),
                    )
                    .await?;
                    None
                }
            };

            bot.send_message(chat_id, "🚀 Sedang men-deploy VLESS Worker ke akun Anda...")
                .await?;
            let draft = ProxyDraft {
                auth: session.auth(),
                owner_id: chat_id.0,
                worker_name: session.worker_name.clone(),
                domain,
            };
            match provision::deploy_proxy(&deps.cf, &deps.db_pool, &draft).await {
                Ok(outcome) => {
                    for warning in &outcome.warnings {
                        bot.send_message(chat_id, warning_text(warning)).await?;
                    }
                    bot.send_message(
                        chat_id,
                        format!(
                            "✅ Selesai! Worker Anda aktif: {}.\nSiap digunakan untuk WS/SNI/Wildcard Pribadi.",
                            outcome.subdomain
                        ),
                    )
                    .reply_markup(menu::main_menu())
                    .await?;
                }
                Err(e) => {
                    bot.send_message(chat_id, format!("❌ Gagal deploy {}: {}", draft.worker_name, e))
                        .await?;
                }
            }
        }
        WizardStep::AwaitChannelId => match provision::parse_channel_id(input) {
            Ok(channel_id) => {
                session.channel_id = channel_id;
                session.step = WizardStep::AwaitTargetUrl;
                resume(&deps.sessions, chat_id.0, session);
                bot.send_message(chat_id, PROMPT_TARGET_URL).await?;
            }
            Err(e) => {
                bot.send_message(chat_id, format!("❌ {}\nDialog dibatalkan, ulangi dari menu.", e))
                    .await?;
            }
        },
        WizardStep::AwaitTargetUrl => match provision::parse_target_url(input) {
            Ok(target_url) => {
                bot.send_message(chat_id, "🚀 Men-deploy monitor worker ke akun feeder...")
                    .await?;
                let draft = FeederDraft {
                    auth: session.auth(),
                    owner_id: chat_id.0,
                    channel_id: session.channel_id,
                    target_url,
                };
                match provision::deploy_feeder(&deps.cf, &deps.db_pool, &draft).await {
                    Ok(outcome) => {
                        for warning in &outcome.warnings {
                            bot.send_message(chat_id, warning_text(warning)).await?;
                        }
                        bot.send_message(
                            chat_id,
                            format!(
                                "✅ Monitor feeder aktif!\nWorker: {}\nSecret: {}\nChannel: {}\nCron: {}",
                                outcome.worker_name,
                                mask_key(&outcome.secret),
                                session.channel_id,
                                config::monitor::CRON_SCHEDULE
                            ),
                        )
                        .reply_markup(menu::main_menu())
                        .await?;
                    }
                    Err(e) => {
                        bot.send_message(
                            chat_id,
                            format!("❌ Gagal deploy {}: {}", config::monitor::WORKER_NAME, e),
                        )
                        .await?;
                    }
                }
            }
            Err(e) => {
                bot.send_message(chat_id, format!("❌ {}\nDialog dibatalkan, ulangi dari menu.", e))
                    .await?;
            }
        },
    }

    Ok(())
}

/// Shared VerifyAccount gate: zones cached on success, dialogue dropped
/// on failure (nothing has been created remotely yet).
async fn verify_and_continue(bot: &Bot, deps: &HandlerDeps, chat_id: ChatId, mut session: WizardSession) -> AppResult<()> {
    bot.send_message(chat_id, VERIFYING).await?;
    match provision::verify_account(&deps.cf, &session.auth()).await {
        Ok(zones) => {
            session.zones = zones;
            if session.flow == WizardFlow::Feeder {
                session.step = WizardStep::AwaitChannelId;
                resume(&deps.sessions, chat_id.0, session);
                bot.send_message(chat_id, PROMPT_CHANNEL).await?;
            } else {
                session.step = WizardStep::AwaitWorkerName;
                resume(&deps.sessions, chat_id.0, session);
                bot.send_message(chat_id, PROMPT_NAME).await?;
            }
        }
        Err(e) => {
            bot.send_message(chat_id, format!("❌ Verifikasi akun gagal: {}", e)).await?;
        }
    }
    Ok(())
}

fn warning_text(warning: &ProvisionWarning) -> String {
    match warning {
        ProvisionWarning::BindFailed { hostname, error } => format!(
            "⚠️ Gagal BIND Domain {}: {}. Tetap menggunakan subdomain standar.",
            hostname, error
        ),
        ProvisionWarning::RouteFailed { pattern, error } => format!(
            "⚠️ Gagal Set Route Wildcard ({}): {}. Coba set manual di Dash CF.",
            pattern, error
        ),
        ProvisionWarning::ScheduleFailed { error } => {
            format!("⚠️ Gagal set Cron Trigger: {}. Atur manual di Dash CF.", error)
        }
    }
}

/// Render and send the four-message config card for one endpoint.
pub async fn send_config_card(
    bot: &Bot,
    deps: &HandlerDeps,
    chat_id: ChatId,
    subdomain: &str,
    method: InjectMethod,
    payload: &str,
) -> AppResult<()> {
    let worker = {
        let conn = get_connection(&deps.db_pool)?;
        registry::get_worker_by_subdomain(&conn, subdomain)?
    };
    let Some(worker) = worker else {
        bot.send_message(chat_id, "⚠️ Server tidak ditemukan.").await?;
        return Ok(());
    };

    let link_method = match method {
        InjectMethod::Ws => LinkMethod::Ws {
            bug: payload.to_string(),
        },
        InjectMethod::Sni => LinkMethod::Sni {
            host: payload.to_string(),
        },
        InjectMethod::Wildcard => LinkMethod::Wildcard {
            front: payload.to_string(),
        },
    };
    let card = links::new_card(&worker, &link_method);

    bot.send_message(
        chat_id,
        format!(
            "{}\n\n<b>{}</b>\nMethod: {}",
            html::escape(payload),
            html::escape(&card.remark),
            method.label()
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    bot.send_message(chat_id, format!("<code>{}</code>", html::escape(&card.vless_tls)))
        .parse_mode(ParseMode::Html)
        .await?;
    bot.send_message(chat_id, format!("<code>{}</code>", html::escape(&card.vless_ntls)))
        .parse_mode(ParseMode::Html)
        .await?;
    bot.send_message(chat_id, format!("<code>{}</code>", html::escape(&card.clash)))
        .parse_mode(ParseMode::Html)
        .await?;
    bot.send_message(chat_id, "Selesai.").reply_markup(menu::main_menu()).await?;

    Ok(())
}
