//! Admin-only console pieces: access gate, account listings, registry
//! stats, and the run-checks-now action.

use teloxide::prelude::*;

use vlesscore::cloudflare::mask_key;
use vlesscore::config::admin::{ADMIN_IDS, ADMIN_USER_ID};
use vlesscore::error::AppResult;
use vlesscore::monitor::{self, CheckReport};
use vlesscore::storage::get_connection;
use vlesscore::storage::registry::{self, AccountKind, CfAccount, SETTING_MONITOR_CHANNEL, SETTING_MONITOR_SECRET};

use super::handlers::HandlerDeps;
use super::notifications::TelegramNotifier;

pub const DENIED: &str = "⛔ Akses Ditolak.";

/// Check if user is admin
pub fn is_admin(user_id: i64) -> bool {
    if !ADMIN_IDS.is_empty() {
        return ADMIN_IDS.contains(&user_id);
    }
    if *ADMIN_USER_ID != 0 {
        return *ADMIN_USER_ID == user_id;
    }
    false
}

/// Render stored accounts of one kind. Keys never leave the process
/// unmasked.
pub fn account_list_text(title: &str, accounts: &[CfAccount]) -> String {
    if accounts.is_empty() {
        return format!("{}\n\n(kosong)", title);
    }
    let mut out = format!("{}\n", title);
    for account in accounts {
        out.push_str(&format!(
            "\n• {}\n  ID: {}\n  Key: {}\n  Status: {}",
            account.email,
            account.account_id,
            mask_key(&account.api_key),
            account.status
        ));
    }
    out
}

pub fn list_accounts(deps: &HandlerDeps, kind: AccountKind) -> AppResult<Vec<CfAccount>> {
    let conn = get_connection(&deps.db_pool)?;
    Ok(registry::list_accounts_by_kind(&conn, kind)?)
}

/// Registry counters shown under Statistik & Monitor.
pub fn stats_text(deps: &HandlerDeps) -> AppResult<String> {
    let conn = get_connection(&deps.db_pool)?;
    let vpn = registry::list_accounts_by_kind(&conn, AccountKind::Vpn)?.len();
    let feeder = registry::list_accounts_by_kind(&conn, AccountKind::Feeder)?.len();
    let endpoints = registry::list_workers_by_kind(&conn, vlesscore::provision::ENDPOINT_KIND)?.len();
    let secret_set = registry::get_setting(&conn, SETTING_MONITOR_SECRET)?.is_some();
    let channel = registry::get_setting(&conn, SETTING_MONITOR_CHANNEL)?;

    Ok(format!(
        "📊 Statistik & Monitor\n\n\
         Akun VPN: {}\n\
         Akun Feeder: {}\n\
         Endpoint aktif: {}\n\
         Monitor secret: {}\n\
         Channel alert: {}",
        vpn,
        feeder,
        endpoints,
        if secret_set { "terpasang" } else { "belum ada" },
        channel.as_deref().unwrap_or("belum ada")
    ))
}

fn report_text(report: &CheckReport) -> String {
    format!(
        "✅ Check selesai.\nDiperiksa: {}\nUp: {}\nDown: {}\nAlert terkirim: {}",
        report.checked, report.up, report.down, report.alerts_sent
    )
}

/// Run the monitor sweep on demand and report the tally back to the
/// requesting admin chat. Alerts still go to the configured channel.
pub async fn run_manual_check(bot: &Bot, deps: &HandlerDeps, chat_id: ChatId) -> AppResult<()> {
    bot.send_message(chat_id, "🔄 Menjalankan health check...").await?;

    let http = monitor::probe_client()?;
    let notifier = TelegramNotifier::from_settings(bot.clone(), &deps.db_pool)?;
    let report = match &notifier {
        Some(n) => monitor::run_checks(&deps.db_pool, &http, Some(n)).await?,
        None => monitor::run_checks(&deps.db_pool, &http, None).await?,
    };

    bot.send_message(chat_id, report_text(&report)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn account(email: &str, key: &str) -> CfAccount {
        CfAccount {
            id: 1,
            email: email.to_string(),
            api_key: key.to_string(),
            account_id: "abcd1234ef567890".to_string(),
            kind: AccountKind::Vpn,
            owner_id: 42,
            status: "active".to_string(),
        }
    }

    #[test]
    fn account_listing_masks_the_key() {
        let text = account_list_text("🔐 Akun CF VPN", &[account("a@b.co", "super-secret-key-value")]);
        assert!(text.contains("supe…******"));
        assert!(!text.contains("super-secret-key-value"));
    }

    #[test]
    fn empty_listing_says_so() {
        assert_eq!(account_list_text("🔐 Akun CF VPN", &[]), "🔐 Akun CF VPN\n\n(kosong)");
    }

    #[test]
    fn report_text_carries_the_tally() {
        let report = CheckReport {
            checked: 3,
            up: 2,
            down: 1,
            alerts_sent: 1,
            alert_failures: 0,
        };
        assert_eq!(
            report_text(&report),
            "✅ Check selesai.\nDiperiksa: 3\nUp: 2\nDown: 1\nAlert terkirim: 1"
        );
    }
}
