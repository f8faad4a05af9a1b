//! Inline keyboards.
//!
//! Callback data strings are part of the bot's wire surface; handlers
//! route on them, so they stay stable across UI reshuffles.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use vlesscore::storage::registry::Worker;

fn btn(label: &str, data: &str) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.to_string(), data.to_string())
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![btn("🌐 Buat VLESS", "action_create_vless"), btn("📄 List VLESS", "action_list_vless")],
        vec![
            btn("📊 All Status", "action_all_status"),
            btn("🔍 Cek Status VLESS", "action_check_status_vless"),
        ],
        vec![
            btn("🌍 List Wildcard", "action_list_wildcard"),
            btn("🛠 Admin Menu", "action_admin_menu"),
        ],
    ])
}

/// Injection method picker (WS, SNI, WILDCARD).
pub fn method_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![btn("WS", "method_ws"), btn("SNI", "method_sni")],
        vec![btn("WILDCARD", "method_wildcard")],
        vec![btn("⬅️ Kembali", "menu_main")],
    ])
}

pub fn admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![btn("⚙️ Pengaturan API CF", "admin_cf_settings")],
        vec![btn("➕ Add Proxy", "admin_add_proxy"), btn("🗑 Del Proxy", "admin_del_proxy")],
        vec![btn("📊 Statistik & Monitor", "admin_stats")],
        vec![btn("⬅️ Kembali", "menu_main")],
    ])
}

pub fn cf_settings_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![btn("🔐 Akun CF VPN", "admin_list_cf_vpn")],
        vec![btn("📡 Akun CF Feeder", "admin_cf_feeder")],
        vec![btn("📥 Tambah Akun Baru", "admin_add_cf_account")],
        vec![btn("⬅️ Kembali", "action_admin_menu")],
    ])
}

pub fn feeder_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![btn("🚀 Deploy Feeder Monitor", "admin_add_feeder")],
        vec![btn("⬅️ Kembali", "admin_cf_settings")],
    ])
}

pub fn back_to_main() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![btn("⬅️ Kembali", "menu_main")]])
}

/// One button per endpoint; `prefix` decides what the tap does
/// (`select_server_`, `status_`, `delete_`).
pub fn server_list(servers: &[Worker], prefix: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = servers
        .iter()
        .map(|s| {
            vec![btn(
                &format!("({}) {} {}", s.country_code, s.worker_name, s.flag),
                &format!("{}{}", prefix, s.subdomain),
            )]
        })
        .collect();
    rows.push(vec![btn("⬅️ Kembali", "menu_main")]);
    InlineKeyboardMarkup::new(rows)
}

/// Subdomain picker for the SNI/WILDCARD method step.
pub fn wildcard_list(subdomains: &[String]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = subdomains
        .iter()
        .map(|s| vec![btn(s, &format!("select_wildcard_{}", s))])
        .collect();
    rows.push(vec![btn("⬅️ Kembali", "menu_main")]);
    InlineKeyboardMarkup::new(rows)
}
