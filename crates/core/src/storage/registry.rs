//! Row types and CRUD for the account/endpoint registry.
//!
//! Accounts are upserted by their Cloudflare account id, endpoints are
//! insert-only, and deleting an endpoint touches nothing on the remote
//! platform.

use rusqlite::{params, Connection, OptionalExtension};

/// Account kind: a tenant hosting proxy endpoints or the dedicated
/// feeder account that hosts the cron monitor worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    Vpn,
    Feeder,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Vpn => "vpn",
            AccountKind::Feeder => "feeder",
        }
    }

    fn from_db(raw: &str) -> Self {
        match raw {
            "feeder" => AccountKind::Feeder,
            _ => AccountKind::Vpn,
        }
    }
}

/// A stored Cloudflare credential set.
#[derive(Debug, Clone)]
pub struct CfAccount {
    pub id: i64,
    pub email: String,
    pub api_key: String,
    pub account_id: String,
    pub kind: AccountKind,
    pub owner_id: i64,
    pub status: String,
}

/// A deployed proxy endpoint.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: i64,
    pub subdomain: String,
    pub account_id: i64,
    pub worker_name: String,
    pub kind: String,
    pub country_code: String,
    pub flag: String,
}

fn parse_account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CfAccount> {
    let kind: String = row.get(4)?;
    Ok(CfAccount {
        id: row.get(0)?,
        email: row.get(1)?,
        api_key: row.get(2)?,
        account_id: row.get(3)?,
        kind: AccountKind::from_db(&kind),
        owner_id: row.get(5)?,
        status: row.get(6)?,
    })
}

fn parse_worker_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Worker> {
    Ok(Worker {
        id: row.get(0)?,
        subdomain: row.get(1)?,
        account_id: row.get(2)?,
        worker_name: row.get(3)?,
        kind: row.get(4)?,
        country_code: row.get(5)?,
        flag: row.get(6)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, email, api_key, account_id, kind, owner_id, status";
const WORKER_COLUMNS: &str = "id, subdomain, account_id, worker_name, kind, country_code, flag";

/// Insert an account or refresh its credentials when the Cloudflare
/// account id is already known. Returns the row id.
pub fn upsert_account(
    conn: &Connection,
    email: &str,
    api_key: &str,
    account_id: &str,
    kind: AccountKind,
    owner_id: i64,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "INSERT INTO cf_accounts (email, api_key, account_id, kind, owner_id)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(account_id) DO UPDATE SET
           email = excluded.email,
           api_key = excluded.api_key,
           kind = excluded.kind,
           owner_id = excluded.owner_id
         RETURNING id",
        params![email, api_key, account_id, kind.as_str(), owner_id],
        |row| row.get(0),
    )
}

/// Look up an account by its Cloudflare account id.
pub fn get_account_by_account_id(conn: &Connection, account_id: &str) -> rusqlite::Result<Option<CfAccount>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM cf_accounts WHERE account_id = ?1"),
        params![account_id],
        parse_account_row,
    )
    .optional()
}

/// List accounts of one kind, newest first.
pub fn list_accounts_by_kind(conn: &Connection, kind: AccountKind) -> rusqlite::Result<Vec<CfAccount>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM cf_accounts WHERE kind = ?1 ORDER BY id DESC"))?;
    let rows = stmt.query_map(params![kind.as_str()], parse_account_row)?;
    rows.collect()
}

/// Record a freshly deployed endpoint. Endpoints are insert-only; a
/// redeploy of the same script records a new row.
pub fn insert_worker(
    conn: &Connection,
    subdomain: &str,
    account_row_id: i64,
    worker_name: &str,
    kind: &str,
    country_code: &str,
    flag: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO workers (subdomain, account_id, worker_name, kind, country_code, flag)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![subdomain, account_row_id, worker_name, kind, country_code, flag],
    )?;
    Ok(conn.last_insert_rowid())
}

/// List endpoints of one kind in insertion order.
pub fn list_workers_by_kind(conn: &Connection, kind: &str) -> rusqlite::Result<Vec<Worker>> {
    let mut stmt = conn.prepare(&format!("SELECT {WORKER_COLUMNS} FROM workers WHERE kind = ?1 ORDER BY id"))?;
    let rows = stmt.query_map(params![kind], parse_worker_row)?;
    rows.collect()
}

/// Look up an endpoint by its public hostname.
pub fn get_worker_by_subdomain(conn: &Connection, subdomain: &str) -> rusqlite::Result<Option<Worker>> {
    conn.query_row(
        &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE subdomain = ?1"),
        params![subdomain],
        parse_worker_row,
    )
    .optional()
}

/// Remove an endpoint row. Registry-only: the deployed script on the
/// platform is left untouched.
pub fn delete_worker(conn: &Connection, worker_id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM workers WHERE id = ?1", params![worker_id])
}

/// Store a settings value, replacing any previous one (last write wins).
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Read a settings value.
pub fn get_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
}

/// Settings key holding the trigger-endpoint shared secret.
pub const SETTING_MONITOR_SECRET: &str = "monitor_secret";
/// Settings key holding the alert channel chat id.
pub const SETTING_MONITOR_CHANNEL: &str = "monitor_channel_id";
