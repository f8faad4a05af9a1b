//! Account/Endpoint registry persistence
//!
//! SQLite-backed store for Cloudflare accounts, deployed workers, and the
//! process-wide settings table (monitor secret + alert channel).

pub mod db;
pub mod registry;

pub use db::{create_pool, get_connection, DbConnection, DbPool};
