//! vlesscore - provisioning and monitoring core for the VLESS admin bot
//!
//! Everything that does not require Telegram lives here: the Cloudflare
//! API client, the SQLite-backed registry, the provisioning executors and
//! the endpoint health checks. The `vlessbot` binary layers the bot UI on
//! top.
//!
//! # Module Structure
//!
//! - `cloudflare`: thin typed client for the Workers/zones API
//! - `storage`: connection pool, schema, registry queries
//! - `provision`: proxy and feeder deployment workflows
//! - `monitor`: health-check sweep and alert delivery
//! - `links`: client config card generation
//! - `scripts`: embedded worker templates
//! - `config`, `error`, `logging`: ambient plumbing

pub mod cloudflare;
pub mod config;
pub mod error;
pub mod links;
pub mod logging;
pub mod monitor;
pub mod provision;
pub mod scripts;
pub mod storage;

// Re-export commonly used types for convenience
pub use cloudflare::{CfAuth, CfClient, Zone};
pub use error::{AppError, AppResult};
pub use logging::init_logger;
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
