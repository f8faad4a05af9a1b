//! vlessbot - Telegram admin console for VLESS workers on Cloudflare
//!
//! This library wires the provisioning/monitoring core into a Telegram
//! bot: inline menus, multi-step provisioning dialogues, status
//! actions, and the HTTP trigger surface the deployed monitor worker
//! calls back into.
//!
//! # Module Structure
//!
//! - `cli`: command-line argument parsing
//! - `telegram`: bot instance, dispatcher schema, menus, dialogues
//! - `web`: trigger router and webhook-mode middleware

pub mod cli;
pub mod telegram;
pub mod web;

// Re-export commonly used types for convenience
pub use telegram::{create_bot, schema, HandlerDeps, HandlerError};
pub use web::{start_trigger_server, trigger_router, WebState};
