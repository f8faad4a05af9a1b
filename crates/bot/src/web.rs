//! Trigger HTTP surface.
//!
//! The deployed monitor worker calls back into the bot over HTTP with
//! `?action=check_proxies&secret=...`; a matching secret runs one
//! sweep. In polling mode a small router serves this on WEB_PORT. In
//! webhook mode the same check runs as middleware in front of the
//! Telegram update router, so the trigger fires regardless of which
//! path or method the worker was configured with.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use teloxide::prelude::*;
use tokio::net::TcpListener;

use vlesscore::error::AppResult;
use vlesscore::monitor::{self, CheckReport};
use vlesscore::storage::db::DbPool;
use vlesscore::storage::get_connection;
use vlesscore::storage::registry::{self, SETTING_MONITOR_SECRET};

use crate::telegram::TelegramNotifier;

const TRIGGER_ACTION: &str = "check_proxies";

/// Shared state for the trigger server.
#[derive(Clone)]
pub struct WebState {
    pub db: Arc<DbPool>,
    pub bot: Bot,
}

struct TriggerRequest {
    secret: Option<String>,
}

/// Extract the trigger action from a query string. `None` means the
/// request is not a trigger call at all.
fn parse_trigger(query: Option<&str>) -> Option<TriggerRequest> {
    let query = query?;
    let mut action = None;
    let mut secret = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "action" => action = Some(value.into_owned()),
            "secret" => secret = Some(value.into_owned()),
            _ => {}
        }
    }
    (action.as_deref() == Some(TRIGGER_ACTION)).then_some(TriggerRequest { secret })
}

/// Exact match against the stored secret. No stored secret means no
/// feeder was provisioned, so every trigger is rejected.
fn authorize(db: &DbPool, given: Option<&str>) -> AppResult<bool> {
    let conn = get_connection(db)?;
    let stored = registry::get_setting(&conn, SETTING_MONITOR_SECRET)?;
    Ok(match (stored, given) {
        (Some(stored), Some(given)) => stored == given,
        _ => false,
    })
}

/// Run one monitor sweep with alerts wired to the stored channel.
pub async fn run_trigger_check(state: &WebState) -> AppResult<CheckReport> {
    let http = monitor::probe_client()?;
    let notifier = TelegramNotifier::from_settings(state.bot.clone(), &state.db)?;
    match &notifier {
        Some(n) => monitor::run_checks(&state.db, &http, Some(n)).await,
        None => monitor::run_checks(&state.db, &http, None).await,
    }
}

async fn handle_trigger(state: &WebState, query: Option<&str>) -> Option<Response> {
    let trigger = parse_trigger(query)?;

    let authorized = match authorize(&state.db, trigger.secret.as_deref()) {
        Ok(ok) => ok,
        Err(e) => {
            log::error!("Trigger authorization failed: {}", e);
            return Some((StatusCode::INTERNAL_SERVER_ERROR, "Check failed").into_response());
        }
    };
    if !authorized {
        log::warn!("Trigger rejected: secret mismatch");
        return Some((StatusCode::UNAUTHORIZED, "Unauthorized").into_response());
    }

    Some(match run_trigger_check(state).await {
        Ok(report) => {
            log::info!(
                "Trigger check done: {} checked, {} up, {} down, {} alerts",
                report.checked,
                report.up,
                report.down,
                report.alerts_sent
            );
            (StatusCode::OK, "Checked").into_response()
        }
        Err(e) => {
            log::error!("Trigger check failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Check failed").into_response()
        }
    })
}

async fn trigger_handler(State(state): State<WebState>, req: Request) -> Response {
    match handle_trigger(&state, req.uri().query()).await {
        Some(response) => response,
        None => "Bot Active".into_response(),
    }
}

/// Router for polling mode: everything lands on the trigger handler.
pub fn trigger_router(state: WebState) -> Router {
    Router::new().route("/", any(trigger_handler)).with_state(state)
}

/// Middleware for webhook mode: intercepts trigger calls on any path
/// before they reach the Telegram update router. A plain GET on the
/// root still answers with the liveness text.
pub async fn trigger_gate(State(state): State<WebState>, req: Request, next: Next) -> Response {
    if let Some(response) = handle_trigger(&state, req.uri().query()).await {
        return response;
    }
    if req.method() == Method::GET && req.uri().path() == "/" {
        return "Bot Active".into_response();
    }
    next.run(req).await
}

/// Start the standalone trigger server (polling mode).
pub async fn start_trigger_server(port: u16, state: WebState) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = trigger_router(state);

    log::info!("Starting trigger server on http://{}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_queries_are_not_triggers() {
        assert!(parse_trigger(None).is_none());
        assert!(parse_trigger(Some("")).is_none());
        assert!(parse_trigger(Some("foo=bar")).is_none());
        assert!(parse_trigger(Some("action=other&secret=x")).is_none());
    }

    #[test]
    fn trigger_query_carries_the_secret() {
        let trigger = parse_trigger(Some("action=check_proxies&secret=s3cret")).expect("trigger");
        assert_eq!(trigger.secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn trigger_without_secret_is_still_a_trigger() {
        let trigger = parse_trigger(Some("action=check_proxies")).expect("trigger");
        assert!(trigger.secret.is_none());
    }

    #[test]
    fn percent_encoded_secrets_are_decoded() {
        let trigger = parse_trigger(Some("action=check_proxies&secret=a%2Bb")).expect("trigger");
        assert_eq!(trigger.secret.as_deref(), Some("a+b"));
    }
}
