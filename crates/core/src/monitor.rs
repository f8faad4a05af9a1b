//! Endpoint health checks.
//!
//! A check sweeps every registered proxy endpoint sequentially: one HTTPS
//! probe per hostname, any response at all counts as up, and each dead
//! endpoint produces exactly one alert through the [`Notifier`]. Probe and
//! alert failures are isolated per endpoint so one bad host never hides
//! the rest of the sweep.

use async_trait::async_trait;

use crate::config;
use crate::error::AppResult;
use crate::provision::ENDPOINT_KIND;
use crate::storage::registry::{self, Worker};
use crate::storage::{get_connection, DbPool};

/// Delivery channel for down alerts. The bot supplies a Telegram-backed
/// implementation; tests record calls.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> AppResult<()>;
}

/// Result of probing a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Up { status: u16 },
    Down { reason: String },
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub checked: usize,
    pub up: usize,
    pub down: usize,
    pub alerts_sent: usize,
    pub alert_failures: usize,
}

/// HTTP client with the short probe timeout applied.
pub fn probe_client() -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config::monitor::probe_timeout())
        .build()?)
}

fn probe_url(host: &str) -> String {
    // Stored hostnames are bare; tolerate an explicit scheme anyway.
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Probe one endpoint. Reachability is the only criterion: a 5xx from a
/// live worker is still up, only a transport failure or timeout is down.
pub async fn probe_endpoint(http: &reqwest::Client, host: &str) -> ProbeOutcome {
    match http.get(probe_url(host)).send().await {
        Ok(response) => ProbeOutcome::Up {
            status: response.status().as_u16(),
        },
        Err(e) => ProbeOutcome::Down { reason: e.to_string() },
    }
}

/// Alert body for a dead endpoint.
pub fn alert_text(worker: &Worker, reason: &str) -> String {
    format!(
        "🔴 PROXY DOWN\n\nHost: {}\nWorker: {}\nError: {}",
        worker.subdomain, worker.worker_name, reason
    )
}

/// Sweep all registered proxy endpoints and alert on the dead ones.
///
/// The endpoint list is snapshotted before the first probe so no registry
/// handle is held across network calls. With no notifier the sweep still
/// runs and reports, it just stays silent.
pub async fn run_checks(pool: &DbPool, http: &reqwest::Client, notifier: Option<&dyn Notifier>) -> AppResult<CheckReport> {
    let workers = {
        let conn = get_connection(pool)?;
        registry::list_workers_by_kind(&conn, ENDPOINT_KIND)?
    };

    let mut report = CheckReport::default();
    for worker in &workers {
        report.checked += 1;
        match probe_endpoint(http, &worker.subdomain).await {
            ProbeOutcome::Up { status } => {
                report.up += 1;
                log::debug!("{} is up ({})", worker.subdomain, status);
            }
            ProbeOutcome::Down { reason } => {
                report.down += 1;
                log::warn!("{} is down: {}", worker.subdomain, reason);
                if let Some(notifier) = notifier {
                    match notifier.notify(&alert_text(worker, &reason)).await {
                        Ok(_) => report.alerts_sent += 1,
                        Err(e) => {
                            report.alert_failures += 1;
                            log::error!("Alert for {} failed: {}", worker.subdomain, e);
                        }
                    }
                }
            }
        }
    }

    log::info!("Health check: {}/{} endpoints up", report.up, report.checked);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_url_adds_scheme_only_when_missing() {
        assert_eq!(probe_url("vless-sg1.abcd.workers.dev"), "https://vless-sg1.abcd.workers.dev");
        assert_eq!(probe_url("http://127.0.0.1:9000"), "http://127.0.0.1:9000");
    }

    #[test]
    fn alert_names_the_endpoint() {
        let worker = Worker {
            id: 7,
            subdomain: "vip.example.com".to_string(),
            account_id: 1,
            worker_name: "vless-sg1".to_string(),
            kind: "vless".to_string(),
            country_code: "US".to_string(),
            flag: "🇺🇸".to_string(),
        };
        let text = alert_text(&worker, "connection timed out");
        assert!(text.contains("vip.example.com"));
        assert!(text.contains("vless-sg1"));
        assert!(text.contains("connection timed out"));
    }
}
