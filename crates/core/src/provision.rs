//! Provisioning workflow executors.
//!
//! The conversational layer collects fields one message at a time; the
//! executors here run the remote sequence with its partial-failure
//! semantics: verify, deploy, bind (best effort), persist last. Remote
//! mutations always precede registry writes, so an early failure leaves
//! nothing behind and a late one leaves at most an unregistered script.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::cloudflare::{CfAuth, CfClient, Zone};
use crate::config;
use crate::error::{AppError, AppResult};
use crate::scripts;
use crate::storage::registry::{self, AccountKind, SETTING_MONITOR_CHANNEL, SETTING_MONITOR_SECRET};
use crate::storage::{get_connection, DbPool};

/// Endpoint kind recorded for provisioned proxy workers.
pub const ENDPOINT_KIND: &str = "vless";

/// Validate the collected credential triple into an auth value.
///
/// Empty fields and too-short keys abort the dialogue before any remote
/// call is made.
pub fn validate_credentials(email: &str, api_key: &str, account_id: &str) -> AppResult<CfAuth> {
    let email = email.trim();
    let api_key = api_key.trim();
    let account_id = account_id.trim();

    if email.is_empty() || api_key.is_empty() || account_id.is_empty() {
        return Err(AppError::Validation("email, API key and account id are all required".to_string()));
    }
    if api_key.len() < config::provision::MIN_API_KEY_LEN {
        return Err(AppError::Validation(format!(
            "API key looks too short (minimum {} characters)",
            config::provision::MIN_API_KEY_LEN
        )));
    }

    Ok(CfAuth::new(email, api_key, account_id))
}

/// Timestamp-based fallback when the operator skips the name prompt.
pub fn default_worker_name() -> String {
    format!("vless-{}", Utc::now().timestamp())
}

/// The platform-assigned hostname for a deployed worker.
pub fn default_subdomain(worker_name: &str, account_id: &str) -> String {
    let prefix: String = account_id.chars().take(4).collect();
    format!("{}.{}.workers.dev", worker_name, prefix)
}

/// Pick the worker name from operator input, falling back to the
/// timestamp default on empty input or an explicit `skip`.
pub fn resolve_worker_name(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("skip") {
        default_worker_name()
    } else {
        trimmed.to_string()
    }
}

/// Find the zone owning `hostname` by suffix match against the zone list.
///
/// `vip.example.com` matches the zone `example.com`; an exact equality
/// also matches. Comparison is case-insensitive.
pub fn match_zone<'a>(zones: &'a [Zone], hostname: &str) -> Option<&'a Zone> {
    let host = hostname.trim().trim_end_matches('.').to_lowercase();
    zones
        .iter()
        .find(|zone| host == zone.name || host.ends_with(&format!(".{}", zone.name)))
}

/// Outcome of the optional custom-domain prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainResolution {
    /// Operator skipped; stay on the platform-assigned hostname.
    Default,
    /// Hostname belongs to one of the account's zones.
    Matched { hostname: String, zone_id: String },
    /// Hostname matches no zone: warn and fall back, never abort.
    Unmatched { hostname: String },
}

/// Resolve the operator's domain answer against the cached zone list.
pub fn resolve_domain(zones: &[Zone], input: &str) -> DomainResolution {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() || trimmed == "skip" {
        return DomainResolution::Default;
    }
    match match_zone(zones, &trimmed) {
        Some(zone) => DomainResolution::Matched {
            hostname: trimmed,
            zone_id: zone.id.clone(),
        },
        None => DomainResolution::Unmatched { hostname: trimmed },
    }
}

/// Account verification gate: a zone listing that doubles as the
/// credential check. Failure means nothing has been created yet.
pub async fn verify_account(client: &CfClient, auth: &CfAuth) -> AppResult<Vec<Zone>> {
    let zones = client.list_zones(auth).await?;
    log::info!("Account {} verified ({} zone(s) visible)", auth.account_id, zones.len());
    Ok(zones)
}

/// Chosen custom-domain binding target.
#[derive(Debug, Clone)]
pub struct DomainChoice {
    pub hostname: String,
    pub zone_id: String,
}

/// Everything the proxy executor needs after the dialogue finished.
#[derive(Debug, Clone)]
pub struct ProxyDraft {
    pub auth: CfAuth,
    pub owner_id: i64,
    pub worker_name: String,
    pub domain: Option<DomainChoice>,
}

/// Non-fatal degradation during a deployment, kept structured so the
/// caller decides how to phrase it for the operator.
#[derive(Debug, Clone)]
pub enum ProvisionWarning {
    BindFailed { hostname: String, error: String },
    RouteFailed { pattern: String, error: String },
    ScheduleFailed { error: String },
}

/// Result of a completed proxy deployment.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub endpoint_id: i64,
    pub worker_name: String,
    pub subdomain: String,
    pub country_code: String,
    pub flag: String,
    pub warnings: Vec<ProvisionWarning>,
}

/// Deploy a proxy worker and record it.
///
/// Order is deliberate: upload first (failure aborts with no registry
/// state), then the optional best-effort bind + route, then the single
/// durable write. A bind failure falls back to the default hostname; a
/// route failure keeps the bound hostname. Registry errors after a
/// successful upload leave the remote script unregistered; the caller's
/// error message names the script so the operator can reconcile manually.
pub async fn deploy_proxy(client: &CfClient, pool: &DbPool, draft: &ProxyDraft) -> AppResult<ProvisionOutcome> {
    let mut warnings = Vec::new();

    client
        .upload_script(&draft.auth, &draft.worker_name, scripts::VLESS_WORKER, None)
        .await?;
    log::info!("Deployed worker {} to account {}", draft.worker_name, draft.auth.account_id);

    let mut subdomain = default_subdomain(&draft.worker_name, &draft.auth.account_id);
    let mut country_code = config::provision::DEFAULT_COUNTRY.to_string();
    let mut flag = config::provision::DEFAULT_FLAG.to_string();

    if let Some(domain) = &draft.domain {
        match client
            .bind_custom_domain(&draft.auth, &draft.worker_name, &domain.hostname, &domain.zone_id)
            .await
        {
            Ok(_) => {
                let pattern = format!("*.{}/*", domain.hostname);
                if let Err(e) = client
                    .add_route(&draft.auth, &domain.zone_id, &pattern, &draft.worker_name)
                    .await
                {
                    log::warn!("Wildcard route {} failed for {}: {}", pattern, draft.worker_name, e);
                    warnings.push(ProvisionWarning::RouteFailed {
                        pattern,
                        error: e.to_string(),
                    });
                }
                subdomain = domain.hostname.clone();
                country_code = config::provision::CUSTOM_DOMAIN_COUNTRY.to_string();
                flag = config::provision::CUSTOM_DOMAIN_FLAG.to_string();
            }
            Err(e) => {
                log::warn!("Domain bind failed for {}: {}", draft.worker_name, e);
                warnings.push(ProvisionWarning::BindFailed {
                    hostname: domain.hostname.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let conn = get_connection(pool)?;
    let account_row_id = registry::upsert_account(
        &conn,
        &draft.auth.email,
        &draft.auth.api_key,
        &draft.auth.account_id,
        AccountKind::Vpn,
        draft.owner_id,
    )?;
    let endpoint_id = registry::insert_worker(
        &conn,
        &subdomain,
        account_row_id,
        &draft.worker_name,
        ENDPOINT_KIND,
        &country_code,
        &flag,
    )?;

    Ok(ProvisionOutcome {
        endpoint_id,
        worker_name: draft.worker_name.clone(),
        subdomain,
        country_code,
        flag,
        warnings,
    })
}

/// Everything the feeder executor needs after the dialogue finished.
#[derive(Debug, Clone)]
pub struct FeederDraft {
    pub auth: CfAuth,
    pub owner_id: i64,
    pub channel_id: i64,
    pub target_url: String,
}

/// Result of a completed feeder deployment.
#[derive(Debug, Clone)]
pub struct FeederOutcome {
    pub worker_name: String,
    pub secret: String,
    pub warnings: Vec<ProvisionWarning>,
}

/// Parse the alert channel id answer.
pub fn parse_channel_id(input: &str) -> AppResult<i64> {
    input
        .trim()
        .parse()
        .map_err(|_| AppError::Validation("channel id must be a numeric chat id".to_string()))
}

/// Parse and normalize the trigger URL answer.
pub fn parse_target_url(input: &str) -> AppResult<String> {
    let trimmed = input.trim();
    let parsed = url::Url::parse(trimmed).map_err(|_| AppError::Validation("that is not a valid URL".to_string()))?;
    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(AppError::Validation("the trigger URL must be http(s)".to_string()));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Random alphanumeric shared secret for the trigger gate.
pub fn generate_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Deploy the cron monitor worker to the feeder account.
///
/// Generates a fresh secret, uploads the monitor template with its two
/// env bindings, installs the cron schedule (failure is a warning only:
/// cron quota exhaustion is expected and recoverable by hand), then
/// persists settings and the feeder account.
pub async fn deploy_feeder(client: &CfClient, pool: &DbPool, draft: &FeederDraft) -> AppResult<FeederOutcome> {
    let secret = generate_secret(config::monitor::SECRET_LEN);
    let worker_name = config::monitor::WORKER_NAME;

    let env_vars = vec![
        (scripts::ENV_BOT_API_URL.to_string(), draft.target_url.clone()),
        (scripts::ENV_BOT_SECRET.to_string(), secret.clone()),
    ];
    client
        .upload_script(&draft.auth, worker_name, scripts::MONITOR_WORKER, Some(&env_vars))
        .await?;
    log::info!("Deployed monitor worker to account {}", draft.auth.account_id);

    let mut warnings = Vec::new();
    if let Err(e) = client
        .set_schedule(&draft.auth, worker_name, &[config::monitor::CRON_SCHEDULE])
        .await
    {
        log::warn!("Cron schedule failed for {}: {}", worker_name, e);
        warnings.push(ProvisionWarning::ScheduleFailed { error: e.to_string() });
    }

    let conn = get_connection(pool)?;
    registry::set_setting(&conn, SETTING_MONITOR_SECRET, &secret)?;
    registry::set_setting(&conn, SETTING_MONITOR_CHANNEL, &draft.channel_id.to_string())?;
    registry::upsert_account(
        &conn,
        &draft.auth.email,
        &draft.auth.api_key,
        &draft.auth.account_id,
        AccountKind::Feeder,
        draft.owner_id,
    )?;

    Ok(FeederOutcome {
        worker_name: worker_name.to_string(),
        secret,
        warnings,
    })
}
