//! Cloudflare control-plane client.
//!
//! Thin stateless wrapper over the v4 REST API covering exactly the calls
//! the provisioning workflow and the feeder setup need: script upload,
//! custom-domain binding, route registration, zone listing, cron
//! scheduling, env-binding updates, and DNS record creation.
//!
//! Every response is decoded as the platform envelope
//! `{success, errors, result}`; `success = false` surfaces the platform's
//! own message. There are no retries; callers decide continuation policy.

use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config;
use crate::error::{AppError, AppResult};

/// Credential triple for one Cloudflare account.
///
/// `api_key` is either a Global API Key (paired with `email`) or an API
/// token stored with its `Bearer ` prefix. Treated as an opaque secret:
/// log only [`mask_key`] output, never the raw value.
#[derive(Debug, Clone)]
pub struct CfAuth {
    pub email: String,
    pub api_key: String,
    pub account_id: String,
}

impl CfAuth {
    pub fn new(email: impl Into<String>, api_key: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_key: api_key.into(),
            account_id: account_id.into(),
        }
    }

    /// Token credentials carry their own header; Global API Keys need the
    /// email/key pair. This is a data-driven branch, not negotiation.
    pub fn uses_token_auth(&self) -> bool {
        self.api_key.starts_with("Bearer ")
    }
}

/// Masked rendering of a secret for logs and admin listings.
pub fn mask_key(key: &str) -> String {
    let visible = 4;
    if key.chars().count() <= visible {
        return "****".to_string();
    }
    let head: String = key.chars().take(visible).collect();
    format!("{}…{}", head, "*".repeat(6))
}

/// One zone owned by the account, as returned by `GET /zones`.
#[derive(Debug, Clone, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEntry {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiErrorEntry>,
    #[serde(default)]
    result: Value,
}

/// Decode the platform envelope, surfacing the first reported error
/// message on failure (matching what the dashboard shows the tenant).
fn unwrap_envelope(status: reqwest::StatusCode, body: &str) -> AppResult<Value> {
    let envelope: Envelope = serde_json::from_str(body).map_err(|_| {
        let snippet: String = body.chars().take(200).collect();
        AppError::Cloudflare(format!("unexpected response ({}): {}", status, snippet))
    })?;

    if !envelope.success {
        let message = envelope
            .errors
            .first()
            .map(|e| match e.code {
                Some(code) => format!("{} (code {})", e.message, code),
                None => e.message.clone(),
            })
            .unwrap_or_else(|| format!("request failed with status {}", status));
        return Err(AppError::Cloudflare(message));
    }

    Ok(envelope.result)
}

/// Stateless Cloudflare API client shared by all workflows.
#[derive(Debug, Clone)]
pub struct CfClient {
    http: reqwest::Client,
    base_url: String,
}

impl CfClient {
    /// Client against the configured API base (`CF_API_BASE`).
    pub fn new() -> AppResult<Self> {
        Self::with_base_url(config::CF_API_BASE.clone())
    }

    /// Client against an explicit base URL. Tests point this at a mock
    /// server.
    pub fn with_base_url(base_url: impl Into<String>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config::network::timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn apply_auth(&self, req: RequestBuilder, auth: &CfAuth) -> RequestBuilder {
        if auth.uses_token_auth() {
            req.header(reqwest::header::AUTHORIZATION, &auth.api_key)
        } else {
            req.header("X-Auth-Email", &auth.email).header("X-Auth-Key", &auth.api_key)
        }
    }

    async fn request(&self, method: Method, path: &str, auth: &CfAuth, body: Option<&Value>) -> AppResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.apply_auth(self.http.request(method, &url), auth);
        if let Some(json_body) = body {
            req = req.json(json_body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        unwrap_envelope(status, &text)
    }

    /// Publish (or overwrite) a module worker under the account.
    ///
    /// Uploads multipart metadata + script body; `env_vars` become
    /// plain-text bindings attached at upload time.
    pub async fn upload_script(
        &self,
        auth: &CfAuth,
        worker_name: &str,
        script_source: &str,
        env_vars: Option<&[(String, String)]>,
    ) -> AppResult<Value> {
        let mut metadata = json!({
            "main_module": "index.js",
            "compatibility_date": "2023-01-01",
        });
        if let Some(vars) = env_vars {
            metadata["bindings"] = Value::Array(vars.iter().map(|(name, text)| plain_text_binding(name, text)).collect());
        }

        let form = Form::new()
            .part("metadata", Part::text(metadata.to_string()).mime_str("application/json")?)
            .part(
                "index.js",
                Part::text(script_source.to_string())
                    .file_name("index.js")
                    .mime_str("application/javascript+module")?,
            );

        let url = format!(
            "{}/accounts/{}/workers/scripts/{}",
            self.base_url, auth.account_id, worker_name
        );
        let resp = self.apply_auth(self.http.put(&url), auth).multipart(form).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        unwrap_envelope(status, &text)
    }

    /// Attach a hostname (with TLS) to a deployed worker. The hostname's
    /// parent zone must be owned by the account.
    pub async fn bind_custom_domain(
        &self,
        auth: &CfAuth,
        worker_name: &str,
        hostname: &str,
        zone_id: &str,
    ) -> AppResult<Value> {
        self.request(
            Method::PUT,
            &format!("/accounts/{}/workers/domains", auth.account_id),
            auth,
            Some(&json!({
                "hostname": hostname,
                "service": worker_name,
                "zone_id": zone_id,
            })),
        )
        .await
    }

    /// Register a path-pattern route pointing traffic at a worker.
    pub async fn add_route(&self, auth: &CfAuth, zone_id: &str, pattern: &str, worker_name: &str) -> AppResult<Value> {
        self.request(
            Method::POST,
            &format!("/zones/{}/workers/routes", zone_id),
            auth,
            Some(&json!({
                "pattern": pattern,
                "script": worker_name,
            })),
        )
        .await
    }

    /// List the zones the credentials can see. Used as the account
    /// verification gate and as the domain-match source.
    pub async fn list_zones(&self, auth: &CfAuth) -> AppResult<Vec<Zone>> {
        let result = self.request(Method::GET, "/zones", auth, None).await?;
        serde_json::from_value(result).map_err(|e| AppError::Cloudflare(format!("unexpected zone list payload: {}", e)))
    }

    /// Replace the script's periodic-trigger schedule.
    pub async fn set_schedule(&self, auth: &CfAuth, worker_name: &str, crons: &[&str]) -> AppResult<()> {
        let body = Value::Array(crons.iter().map(|cron| json!({ "cron": cron })).collect());
        self.request(
            Method::PUT,
            &format!("/accounts/{}/workers/scripts/{}/schedules", auth.account_id, worker_name),
            auth,
            Some(&body),
        )
        .await?;
        Ok(())
    }

    /// Patch plain-text bindings without redeploying the script body.
    pub async fn update_env(&self, auth: &CfAuth, worker_name: &str, env_vars: &[(String, String)]) -> AppResult<()> {
        let bindings: Vec<Value> = env_vars.iter().map(|(name, text)| plain_text_binding(name, text)).collect();
        self.request(
            Method::PATCH,
            &format!("/accounts/{}/workers/scripts/{}/settings", auth.account_id, worker_name),
            auth,
            Some(&json!({ "bindings": bindings })),
        )
        .await?;
        Ok(())
    }

    /// Create a DNS record in a zone. Defaults match the wildcard/SNI
    /// setup: a proxied A record pointing at a documentation address.
    pub async fn create_dns_record(
        &self,
        auth: &CfAuth,
        zone_id: &str,
        name: &str,
        content: Option<&str>,
        record_type: Option<&str>,
        proxied: bool,
    ) -> AppResult<Value> {
        self.request(
            Method::POST,
            &format!("/zones/{}/dns_records", zone_id),
            auth,
            Some(&json!({
                "type": record_type.unwrap_or("A"),
                "name": name,
                "content": content.unwrap_or("192.0.2.1"),
                "proxied": proxied,
                "ttl": 1,
            })),
        )
        .await
    }
}

fn plain_text_binding(name: &str, text: &str) -> Value {
    json!({
        "type": "plain_text",
        "name": name,
        "text": text,
    })
}
