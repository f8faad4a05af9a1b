//! End-to-end provisioning workflow tests: mock Cloudflare API plus a
//! temp-file registry, asserting what each partial failure leaves behind.
//!
//! Run with: cargo test --test provision_flow_test

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vlesscore::cloudflare::{CfAuth, CfClient};
use vlesscore::provision::{self, DomainChoice, FeederDraft, ProvisionWarning, ProxyDraft};
use vlesscore::storage::registry::{self, AccountKind, SETTING_MONITOR_CHANNEL, SETTING_MONITOR_SECRET};
use vlesscore::storage::{create_pool, get_connection, DbPool};

const ACCOUNT_ID: &str = "abcd1234ef567890";

struct ProvisionTest {
    server: MockServer,
    client: CfClient,
    pool: DbPool,
    _dir: TempDir,
}

impl ProvisionTest {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let client = CfClient::with_base_url(server.uri()).expect("client build");
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("registry.sqlite");
        let pool = create_pool(db_path.to_str().expect("utf8 path")).expect("pool");
        Self {
            server,
            client,
            pool,
            _dir: dir,
        }
    }

    fn auth(&self) -> CfAuth {
        CfAuth::new("ops@example.com", "Bearer test-token-0123456789", ACCOUNT_ID)
    }

    fn proxy_draft(&self, worker_name: &str, domain: Option<DomainChoice>) -> ProxyDraft {
        ProxyDraft {
            auth: self.auth(),
            owner_id: 42,
            worker_name: worker_name.to_string(),
            domain,
        }
    }

    fn counts(&self) -> (i64, i64) {
        let conn = get_connection(&self.pool).expect("conn");
        let accounts = conn
            .query_row("SELECT COUNT(*) FROM cf_accounts", [], |row| row.get(0))
            .expect("account count");
        let workers = conn
            .query_row("SELECT COUNT(*) FROM workers", [], |row| row.get(0))
            .expect("worker count");
        (accounts, workers)
    }
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "errors": [], "result": result }))
}

fn rejected(status: u16, code: u32, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "success": false,
        "errors": [{ "code": code, "message": message }],
        "result": null,
    }))
}

#[tokio::test]
async fn failed_verification_leaves_the_registry_empty() {
    let t = ProvisionTest::new().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(rejected(403, 10000, "Authentication error"))
        .mount(&t.server)
        .await;

    let err = provision::verify_account(&t.client, &t.auth()).await.unwrap_err();
    assert!(err.to_string().contains("Authentication error"));
    assert_eq!(t.counts(), (0, 0));
}

#[tokio::test]
async fn failed_upload_leaves_the_registry_empty() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-sg1", ACCOUNT_ID)))
        .respond_with(rejected(500, 10013, "workers.api.error.script_too_large"))
        .mount(&t.server)
        .await;

    let draft = t.proxy_draft("vless-sg1", None);
    assert!(provision::deploy_proxy(&t.client, &t.pool, &draft).await.is_err());
    assert_eq!(t.counts(), (0, 0));
}

#[tokio::test]
async fn successful_deploy_records_one_account_and_one_endpoint() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-sg1", ACCOUNT_ID)))
        .respond_with(ok(json!({ "id": "vless-sg1" })))
        .expect(1)
        .mount(&t.server)
        .await;

    let draft = t.proxy_draft("vless-sg1", None);
    let outcome = provision::deploy_proxy(&t.client, &t.pool, &draft).await.expect("deploy");

    assert_eq!(outcome.subdomain, "vless-sg1.abcd.workers.dev");
    assert_eq!(outcome.country_code, "ID");
    assert!(outcome.warnings.is_empty());
    assert_eq!(t.counts(), (1, 1));

    let conn = get_connection(&t.pool).expect("conn");
    let account = registry::get_account_by_account_id(&conn, ACCOUNT_ID)
        .expect("query")
        .expect("account row");
    assert_eq!(account.kind, AccountKind::Vpn);
    assert_eq!(account.owner_id, 42);

    let worker = registry::get_worker_by_subdomain(&conn, "vless-sg1.abcd.workers.dev")
        .expect("query")
        .expect("worker row");
    assert_eq!(worker.worker_name, "vless-sg1");
    assert_eq!(worker.account_id, account.id);
}

#[tokio::test]
async fn redeploying_the_same_account_upserts_instead_of_duplicating() {
    let t = ProvisionTest::new().await;
    for name in ["vless-sg1", "vless-sg2"] {
        Mock::given(method("PUT"))
            .and(path(format!("/accounts/{}/workers/scripts/{}", ACCOUNT_ID, name)))
            .respond_with(ok(json!({ "id": name })))
            .mount(&t.server)
            .await;
    }

    provision::deploy_proxy(&t.client, &t.pool, &t.proxy_draft("vless-sg1", None))
        .await
        .expect("first deploy");

    // Same account id, rotated key: the stored credentials must follow.
    let mut second = t.proxy_draft("vless-sg2", None);
    second.auth = CfAuth::new("ops@example.com", "Bearer rotated-token-987654", ACCOUNT_ID);
    provision::deploy_proxy(&t.client, &t.pool, &second)
        .await
        .expect("second deploy");

    assert_eq!(t.counts(), (1, 2));
    let conn = get_connection(&t.pool).expect("conn");
    let account = registry::get_account_by_account_id(&conn, ACCOUNT_ID)
        .expect("query")
        .expect("account row");
    assert_eq!(account.api_key, "Bearer rotated-token-987654");
}

#[tokio::test]
async fn route_failure_keeps_the_bound_hostname() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-sg1", ACCOUNT_ID)))
        .respond_with(ok(json!({})))
        .mount(&t.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/domains", ACCOUNT_ID)))
        .respond_with(ok(json!({})))
        .mount(&t.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/zones/zone-1/workers/routes"))
        .respond_with(rejected(409, 10020, "route already exists"))
        .mount(&t.server)
        .await;

    let domain = DomainChoice {
        hostname: "vip.example.com".to_string(),
        zone_id: "zone-1".to_string(),
    };
    let outcome = provision::deploy_proxy(&t.client, &t.pool, &t.proxy_draft("vless-sg1", Some(domain)))
        .await
        .expect("deploy");

    assert_eq!(outcome.subdomain, "vip.example.com");
    assert_eq!(outcome.country_code, "US");
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(
        &outcome.warnings[0],
        ProvisionWarning::RouteFailed { pattern, .. } if pattern == "*.vip.example.com/*"
    ));

    let conn = get_connection(&t.pool).expect("conn");
    assert!(registry::get_worker_by_subdomain(&conn, "vip.example.com")
        .expect("query")
        .is_some());
}

#[tokio::test]
async fn bind_failure_falls_back_to_the_default_hostname() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-sg1", ACCOUNT_ID)))
        .respond_with(ok(json!({})))
        .mount(&t.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/domains", ACCOUNT_ID)))
        .respond_with(rejected(400, 100117, "hostname not covered by a zone"))
        .mount(&t.server)
        .await;
    // No bind, no route attempt.
    Mock::given(method("POST"))
        .and(path("/zones/zone-1/workers/routes"))
        .respond_with(ok(json!({})))
        .expect(0)
        .mount(&t.server)
        .await;

    let domain = DomainChoice {
        hostname: "vip.example.com".to_string(),
        zone_id: "zone-1".to_string(),
    };
    let outcome = provision::deploy_proxy(&t.client, &t.pool, &t.proxy_draft("vless-sg1", Some(domain)))
        .await
        .expect("deploy");

    assert_eq!(outcome.subdomain, "vless-sg1.abcd.workers.dev");
    assert_eq!(outcome.country_code, "ID");
    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(
        &outcome.warnings[0],
        ProvisionWarning::BindFailed { hostname, .. } if hostname == "vip.example.com"
    ));

    let conn = get_connection(&t.pool).expect("conn");
    assert!(registry::get_worker_by_subdomain(&conn, "vless-sg1.abcd.workers.dev")
        .expect("query")
        .is_some());
    assert!(registry::get_worker_by_subdomain(&conn, "vip.example.com")
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn feeder_deploy_persists_secret_channel_and_account() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-monitor", ACCOUNT_ID)))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&t.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!(
            "/accounts/{}/workers/scripts/vless-monitor/schedules",
            ACCOUNT_ID
        )))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&t.server)
        .await;

    let draft = FeederDraft {
        auth: t.auth(),
        owner_id: 42,
        channel_id: -1001234567890,
        target_url: "https://bot.example.com/api/webhook".to_string(),
    };
    let outcome = provision::deploy_feeder(&t.client, &t.pool, &draft).await.expect("deploy");

    assert_eq!(outcome.secret.len(), 32);
    assert!(outcome.warnings.is_empty());

    let conn = get_connection(&t.pool).expect("conn");
    assert_eq!(
        registry::get_setting(&conn, SETTING_MONITOR_SECRET).expect("query"),
        Some(outcome.secret.clone())
    );
    assert_eq!(
        registry::get_setting(&conn, SETTING_MONITOR_CHANNEL).expect("query"),
        Some("-1001234567890".to_string())
    );
    let account = registry::get_account_by_account_id(&conn, ACCOUNT_ID)
        .expect("query")
        .expect("account row");
    assert_eq!(account.kind, AccountKind::Feeder);
}

#[tokio::test]
async fn schedule_failure_warns_but_still_persists() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-monitor", ACCOUNT_ID)))
        .respond_with(ok(json!({})))
        .mount(&t.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!(
            "/accounts/{}/workers/scripts/vless-monitor/schedules",
            ACCOUNT_ID
        )))
        .respond_with(rejected(400, 10021, "cron trigger quota exceeded"))
        .mount(&t.server)
        .await;

    let draft = FeederDraft {
        auth: t.auth(),
        owner_id: 42,
        channel_id: -100,
        target_url: "https://bot.example.com/api/webhook".to_string(),
    };
    let outcome = provision::deploy_feeder(&t.client, &t.pool, &draft).await.expect("deploy");

    assert_eq!(outcome.warnings.len(), 1);
    assert!(matches!(&outcome.warnings[0], ProvisionWarning::ScheduleFailed { .. }));

    let conn = get_connection(&t.pool).expect("conn");
    assert!(registry::get_setting(&conn, SETTING_MONITOR_SECRET)
        .expect("query")
        .is_some());
}

#[tokio::test]
async fn feeder_redeploy_overwrites_the_stored_secret() {
    let t = ProvisionTest::new().await;
    Mock::given(method("PUT"))
        .and(path(format!("/accounts/{}/workers/scripts/vless-monitor", ACCOUNT_ID)))
        .respond_with(ok(json!({})))
        .mount(&t.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!(
            "/accounts/{}/workers/scripts/vless-monitor/schedules",
            ACCOUNT_ID
        )))
        .respond_with(ok(json!({})))
        .mount(&t.server)
        .await;

    let draft = FeederDraft {
        auth: t.auth(),
        owner_id: 42,
        channel_id: -100,
        target_url: "https://bot.example.com/api/webhook".to_string(),
    };
    let first = provision::deploy_feeder(&t.client, &t.pool, &draft).await.expect("deploy");
    let second = provision::deploy_feeder(&t.client, &t.pool, &draft).await.expect("redeploy");
    assert_ne!(first.secret, second.secret);

    let conn = get_connection(&t.pool).expect("conn");
    assert_eq!(
        registry::get_setting(&conn, SETTING_MONITOR_SECRET).expect("query"),
        Some(second.secret.clone())
    );
    assert_eq!(t.counts(), (1, 0));
}
