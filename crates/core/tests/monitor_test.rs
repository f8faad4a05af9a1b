//! Health-check sweep tests.
//!
//! Live endpoints point at a wiremock server, dead ones at an unbound
//! local port; a recording notifier captures exactly what was alerted.
//!
//! Run with: cargo test --test monitor_test

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Mutex;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use vlesscore::error::{AppError, AppResult};
use vlesscore::monitor::{self, CheckReport, Notifier};
use vlesscore::storage::registry::{self, AccountKind};
use vlesscore::storage::{create_pool, get_connection, DbPool};

// Nothing listens on the discard port, so probes fail fast.
const DEAD_HOST: &str = "http://127.0.0.1:9";

struct MonitorTest {
    pool: DbPool,
    account_row_id: i64,
    _dir: TempDir,
}

impl MonitorTest {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("registry.sqlite");
        let pool = create_pool(db_path.to_str().expect("utf8 path")).expect("pool");
        let account_row_id = {
            let conn = get_connection(&pool).expect("conn");
            registry::upsert_account(&conn, "ops@example.com", "Bearer tok-0123456789", "acc-1", AccountKind::Vpn, 1)
                .expect("account")
        };
        Self {
            pool,
            account_row_id,
            _dir: dir,
        }
    }

    fn add_endpoint(&self, subdomain: &str, kind: &str) {
        let conn = get_connection(&self.pool).expect("conn");
        registry::insert_worker(&conn, subdomain, self.account_row_id, "vless-test", kind, "ID", "🇮🇩").expect("worker");
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> AppResult<()> {
        self.messages.lock().await.push(text.to_string());
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _text: &str) -> AppResult<()> {
        Err(AppError::Validation("send failed".to_string()))
    }
}

#[tokio::test]
async fn sweep_alerts_once_per_dead_endpoint() {
    let t = MonitorTest::new();

    let live = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("VLESS Worker is Active"))
        .mount(&live)
        .await;
    // A live worker answering 5xx is still reachable.
    let degraded = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&degraded)
        .await;

    t.add_endpoint(&live.uri(), "vless");
    t.add_endpoint(&degraded.uri(), "vless");
    t.add_endpoint(DEAD_HOST, "vless");
    t.add_endpoint("http://127.0.0.1:2", "vless");

    let notifier = RecordingNotifier::default();
    let http = monitor::probe_client().expect("client");
    let report = monitor::run_checks(&t.pool, &http, Some(&notifier)).await.expect("sweep");

    assert_eq!(
        report,
        CheckReport {
            checked: 4,
            up: 2,
            down: 2,
            alerts_sent: 2,
            alert_failures: 0,
        }
    );

    let messages = notifier.messages.lock().await;
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains(DEAD_HOST));
    assert!(messages[1].contains("http://127.0.0.1:2"));
    assert!(messages.iter().all(|m| m.contains("PROXY DOWN")));
}

#[tokio::test]
async fn sweep_without_notifier_still_reports() {
    let t = MonitorTest::new();
    t.add_endpoint(DEAD_HOST, "vless");

    let http = monitor::probe_client().expect("client");
    let report = monitor::run_checks(&t.pool, &http, None).await.expect("sweep");

    assert_eq!(report.checked, 1);
    assert_eq!(report.down, 1);
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(report.alert_failures, 0);
}

#[tokio::test]
async fn alert_failures_do_not_stop_the_sweep() {
    let t = MonitorTest::new();
    t.add_endpoint(DEAD_HOST, "vless");
    t.add_endpoint("http://127.0.0.1:2", "vless");

    let http = monitor::probe_client().expect("client");
    let report = monitor::run_checks(&t.pool, &http, Some(&FailingNotifier)).await.expect("sweep");

    assert_eq!(report.checked, 2);
    assert_eq!(report.down, 2);
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(report.alert_failures, 2);
}

#[tokio::test]
async fn sweep_ignores_non_proxy_rows_and_empty_registries() {
    let t = MonitorTest::new();
    t.add_endpoint(DEAD_HOST, "archived");

    let http = monitor::probe_client().expect("client");
    let report = monitor::run_checks(&t.pool, &http, None).await.expect("sweep");
    assert_eq!(report, CheckReport::default());
}
