use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: database.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "database.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: vlessbot.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "vlessbot.log".to_string()));

/// Public webhook URL for Telegram updates and the monitor trigger
/// Read from WEBHOOK_URL environment variable
pub static WEBHOOK_URL: Lazy<Option<String>> = Lazy::new(|| env::var("WEBHOOK_URL").ok());

/// Cloudflare API base URL
/// Read from CF_API_BASE environment variable (tests point this at a mock)
pub static CF_API_BASE: Lazy<String> = Lazy::new(|| {
    env::var("CF_API_BASE").unwrap_or_else(|_| "https://api.cloudflare.com/client/v4".to_string())
});

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Cloudflare API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Health-check monitor configuration
pub mod monitor {
    use super::Duration;

    /// Per-endpoint reachability probe timeout (in seconds)
    pub const PROBE_TIMEOUT_SECS: u64 = 8;

    /// Probe timeout duration
    pub fn probe_timeout() -> Duration {
        Duration::from_secs(PROBE_TIMEOUT_SECS)
    }

    /// Cron schedule installed on the feeder worker
    pub const CRON_SCHEDULE: &str = "*/5 * * * *";

    /// Script name used for the deployed monitor worker
    pub const WORKER_NAME: &str = "vless-monitor";

    /// Length of the generated shared secret
    pub const SECRET_LEN: usize = 32;
}

/// Provisioning workflow limits and defaults
pub mod provision {
    /// Minimal accepted API key/token length
    pub const MIN_API_KEY_LEN: usize = 16;

    /// Metadata recorded for endpoints on the default workers.dev hostname
    pub const DEFAULT_COUNTRY: &str = "ID";
    pub const DEFAULT_FLAG: &str = "\u{1F1EE}\u{1F1E9}";

    /// Metadata recorded after a successful custom-domain bind
    pub const CUSTOM_DOMAIN_COUNTRY: &str = "US";
    pub const CUSTOM_DOMAIN_FLAG: &str = "\u{1F1FA}\u{1F1F8}";
}

/// Trigger/webhook HTTP server configuration
pub mod web {
    use once_cell::sync::Lazy;
    use std::env;

    /// Port the trigger server listens on
    /// Read from WEB_PORT environment variable
    pub static PORT: Lazy<u16> = Lazy::new(|| {
        env::var("WEB_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000)
    });
}

/// Admin access configuration
pub mod admin {
    use once_cell::sync::Lazy;
    use std::env;

    pub(crate) fn parse_admin_ids(raw: &str) -> Vec<i64> {
        raw.split([',', ' ', '\n', '\t'])
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect()
    }

    /// Admin user IDs (comma-separated)
    /// Read from ADMIN_IDS environment variable
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .ok()
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default()
    });

    /// Admin user ID for direct notifications
    /// Read from ADMIN_USER_ID or fallback to first ADMIN_IDS entry
    /// Defaults to 0 if not set (no admin notifications)
    pub static ADMIN_USER_ID: Lazy<i64> = Lazy::new(|| {
        env::var("ADMIN_USER_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .or_else(|| ADMIN_IDS.first().copied())
            .unwrap_or(0)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_admin_ids_handles_mixed_separators() {
        assert_eq!(
            admin::parse_admin_ids("123, 456\n789\t-1"),
            vec![123, 456, 789, -1]
        );
    }

    #[test]
    fn parse_admin_ids_skips_garbage() {
        assert_eq!(admin::parse_admin_ids("abc, 42, ,"), vec![42]);
    }

    #[test]
    fn probe_timeout_is_eight_seconds() {
        assert_eq!(monitor::probe_timeout(), Duration::from_secs(8));
    }
}
