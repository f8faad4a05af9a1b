//! Embedded worker script templates.
//!
//! Shipped inside the binary so a deploy never depends on files next to
//! the executable. The env var names in the monitor template are part of
//! the trigger-endpoint contract.

/// Placeholder VLESS worker uploaded for each provisioned endpoint.
pub const VLESS_WORKER: &str = include_str!("../templates/worker.js");

/// Cron monitor worker uploaded to the feeder account.
pub const MONITOR_WORKER: &str = include_str!("../templates/monitor.js");

/// Env binding on the monitor worker: the bot's trigger URL.
pub const ENV_BOT_API_URL: &str = "BOT_API_URL";

/// Env binding on the monitor worker: the shared trigger secret.
pub const ENV_BOT_SECRET: &str = "BOT_SECRET";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_are_module_workers() {
        assert!(VLESS_WORKER.contains("export default"));
        assert!(MONITOR_WORKER.contains("export default"));
    }

    #[test]
    fn monitor_template_uses_the_contract_env_names() {
        assert!(MONITOR_WORKER.contains(ENV_BOT_API_URL));
        assert!(MONITOR_WORKER.contains(ENV_BOT_SECRET));
        assert!(MONITOR_WORKER.contains("action=check_proxies"));
    }
}
