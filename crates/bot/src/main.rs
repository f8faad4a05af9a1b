use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::middleware;
use dotenvy::dotenv;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use teloxide::update_listeners::{Polling, UpdateListener};
use tokio::net::TcpListener;
use tokio::time::sleep;

use vlesscore::cloudflare::CfClient;
use vlesscore::{config, init_logger};
use vlesscore::storage::create_pool;

use vlessbot::cli::{Cli, Commands};
use vlessbot::telegram::{self, notify_admin_startup, HandlerDeps, HandlerError};
use vlessbot::web::{self, WebState};

const MAX_DISPATCHER_RETRIES: u32 = 5;
const DISPATCHER_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Panics inside the dispatcher are logged and survived; see
    // run_polling for the restart loop.
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    match cli.command {
        Some(Commands::Run { webhook }) => {
            log::info!("Running bot (webhook: {})", webhook);
            run_bot(webhook).await
        }
        Some(Commands::SetWebhook { url }) => set_webhook(url).await,
        Some(Commands::DeleteWebhook) => delete_webhook().await,
        None => {
            log::info!("No command specified, running bot in polling mode");
            run_bot(false).await
        }
    }
}

async fn set_webhook(url_override: Option<String>) -> Result<()> {
    let bot = telegram::create_bot()?;
    let raw = url_override
        .or_else(|| config::WEBHOOK_URL.clone())
        .ok_or_else(|| anyhow::anyhow!("WEBHOOK_URL is not set"))?;
    let parsed = url::Url::parse(&raw)?;
    bot.set_webhook(parsed.clone()).await?;
    log::info!("Webhook registered at {}", parsed);
    Ok(())
}

async fn delete_webhook() -> Result<()> {
    let bot = telegram::create_bot()?;
    bot.delete_webhook().await?;
    log::info!("Webhook deleted");
    Ok(())
}

async fn run_bot(use_webhook: bool) -> Result<()> {
    log::info!("Starting bot...");

    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );

    let bot = telegram::create_bot()?;

    // Bot API may still be coming up; transient connection errors are
    // retried, a bad token fails fast.
    let bot_info = {
        let startup_max_retries = 12;
        let mut startup_retry = 0;
        loop {
            match bot.get_me().await {
                Ok(info) => break info,
                Err(e) => {
                    let err_str = e.to_string();
                    let is_retryable = err_str.contains("restart")
                        || err_str.contains("network")
                        || err_str.contains("connection")
                        || err_str.contains("timed out")
                        || err_str.contains("Connection refused");

                    startup_retry += 1;
                    if startup_retry >= startup_max_retries || !is_retryable {
                        return Err(anyhow::anyhow!(
                            "Failed to connect to Bot API after {} retries: {}",
                            startup_retry,
                            e
                        ));
                    }

                    log::warn!(
                        "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                        startup_retry,
                        startup_max_retries,
                        err_str
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    };
    log::info!("Bot username: {:?}, Bot ID: {}", bot_info.username, bot_info.id);

    if let Err(e) = telegram::setup_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let deps = HandlerDeps::new(Arc::clone(&db_pool), CfClient::new()?);
    let handler = telegram::schema(deps);

    let web_state = WebState {
        db: Arc::clone(&db_pool),
        bot: bot.clone(),
    };

    let webhook_url = if use_webhook { config::WEBHOOK_URL.clone() } else { None };

    if let Some(raw_url) = webhook_url {
        notify_admin_startup(&bot, "webhook").await;
        run_webhook(bot, handler, web_state, &raw_url).await
    } else {
        notify_admin_startup(&bot, "polling").await;

        // The trigger endpoint gets its own port while updates arrive
        // over long polling.
        let trigger_state = web_state.clone();
        tokio::spawn(async move {
            if let Err(e) = web::start_trigger_server(*config::web::PORT, trigger_state).await {
                log::error!("Trigger server exited: {}", e);
            }
        });

        run_polling(bot, handler).await
    }
}

/// Webhook mode: one axum server carries both the Telegram update
/// route and the monitor trigger (as middleware in front of it).
async fn run_webhook(
    bot: Bot,
    handler: UpdateHandler<HandlerError>,
    web_state: WebState,
    raw_url: &str,
) -> Result<()> {
    let parsed = url::Url::parse(raw_url)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], *config::web::PORT));
    log::info!("Starting bot in webhook mode at {}", parsed);

    // Re-register from a clean state
    let _ = bot.delete_webhook().await;

    let (mut listener, stop_flag, router) =
        webhooks::axum_to_router(bot.clone(), webhooks::Options::new(addr, parsed)).await?;

    let app = router.layer(middleware::from_fn_with_state(web_state, web::trigger_gate));

    let stop_token = listener.stop_token();
    tokio::spawn(async move {
        let tcp = match TcpListener::bind(&addr).await {
            Ok(tcp) => tcp,
            Err(e) => {
                log::error!("Failed to bind webhook server on {}: {}", addr, e);
                stop_token.stop();
                return;
            }
        };
        if let Err(e) = axum::serve(tcp, app).with_graceful_shutdown(stop_flag).await {
            log::error!("Webhook server error: {}", e);
            stop_token.stop();
        }
    });

    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;

    Ok(())
}

/// Long polling mode with the dispatcher retry loop.
async fn run_polling(bot: Bot, handler: UpdateHandler<HandlerError>) -> Result<()> {
    log::info!("Starting bot in long polling mode");

    let mut retry_count: u32 = 0;
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // Run each dispatcher in its own task to isolate panics;
        // "TX is dead" panics are caught via the JoinHandle
        let handle = tokio::spawn(async move {
            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .dependencies(DependencyMap::new())
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    let panic_msg = join_err.to_string();
                    log::error!("Dispatcher panicked: {}", panic_msg);

                    if panic_msg.contains("TX is dead") || panic_msg.contains("SendError") {
                        log::warn!("Detected TX is dead panic - will reconnect...");
                    }

                    if retry_count < MAX_DISPATCHER_RETRIES {
                        retry_count += 1;
                        log::info!(
                            "Restarting dispatcher after panic (attempt {}/{})...",
                            retry_count,
                            MAX_DISPATCHER_RETRIES
                        );
                        sleep(DISPATCHER_RESTART_DELAY).await;
                    } else {
                        log::error!("Max retries reached after panic. Exiting...");
                        break;
                    }
                } else {
                    log::warn!("Dispatcher task was cancelled: {}", join_err);
                    break;
                }
            }
        }
    }

    Ok(())
}
