use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use teloxide::Bot;
use tokio_util::sync::CancellationToken;

use mrb_core::{
    audit::AuditLogger,
    authz::UserDirectory,
    config::Config,
    intake::FileIntake,
    moderation::ContentModerator,
    pipeline::IngestionPipeline,
    scanner::UrlScanner,
    stats::UsageStats,
    supervisor::RestartLimiter,
};

use mrb_telegram::{
    router::{run_polling, AppState, ChatLocks},
    TelegramMessenger,
};

#[tokio::main]
async fn main() -> Result<(), mrb_core::Error> {
    mrb_core::logging::init("mrb")?;

    let cfg = Arc::new(Config::load()?);
    let shutdown = CancellationToken::new();

    // Ctrl-C flips the shutdown token; every suspended wait in the system
    // (scan settle, reconnect backoff, the dispatcher) observes it.
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let bot = Bot::new(cfg.bot_token.clone());
    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));

    let scan_service = Arc::new(mrb_urlscan::UrlscanClient::new(cfg.urlscan_api_key.clone()));
    let scanner = Arc::new(UrlScanner::new(
        scan_service,
        cfg.scan_settle,
        shutdown.clone(),
    ));

    let gemini = Arc::new(mrb_gemini::GeminiClient::new(cfg.gemini_api_key.clone()));
    let moderator = Arc::new(ContentModerator::new(gemini.clone()));
    let pipeline = Arc::new(IngestionPipeline::new(scanner.clone(), moderator));

    let intake = Arc::new(FileIntake::new(
        messenger.clone(),
        cfg.storage_channel,
        cfg.audit_channel,
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        messenger,
        scanner,
        pipeline,
        intake,
        responder: gemini,
        directory: Arc::new(UserDirectory::new(cfg.owner_id, cfg.admin_id)),
        stats: Arc::new(UsageStats::default()),
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
        chat_locks: Arc::new(ChatLocks::default()),
        shutdown: shutdown.clone(),
    });

    // Whole-loop incarnations are rate limited: a crash loop burns at most
    // `restart_cap` restarts per window, then waits for the rollover.
    let mut limiter = RestartLimiter::new(cfg.restart_cap, cfg.restart_window);

    loop {
        if !limiter.try_restart() {
            let wait = limiter.until_rollover(Instant::now());
            tracing::error!(
                attempts = limiter.attempts_in_window(),
                wait_secs = wait.as_secs(),
                "restart budget exhausted; waiting for window rollover"
            );
            tokio::select! {
                _ = tokio::time::sleep(wait.max(Duration::from_secs(1))) => continue,
                _ = shutdown.cancelled() => break,
            }
        }

        match run_polling(bot.clone(), state.clone()).await {
            Ok(()) => break,
            Err(e) => {
                if shutdown.is_cancelled() {
                    break;
                }
                tracing::error!(error = %e, "bot loop crashed; restarting");
            }
        }
    }

    tracing::info!("bot stopped");
    Ok(())
}
