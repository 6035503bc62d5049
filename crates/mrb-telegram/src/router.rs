use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use mrb_core::{
    audit::AuditLogger,
    authz::UserDirectory,
    config::Config,
    intake::FileIntake,
    messaging::MessagingPort,
    pipeline::IngestionPipeline,
    responder::Responder,
    scanner::UrlScanner,
    stats::UsageStats,
    supervisor::{connect_with_retry, RetryPolicy},
};

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub scanner: Arc<UrlScanner>,
    pub pipeline: Arc<IngestionPipeline>,
    pub intake: Arc<FileIntake>,
    pub responder: Arc<dyn Responder>,
    pub directory: Arc<UserDirectory>,
    pub stats: Arc<UsageStats>,
    pub audit: Arc<AuditLogger>,
    pub chat_locks: Arc<ChatLocks>,
    pub shutdown: CancellationToken,
}

/// One in-flight handler per chat: messages within a chat are processed
/// serially, chats run independently.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Run the long-poll retrieval loop.
///
/// Establishing the loop goes through the bounded connect retry; exhausting
/// that budget returns the fatal error to the process owner, who decides
/// whether the restart budget allows another incarnation.
pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    let policy = RetryPolicy {
        max_attempts: state.cfg.connect_max_attempts,
        base_delay: state.cfg.connect_base_delay,
        factor: 2,
    };

    let me = connect_with_retry(policy, &state.shutdown, || {
        let bot = bot.clone();
        async move { bot.get_me().await }
    })
    .await?;

    tracing::info!(username = %me.username(), "bot connected");
    tracing::info!(
        force_sub_channels = state.cfg.force_sub_channels.len(),
        "moderation pipeline active"
    );

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .build();

    tokio::select! {
        _ = dispatcher.dispatch() => {}
        _ = state.shutdown.cancelled() => {
            tracing::info!("shutdown requested; stopping retrieval loop");
        }
    }

    Ok(())
}
