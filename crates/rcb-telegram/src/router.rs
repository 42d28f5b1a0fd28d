use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::info;

use rcb_core::{
    config::Config,
    domain::ChatId,
    feed::FeedTracker,
    fibapi::FibApi,
    formatting::NoticeFormatter,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    scheduler::PushScheduler,
    store::{CredentialStore, FileStore},
    tokens::TokenManager,
    upstream::UpstreamClient,
};
use rcb_fibapi::FibApiClient;

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub messenger: Arc<dyn MessagingPort>,
    pub upstream: Arc<UpstreamClient>,
    pub feed: Arc<FeedTracker>,
}

impl AppState {
    /// Wire the core services around the given outbound messenger.
    pub fn build(cfg: Arc<Config>, messenger: Arc<dyn MessagingPort>) -> rcb_core::Result<Self> {
        let store: Arc<dyn CredentialStore> = Arc::new(FileStore::new(cfg.store_path.clone()));
        let api: Arc<dyn FibApi> = Arc::new(FibApiClient::from_config(&cfg)?);
        let tokens = Arc::new(TokenManager::new(
            api.clone(),
            store.clone(),
            cfg.access_token_ttl,
        ));
        let upstream = Arc::new(UpstreamClient::new(
            api,
            tokens,
            cfg.login_redirect_url.clone(),
        ));
        let feed = Arc::new(FeedTracker::new(
            upstream.clone(),
            store,
            messenger.clone(),
            NoticeFormatter::from_config(&cfg),
            ChatId(cfg.telegram_user_id),
            cfg.feed_options(),
        ));

        Ok(Self {
            cfg,
            messenger,
            upstream,
            feed,
        })
    }
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!(username = %me.username(), "rcb started");
    }
    info!(store = %cfg.store_path.display(), "using credential store");

    // Batched pushes go through the throttle; the adapter still retries a 429 once.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let state = Arc::new(AppState::build(cfg.clone(), messenger)?);

    let cancel = CancellationToken::new();
    let scheduler = match cfg.push_interval {
        Some(every) => Some(PushScheduler::new(state.feed.clone(), every).spawn(cancel.clone())),
        None => {
            info!("scheduled push disabled; use /push");
            None
        }
    };

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Some(handle) = scheduler {
        let _ = handle.await;
    }
    Ok(())
}
