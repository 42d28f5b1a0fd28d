//! Delivery of new notices to the configured chat, tracked by a persisted cursor.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    domain::ChatId,
    formatting::NoticeFormatter,
    messaging::port::MessagingPort,
    notice::Notice,
    store::{CredentialStore, FEED_CURSOR_KEY},
    upstream::UpstreamClient,
    Result,
};

pub const NO_NOTICES_HTML: &str = "<i>No notices available</i>";
pub const NOTICE_UNAVAILABLE_HTML: &str = "<i>Notice unavailable</i>";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedOptions {
    /// Send a "no notices" message when the upstream collection is empty.
    pub notify_when_empty: bool,
    /// Leave the cursor untouched when any delivery in the cycle failed.
    pub hold_cursor_on_failure: bool,
    /// With no cursor stored yet, deliver every current notice instead of none.
    pub deliver_backlog_on_first_run: bool,
}

/// Pushes notices published after the stored cursor, oldest first.
///
/// The cursor is the Unix-millisecond `published_at` of the newest notice seen
/// in the last completed cycle. Edited notices get a newer `published_at` and
/// are delivered again.
pub struct FeedTracker {
    upstream: Arc<UpstreamClient>,
    store: Arc<dyn CredentialStore>,
    messenger: Arc<dyn MessagingPort>,
    formatter: NoticeFormatter,
    chat_id: ChatId,
    options: FeedOptions,
    // Serializes scheduled and manual cycles within this process.
    cycle: Mutex<()>,
}

impl FeedTracker {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        store: Arc<dyn CredentialStore>,
        messenger: Arc<dyn MessagingPort>,
        formatter: NoticeFormatter,
        chat_id: ChatId,
        options: FeedOptions,
    ) -> Self {
        Self {
            upstream,
            store,
            messenger,
            formatter,
            chat_id,
            options,
            cycle: Mutex::new(()),
        }
    }

    /// Run one cycle. Returns how many notices were delivered.
    pub async fn push_new(&self) -> Result<usize> {
        let _cycle = self.cycle.lock().await;

        let notices = self.upstream.notices().await?;
        let Some(newest) = notices.iter().map(|n| n.published_at().timestamp_millis()).max()
        else {
            if self.options.notify_when_empty {
                self.messenger.send_html(self.chat_id, NO_NOTICES_HTML).await?;
            }
            return Ok(0);
        };

        let cursor = self.read_cursor().await?;
        let mut fresh: Vec<&Notice> = match cursor {
            Some(c) => notices
                .iter()
                .filter(|n| n.published_at().timestamp_millis() > c)
                .collect(),
            None if self.options.deliver_backlog_on_first_run => notices.iter().collect(),
            None => {
                info!("no feed cursor stored yet, starting after the newest notice");
                Vec::new()
            }
        };
        fresh.sort_by_key(|n| (n.published_at(), n.id));

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for notice in fresh {
            let html = self.formatter.format(notice);
            match self.messenger.send_html(self.chat_id, &html).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(notice_id = notice.id, error = %e, "failed to deliver notice");
                }
            }
        }

        if failed > 0 && self.options.hold_cursor_on_failure {
            warn!(failed, "keeping feed cursor after delivery failures");
            return Ok(delivered);
        }

        let next = cursor.map_or(newest, |c| c.max(newest));
        if cursor != Some(next) {
            self.store
                .put(FEED_CURSOR_KEY, &next.to_string(), None)
                .await?;
        }

        info!(delivered, failed, cursor = next, "push cycle finished");
        Ok(delivered)
    }

    /// The most recently published notice.
    pub async fn latest(&self) -> Result<Option<Notice>> {
        self.upstream.latest_notice().await
    }

    /// Send the most recent notice regardless of the cursor. Returns whether one existed.
    pub async fn push_latest(&self) -> Result<bool> {
        match self.latest().await? {
            Some(notice) => {
                self.messenger
                    .send_html(self.chat_id, &self.formatter.format(&notice))
                    .await?;
                Ok(true)
            }
            None => {
                self.messenger.send_html(self.chat_id, NO_NOTICES_HTML).await?;
                Ok(false)
            }
        }
    }

    /// Send the notice with `id` to `chat_id`, or a short "unavailable" message.
    pub async fn send_notice(&self, chat_id: ChatId, id: i64) -> Result<bool> {
        match self.upstream.notice(id).await? {
            Some(notice) => {
                self.messenger
                    .send_html(chat_id, &self.formatter.format(&notice))
                    .await?;
                Ok(true)
            }
            None => {
                self.messenger
                    .send_html(chat_id, NOTICE_UNAVAILABLE_HTML)
                    .await?;
                Ok(false)
            }
        }
    }

    async fn read_cursor(&self) -> Result<Option<i64>> {
        let Some(raw) = self.store.get(FEED_CURSOR_KEY).await? else {
            return Ok(None);
        };
        match raw.trim().parse::<i64>() {
            Ok(ms) => Ok(Some(ms)),
            Err(_) => {
                warn!(value = %raw, "ignoring malformed feed cursor");
                Ok(None)
            }
        }
    }
}
