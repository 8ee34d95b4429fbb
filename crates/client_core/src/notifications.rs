//! Notification feed: paged history merged with live pushes, plus the
//! unread counter.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::NotificationId,
    protocol::{ListResponse, NotificationRecord},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Server side of the feed. Pages are one-based.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn fetch_page(
        &self,
        page: u32,
        size: u32,
    ) -> ClientResult<ListResponse<NotificationRecord>>;
    async fn unread_count(&self) -> ClientResult<u64>;
    async fn mark_read(&self, id: NotificationId) -> ClientResult<()>;
    async fn mark_all_read(&self) -> ClientResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Newest first.
    pub records: Vec<NotificationRecord>,
    pub unread: u64,
    pub current_page: u32,
    pub page_size: u32,
    pub total: u64,
    pub loading: bool,
}

impl FeedSnapshot {
    pub fn has_more(&self) -> bool {
        (self.records.len() as u64) < self.total
    }
}

#[derive(Debug, Default)]
struct FeedState {
    records: Vec<NotificationRecord>,
    unread: u64,
    current_page: u32,
    total: u64,
    loading: bool,
}

pub struct NotificationFeed {
    backend: Arc<dyn NotificationBackend>,
    page_size: u32,
    state: Mutex<FeedState>,
}

impl NotificationFeed {
    pub fn new(backend: Arc<dyn NotificationBackend>, page_size: u32) -> Arc<Self> {
        Arc::new(Self {
            backend,
            page_size: page_size.max(1),
            state: Mutex::new(FeedState::default()),
        })
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock().await;
        FeedSnapshot {
            records: state.records.clone(),
            unread: state.unread,
            current_page: state.current_page,
            page_size: self.page_size,
            total: state.total,
            loading: state.loading,
        }
    }

    pub async fn unread(&self) -> u64 {
        self.state.lock().await.unread
    }

    /// Page 1 replaces the list; later pages append. The unread counter is
    /// refreshed from the server after every successful load.
    pub async fn load_page(&self, page: u32) -> ClientResult<()> {
        let page = page.max(1);
        self.state.lock().await.loading = true;
        let fetched = self.backend.fetch_page(page, self.page_size).await;

        {
            let mut state = self.state.lock().await;
            state.loading = false;
            let list = match fetched {
                Ok(list) => list,
                Err(err) => {
                    warn!(page, "notifications: failed to load page: {err}");
                    return Err(err);
                }
            };
            state.total = list.total();
            let items = list.into_items();
            debug!(page, count = items.len(), total = state.total, "notifications: page loaded");
            if page == 1 {
                state.records = items;
            } else {
                state.records.extend(items);
            }
            state.current_page = page;
        }

        self.refresh_unread().await;
        Ok(())
    }

    /// Loads the next page unless a load is running or everything is loaded.
    /// Returns whether a page was requested.
    pub async fn load_more(&self) -> ClientResult<bool> {
        let next = {
            let state = self.state.lock().await;
            if state.loading || (state.records.len() as u64) >= state.total {
                return Ok(false);
            }
            state.current_page + 1
        };
        self.load_page(next).await?;
        Ok(true)
    }

    /// Applies a live push: prepended, counted unread and added to the total.
    pub async fn push_live(&self, record: NotificationRecord) {
        let mut state = self.state.lock().await;
        info!(title = %record.title, "notifications: live notification received");
        state.records.insert(0, record);
        state.unread += 1;
        state.total += 1;
    }

    /// Flips the record only after the server acknowledges it.
    pub async fn mark_as_read(&self, id: NotificationId) -> ClientResult<()> {
        {
            let state = self.state.lock().await;
            let record = state
                .records
                .iter()
                .find(|record| record.id == Some(id))
                .ok_or_else(|| ClientError::NotFound(format!("notification {id}")))?;
            if record.read {
                return Ok(());
            }
        }

        if let Err(err) = self.backend.mark_read(id).await {
            warn!(notification_id = id.0, "notifications: mark as read failed: {err}");
            return Err(err);
        }

        {
            let mut state = self.state.lock().await;
            let mut flipped = false;
            for record in state.records.iter_mut().filter(|record| record.id == Some(id)) {
                if !record.read {
                    record.read = true;
                    flipped = true;
                }
            }
            if flipped {
                state.unread = state.unread.saturating_sub(1);
            }
        }
        self.refresh_unread().await;
        Ok(())
    }

    /// Marks every record read and zeroes the counter once the server agrees.
    pub async fn mark_all_as_read(&self) -> ClientResult<()> {
        if let Err(err) = self.backend.mark_all_read().await {
            warn!("notifications: mark all as read failed: {err}");
            return Err(err);
        }
        let mut state = self.state.lock().await;
        for record in state.records.iter_mut() {
            record.read = true;
        }
        state.unread = 0;
        info!("notifications: all marked read");
        Ok(())
    }

    /// Applies live pushes from `receiver` until the stream closes.
    pub fn follow(self: &Arc<Self>, mut receiver: broadcast::Receiver<NotificationRecord>) -> JoinHandle<()> {
        let feed = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(record) => feed.push_live(record).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notifications: live stream lagged, pushes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn refresh_unread(&self) {
        match self.backend.unread_count().await {
            Ok(count) => self.state.lock().await.unread = count,
            Err(err) => warn!("notifications: failed to refresh unread count: {err}"),
        }
    }
}

#[cfg(test)]
#[path = "tests/notifications_tests.rs"]
mod tests;
