use async_trait::async_trait;
use reqwest::Method;
use shared::{
    domain::NotificationId,
    protocol::{ListResponse, NotificationRecord},
};

use super::{ApiClient, Query};
use crate::{error::ClientResult, notifications::NotificationBackend};

/// Newest first, as the feed expects.
const NOTIFICATION_SORT: &str = "createdAt,desc";

impl ApiClient {
    /// `page` is one-based; the server counts from zero.
    pub async fn notifications_page(
        &self,
        page: u32,
        size: u32,
    ) -> ClientResult<ListResponse<NotificationRecord>> {
        let query: Query = vec![
            ("page", page.saturating_sub(1).to_string()),
            ("size", size.to_string()),
            ("sort", NOTIFICATION_SORT.to_string()),
        ];
        self.get_json("/notifications", &query).await
    }

    pub async fn unread_notifications(&self) -> ClientResult<Vec<NotificationRecord>> {
        self.get_json("/notifications/unread", &Query::new()).await
    }

    pub async fn unread_notification_count(&self) -> ClientResult<u64> {
        self.get_json("/notifications/unread/count", &Query::new())
            .await
    }

    pub async fn mark_notification_read(&self, id: NotificationId) -> ClientResult<()> {
        self.post_action(&format!("/notifications/{id}/read")).await
    }

    pub async fn mark_all_notifications_read(&self) -> ClientResult<()> {
        self.post_action("/notifications/read-all").await
    }

    /// Asks the server to push a test notification to `recipient_email`.
    pub async fn send_test_notification(&self, recipient_email: &str) -> ClientResult<()> {
        let url = self.url("/notifications/test-notification");
        let builder = self
            .request(Method::POST, &url)
            .await
            .query(&[("recipientEmail", recipient_email)]);
        self.execute(builder).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationBackend for ApiClient {
    async fn fetch_page(
        &self,
        page: u32,
        size: u32,
    ) -> ClientResult<ListResponse<NotificationRecord>> {
        self.notifications_page(page, size).await
    }

    async fn unread_count(&self) -> ClientResult<u64> {
        self.unread_notification_count().await
    }

    async fn mark_read(&self, id: NotificationId) -> ClientResult<()> {
        self.mark_notification_read(id).await
    }

    async fn mark_all_read(&self) -> ClientResult<()> {
        self.mark_all_notifications_read().await
    }
}
