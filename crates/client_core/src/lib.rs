use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use storage::Storage;
use tokio::task::JoinHandle;
use tracing::info;

pub mod api;
pub mod config;
pub mod error;
pub mod guard;
pub mod messaging;
pub mod notifications;
pub mod session;
pub mod stomp;
pub mod transport;

pub use api::ApiClient;
pub use config::{load_settings, ClientSettings};
pub use error::{ClientError, ClientResult};
pub use messaging::{ConnectionState, MessagingClient, MessagingOptions};
pub use notifications::{FeedSnapshot, NotificationBackend, NotificationFeed};
pub use session::{Credentials, SessionContext};
pub use transport::{StompConnector, TransportConnector};

/// The session, REST client, messaging client and notification feed wired
/// together over one session store.
pub struct ClinicClient {
    pub settings: ClientSettings,
    pub session: Arc<SessionContext>,
    pub api: ApiClient,
    pub messaging: Arc<MessagingClient>,
    pub notifications: Arc<NotificationFeed>,
}

impl ClinicClient {
    pub async fn open(settings: ClientSettings) -> Result<Self> {
        Self::open_with_connector(settings, Arc::new(StompConnector)).await
    }

    pub async fn open_with_connector(
        settings: ClientSettings,
        connector: Arc<dyn TransportConnector>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build http client")?;
        let storage = Storage::new(&settings.session_db_url).await?;
        storage
            .health_check()
            .await
            .context("session store is not usable")?;
        let session = SessionContext::restore(http.clone(), settings.api_url.clone(), storage)
            .await
            .context("failed to restore session")?;
        let api = ApiClient::new(http, Arc::clone(&session));
        let messaging = MessagingClient::new(
            connector,
            Arc::clone(&session),
            MessagingOptions::from_settings(&settings)?,
        );
        let notifications =
            NotificationFeed::new(Arc::new(api.clone()), settings.notification_page_size);

        info!(api_url = %settings.api_url, "client: ready");
        Ok(Self {
            settings,
            session,
            api,
            messaging,
            notifications,
        })
    }

    /// Starts the session watcher and the live notification follower.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.messaging.watch_session(),
            self.notifications.follow(self.messaging.notifications()),
        ]
    }

    pub async fn shutdown(&self) {
        self.messaging.disconnect().await;
    }
}
