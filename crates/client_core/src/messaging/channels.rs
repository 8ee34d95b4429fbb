use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, warn};

use super::{ConnectionState, MessagingClient, MessagingState};
use crate::{
    error::{ClientError, ClientResult},
    transport::SubscriptionId,
};

pub const PUBLIC_CHAT: &str = "/topic/public";
pub const PRIVATE_CHAT: &str = "/user/queue/private";
pub const USER_NOTIFICATIONS: &str = "/user/queue/notifications";
pub const BROADCAST_NOTIFICATIONS: &str = "/topic/notifications";

/// Channels wired on every confirmed connect.
pub const DEFAULT_CHANNELS: [(&str, ChannelSink); 4] = [
    (PUBLIC_CHAT, ChannelSink::PublicChat),
    (PRIVATE_CHAT, ChannelSink::PrivateChat),
    (USER_NOTIFICATIONS, ChannelSink::Notifications),
    (BROADCAST_NOTIFICATIONS, ChannelSink::Notifications),
];

/// Output stream a channel's payloads are fanned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSink {
    PublicChat,
    PrivateChat,
    Notifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
    /// Not connected yet; retried once on the next Connected transition.
    Deferred,
}

#[derive(Debug, Clone)]
pub(crate) struct Registration {
    pub subscription: SubscriptionId,
    pub sink: ChannelSink,
}

/// At most one live handle per channel name.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    by_channel: HashMap<String, Registration>,
}

impl SubscriptionRegistry {
    pub fn contains(&self, channel: &str) -> bool {
        self.by_channel.contains_key(channel)
    }

    pub fn insert(&mut self, channel: &str, registration: Registration) {
        self.by_channel.insert(channel.to_string(), registration);
    }

    pub fn remove(&mut self, channel: &str) -> Option<Registration> {
        self.by_channel.remove(channel)
    }

    pub fn lookup(&self, subscription: &SubscriptionId) -> Option<(String, ChannelSink)> {
        self.by_channel
            .iter()
            .find(|(_, registration)| &registration.subscription == subscription)
            .map(|(channel, registration)| (channel.clone(), registration.sink))
    }

    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.by_channel.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub fn clear(&mut self) {
        self.by_channel.clear();
    }
}

impl MessagingClient {
    /// Subscribes `channel` into `sink`. Idempotent per channel name. When
    /// not connected the request waits for the next Connected transition
    /// and is retried exactly once.
    pub async fn subscribe_channel(
        self: &Arc<Self>,
        channel: &str,
        sink: ChannelSink,
    ) -> ClientResult<SubscribeOutcome> {
        let mut state_rx = self.state_tx.subscribe();
        {
            let mut inner = self.inner.lock().await;
            if inner.registry.contains(channel) {
                debug!(channel, "messaging: already subscribed");
                return Ok(SubscribeOutcome::AlreadySubscribed);
            }
            if *state_rx.borrow_and_update() == ConnectionState::Connected && inner.is_connected() {
                subscribe_locked(&mut inner, channel, sink)?;
                return Ok(SubscribeOutcome::Subscribed);
            }
        }

        warn!(channel, "messaging: not connected, deferring subscription");
        let client = Arc::downgrade(self);
        let channel = channel.to_string();
        tokio::spawn(async move {
            if state_rx
                .wait_for(|state| *state == ConnectionState::Connected)
                .await
                .is_err()
            {
                return;
            }
            let Some(client) = client.upgrade() else {
                return;
            };
            match client.retry_subscribe(&channel, sink).await {
                Ok(outcome) => debug!(channel = %channel, ?outcome, "messaging: deferred subscription settled"),
                Err(err) => warn!(channel = %channel, "messaging: deferred subscription failed: {err}"),
            }
        });
        Ok(SubscribeOutcome::Deferred)
    }

    async fn retry_subscribe(
        &self,
        channel: &str,
        sink: ChannelSink,
    ) -> ClientResult<SubscribeOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.registry.contains(channel) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }
        if !inner.is_connected() {
            return Err(ClientError::NotConnected);
        }
        subscribe_locked(&mut inner, channel, sink)?;
        Ok(SubscribeOutcome::Subscribed)
    }

    /// Releases the channel's transport subscription. Messages already taken
    /// off the transport may still be delivered.
    pub async fn unsubscribe_channel(&self, channel: &str) {
        let mut inner = self.inner.lock().await;
        let Some(registration) = inner.registry.remove(channel) else {
            warn!(channel, "messaging: no active subscription to remove");
            return;
        };
        if let Some(transport) = &inner.transport {
            if let Err(err) = transport.unsubscribe(&registration.subscription) {
                warn!(channel, "messaging: transport unsubscribe failed: {err}");
            }
        }
        info!(channel, "messaging: unsubscribed");
    }

    /// Channel names with a live subscription, sorted.
    pub async fn subscribed_channels(&self) -> Vec<String> {
        self.inner.lock().await.registry.channels()
    }
}

pub(crate) fn subscribe_locked(
    state: &mut MessagingState,
    channel: &str,
    sink: ChannelSink,
) -> ClientResult<()> {
    if state.registry.contains(channel) {
        return Ok(());
    }
    let transport = state.transport.clone().ok_or(ClientError::NotConnected)?;
    let subscription = transport.subscribe(channel)?;
    info!(channel, %subscription, "messaging: subscribed");
    state
        .registry
        .insert(channel, Registration { subscription, sink });
    Ok(())
}
