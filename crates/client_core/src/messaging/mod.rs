//! Real-time messaging client.
//!
//! Owns the single transport handle for the current session, tracks the
//! connection state machine and fans routed payloads into typed broadcast
//! streams. Transport events for one generation are handled by a single
//! pump task, so handlers never run concurrently.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use shared::{
    domain::ChatMessageKind,
    protocol::{ChatMessage, NotificationRecord, PresenceAnnouncement, UserSnapshot},
};
use tokio::{
    sync::{broadcast, mpsc, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::ClientSettings,
    error::{ClientError, ClientResult},
    session::SessionContext,
    transport::{TransportConnector, TransportEvent, TransportOptions, TransportSession},
};

pub mod channels;
pub mod router;

pub use channels::{
    ChannelSink, SubscribeOutcome, BROADCAST_NOTIFICATIONS, DEFAULT_CHANNELS, PRIVATE_CHAT,
    PUBLIC_CHAT, USER_NOTIFICATIONS,
};
use channels::{subscribe_locked, SubscriptionRegistry};
use router::{route, RouteOutcome, RoutedPayload};

pub const JOIN_DESTINATION: &str = "/app/chat.join";
pub const LEAVE_DESTINATION: &str = "/app/chat.leave";
pub const PUBLIC_CHAT_DESTINATION: &str = "/app/chat.public";
pub const PRIVATE_CHAT_DESTINATION: &str = "/app/chat.private";
pub const PRIVATE_NOTIFICATION_DESTINATION: &str = "/app/notification.private";
pub const BROADCAST_NOTIFICATION_DESTINATION: &str = "/app/notification.broadcast";

const STREAM_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        })
    }
}

/// Transport parameters for every generation opened by the client.
#[derive(Debug, Clone)]
pub struct MessagingOptions {
    pub url: String,
    pub reconnect_delay: Duration,
    pub heartbeat_incoming: Duration,
    pub heartbeat_outgoing: Duration,
}

impl MessagingOptions {
    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            url: settings.websocket_url()?,
            reconnect_delay: settings.reconnect_delay,
            heartbeat_incoming: settings.heartbeat_incoming,
            heartbeat_outgoing: settings.heartbeat_outgoing,
        })
    }
}

pub(crate) struct MessagingState {
    transport: Option<Arc<dyn TransportSession>>,
    generation: u64,
    /// Identity captured at connect time for join/leave announcements.
    identity: Option<UserSnapshot>,
    registry: SubscriptionRegistry,
    pump: Option<JoinHandle<()>>,
}

impl MessagingState {
    fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }
}

pub struct MessagingClient {
    connector: Arc<dyn TransportConnector>,
    session: Arc<SessionContext>,
    options: MessagingOptions,
    state_tx: watch::Sender<ConnectionState>,
    public_chat: broadcast::Sender<ChatMessage>,
    private_chat: broadcast::Sender<ChatMessage>,
    notifications: broadcast::Sender<NotificationRecord>,
    inner: Mutex<MessagingState>,
}

impl MessagingClient {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        session: Arc<SessionContext>,
        options: MessagingOptions,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (public_chat, _) = broadcast::channel(STREAM_CAPACITY);
        let (private_chat, _) = broadcast::channel(STREAM_CAPACITY);
        let (notifications, _) = broadcast::channel(STREAM_CAPACITY);
        Arc::new(Self {
            connector,
            session,
            options,
            state_tx,
            public_chat,
            private_chat,
            notifications,
            inner: Mutex::new(MessagingState {
                transport: None,
                generation: 0,
                identity: None,
                registry: SubscriptionRegistry::default(),
                pump: None,
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn public_chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.public_chat.subscribe()
    }

    pub fn private_chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.private_chat.subscribe()
    }

    pub fn notifications(&self) -> broadcast::Receiver<NotificationRecord> {
        self.notifications.subscribe()
    }

    /// Opens a transport generation for the current session. No-op while
    /// connected, connecting, or while a transport is still active.
    pub async fn connect(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        let state = self.state();
        let transport_active = inner
            .transport
            .as_ref()
            .is_some_and(|transport| transport.is_active());
        if matches!(state, ConnectionState::Connected | ConnectionState::Connecting)
            || transport_active
        {
            debug!(%state, transport_active, "messaging: connect skipped");
            return;
        }

        let Some(credentials) = self.session.credentials().await else {
            error!("messaging: cannot connect, token or user missing");
            self.set_state(ConnectionState::Error);
            return;
        };

        info!(user = %credentials.user.email, url = %self.options.url, "messaging: connecting");
        self.set_state(ConnectionState::Connecting);

        inner.generation += 1;
        let generation = inner.generation;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let options = TransportOptions {
            url: self.options.url.clone(),
            connect_headers: vec![(
                "Authorization".to_string(),
                format!("Bearer {}", credentials.token),
            )],
            reconnect_delay: self.options.reconnect_delay,
            heartbeat_incoming: self.options.heartbeat_incoming,
            heartbeat_outgoing: self.options.heartbeat_outgoing,
        };

        match self.connector.activate(options, events_tx) {
            Ok(transport) => {
                inner.transport = Some(transport);
                inner.identity = Some(credentials.user);
                inner.registry.clear();
                inner.pump = Some(tokio::spawn(pump_events(
                    Arc::downgrade(self),
                    generation,
                    events_rx,
                )));
            }
            Err(err) => {
                error!(generation, "messaging: transport activation failed: {err}");
                self.set_state(ConnectionState::Error);
            }
        }
    }

    /// Announces the leave (best effort), tears the transport down and
    /// forces Disconnected whatever the teardown outcome.
    pub async fn disconnect(&self) {
        let (transport, identity, pump) = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;
            inner.registry.clear();
            (
                inner.transport.take(),
                inner.identity.take(),
                inner.pump.take(),
            )
        };

        if let Some(transport) = transport.filter(|transport| transport.is_active()) {
            if let Some(user) = identity {
                let leave = PresenceAnnouncement {
                    sender: user.email,
                    kind: ChatMessageKind::Leave,
                };
                match serde_json::to_string(&leave) {
                    Ok(body) => {
                        if let Err(err) = transport.publish(LEAVE_DESTINATION, body) {
                            warn!("messaging: leave announcement not sent: {err}");
                        }
                    }
                    Err(err) => warn!("messaging: leave announcement not encoded: {err}"),
                }
            }
            if let Err(err) = transport.deactivate().await {
                warn!("messaging: transport teardown failed: {err}");
            }
        }

        if let Some(pump) = pump {
            pump.abort();
        }
        self.set_state(ConnectionState::Disconnected);
        info!("messaging: disconnected");
    }

    /// Follows the session's login signal: connects on login, disconnects on
    /// logout, and connects at once if the session is already logged in.
    pub fn watch_session(self: &Arc<Self>) -> JoinHandle<()> {
        let mut login_state = self.session.login_state();
        let client = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut logged_in = *login_state.borrow_and_update();
            if logged_in {
                let Some(client) = client.upgrade() else {
                    return;
                };
                info!("messaging: session already active, connecting");
                client.connect().await;
            }

            while login_state.changed().await.is_ok() {
                let now = *login_state.borrow_and_update();
                if now == logged_in {
                    continue;
                }
                logged_in = now;
                let Some(client) = client.upgrade() else {
                    break;
                };
                if now {
                    client.connect().await;
                } else {
                    client.disconnect().await;
                }
            }
        })
    }

    /// Publishes `body` as JSON to an application destination.
    pub async fn send_message<T>(&self, destination: &str, body: &T) -> ClientResult<()>
    where
        T: Serialize + ?Sized,
    {
        let transport = self.inner.lock().await.transport.clone();
        let Some(transport) = transport.filter(|transport| transport.is_connected()) else {
            error!(destination, "messaging: cannot send, transport not connected");
            return Err(ClientError::NotConnected);
        };
        let payload = serde_json::to_string(body)?;
        transport.publish(destination, payload)?;
        debug!(destination, "messaging: sent");
        Ok(())
    }

    /// Sends a chat line as the current user; a recipient makes it private.
    pub async fn send_chat(&self, content: &str, recipient: Option<&str>) -> ClientResult<ChatMessage> {
        if content.trim().is_empty() {
            return Err(ClientError::Validation("Message content cannot be empty.".into()));
        }
        let sender = self.sender().await.ok_or(ClientError::NotLoggedIn)?;

        let mut message = ChatMessage::chat(sender, content);
        message.timestamp = Some(Utc::now());
        let destination = match recipient.map(str::trim).filter(|value| !value.is_empty()) {
            Some(recipient) => {
                message = message.to_recipient(recipient);
                PRIVATE_CHAT_DESTINATION
            }
            None => PUBLIC_CHAT_DESTINATION,
        };
        self.send_message(destination, &message).await?;
        Ok(message)
    }

    pub async fn send_notification(&self, notification: &NotificationRecord) -> ClientResult<()> {
        self.send_message(PRIVATE_NOTIFICATION_DESTINATION, notification)
            .await
    }

    pub async fn broadcast_notification(
        &self,
        notification: &NotificationRecord,
    ) -> ClientResult<()> {
        self.send_message(BROADCAST_NOTIFICATION_DESTINATION, notification)
            .await
    }

    async fn sender(&self) -> Option<String> {
        let captured = self
            .inner
            .lock()
            .await
            .identity
            .as_ref()
            .map(|user| user.email.clone());
        match captured {
            Some(email) => Some(email),
            None => self.session.current_user().await.map(|user| user.email),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "messaging: state changed");
        }
    }

    /// Returns false once the generation is finished.
    async fn handle_event(&self, generation: u64, event: TransportEvent) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "messaging: ignoring stale transport event");
            return false;
        }

        match event {
            TransportEvent::Connected { server } => {
                info!(generation, server = server.as_deref().unwrap_or("unknown"), "messaging: connected");
                self.set_state(ConnectionState::Connected);
                for (channel, sink) in DEFAULT_CHANNELS {
                    if let Err(err) = subscribe_locked(&mut inner, channel, sink) {
                        error!(channel, "messaging: subscribe failed: {err}");
                    }
                }
                if let (Some(transport), Some(user)) = (&inner.transport, &inner.identity) {
                    let join = PresenceAnnouncement {
                        sender: user.email.clone(),
                        kind: ChatMessageKind::Join,
                    };
                    let sent = serde_json::to_string(&join)
                        .map_err(ClientError::from)
                        .and_then(|body| transport.publish(JOIN_DESTINATION, body));
                    if let Err(err) = sent {
                        warn!("messaging: join announcement not sent: {err}");
                    }
                }
            }
            TransportEvent::Reconnecting => {
                inner.registry.clear();
                // Error sticks until the broker accepts us again.
                if self.state() != ConnectionState::Error {
                    self.set_state(ConnectionState::Connecting);
                }
            }
            TransportEvent::Message {
                subscription,
                destination,
                body,
            } => {
                let Some((channel, sink)) = inner.registry.lookup(&subscription) else {
                    debug!(%subscription, %destination, "messaging: message for released subscription");
                    return true;
                };
                drop(inner);
                self.dispatch(&channel, sink, &body);
            }
            TransportEvent::BrokerError { message, body } => {
                error!(broker_message = %message, %body, "messaging: broker reported an error");
                self.set_state(ConnectionState::Error);
            }
            TransportEvent::SocketError(err) => {
                error!("messaging: transport error: {err}");
                self.set_state(ConnectionState::Error);
            }
            TransportEvent::Disconnected => {
                info!(generation, "messaging: transport closed");
                inner.registry.clear();
                inner.transport = None;
                inner.pump = None;
                self.set_state(ConnectionState::Disconnected);
                return false;
            }
        }
        true
    }

    fn dispatch(&self, channel: &str, sink: ChannelSink, body: &str) {
        match route(channel, body) {
            RouteOutcome::Delivered(payload) => match (sink, payload) {
                (ChannelSink::PublicChat, RoutedPayload::Chat(message)) => {
                    let _ = self.public_chat.send(message);
                }
                (ChannelSink::PrivateChat, RoutedPayload::Chat(message)) => {
                    let _ = self.private_chat.send(message);
                }
                (ChannelSink::Notifications, RoutedPayload::Notification(record)) => {
                    let _ = self.notifications.send(record);
                }
                (sink, payload) => {
                    warn!(channel, ?sink, ?payload, "messaging: payload kind does not match the channel sink");
                }
            },
            RouteOutcome::Malformed(reason) => {
                warn!(channel, body, "messaging: dropping unparsable payload: {reason}");
            }
            RouteOutcome::ShapeMismatch(expected) => {
                warn!(channel, body, ?expected, "messaging: dropping payload with unexpected shape");
            }
            RouteOutcome::UnknownChannel => {
                warn!(channel, body, "messaging: dropping payload for unhandled channel");
            }
        }
    }
}

async fn pump_events(
    client: Weak<MessagingClient>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(client) = client.upgrade() else {
            break;
        };
        if !client.handle_event(generation, event).await {
            break;
        }
    }
    debug!(generation, "messaging: event pump finished");
}

#[cfg(test)]
#[path = "../tests/messaging_tests.rs"]
mod tests;
