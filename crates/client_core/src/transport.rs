//! Real-time transport: STOMP over a WebSocket, re-dialled on loss unless
//! the reconnect delay is zero.
//!
//! The messaging client only talks to the [`TransportConnector`] and
//! [`TransportSession`] traits; [`StompConnector`] is the production
//! implementation.

use std::{
    future::{self, Future},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{ClientError, ClientResult},
    stomp::{
        parse_frames_partial, Command, Frame, HeartBeat, ACCEPT_VERSION, HEARTBEAT_FRAME,
    },
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const DISCONNECT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the CONNECT frame.
    Connected { server: Option<String> },
    /// The connection was lost and a new dial is scheduled.
    Reconnecting,
    Message {
        subscription: SubscriptionId,
        destination: String,
        body: String,
    },
    /// Broker ERROR frame.
    BrokerError { message: String, body: String },
    SocketError(String),
    /// The transport stopped for good.
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: String,
    pub connect_headers: Vec<(String, String)>,
    pub reconnect_delay: Duration,
    pub heartbeat_incoming: Duration,
    pub heartbeat_outgoing: Duration,
}

pub trait TransportConnector: Send + Sync {
    /// Starts a transport generation. Events for that generation are
    /// delivered on `events` until [`TransportEvent::Disconnected`].
    fn activate(
        &self,
        options: TransportOptions,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> ClientResult<Arc<dyn TransportSession>>;
}

#[async_trait]
pub trait TransportSession: Send + Sync {
    /// True from activation until `deactivate`, including while re-dialling.
    fn is_active(&self) -> bool;
    /// True while the broker session is established.
    fn is_connected(&self) -> bool;
    fn subscribe(&self, destination: &str) -> ClientResult<SubscriptionId>;
    fn unsubscribe(&self, subscription: &SubscriptionId) -> ClientResult<()>;
    fn publish(&self, destination: &str, body: String) -> ClientResult<()>;
    async fn deactivate(&self) -> ClientResult<()>;
}

#[derive(Debug, Default, Clone)]
pub struct StompConnector;

impl TransportConnector for StompConnector {
    fn activate(
        &self,
        options: TransportOptions,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> ClientResult<Arc<dyn TransportSession>> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        info!(url = %options.url, "transport: activating");
        let task = tokio::spawn(run_transport(
            options,
            Arc::clone(&connected),
            command_rx,
            events,
        ));
        Ok(Arc::new(StompSession {
            commands,
            active: AtomicBool::new(true),
            connected,
            next_subscription: AtomicU64::new(0),
            task: Mutex::new(Some(task)),
        }))
    }
}

enum Outbound {
    Frame(Frame),
    Shutdown(oneshot::Sender<()>),
}

pub struct StompSession {
    commands: mpsc::UnboundedSender<Outbound>,
    active: AtomicBool,
    connected: Arc<AtomicBool>,
    next_subscription: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StompSession {
    fn send_frame(&self, frame: Frame) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.commands
            .send(Outbound::Frame(frame))
            .map_err(|_| ClientError::Transport("transport task has stopped".into()))
    }
}

#[async_trait]
impl TransportSession for StompSession {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.is_active() && self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self, destination: &str) -> ClientResult<SubscriptionId> {
        let id = SubscriptionId(format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::SeqCst)
        ));
        self.send_frame(
            Frame::new(Command::Subscribe)
                .header("id", id.0.clone())
                .header("destination", destination),
        )?;
        debug!(%id, destination, "transport: subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, subscription: &SubscriptionId) -> ClientResult<()> {
        self.send_frame(Frame::new(Command::Unsubscribe).header("id", subscription.0.clone()))
    }

    fn publish(&self, destination: &str, body: String) -> ClientResult<()> {
        self.send_frame(
            Frame::new(Command::Send)
                .header("destination", destination)
                .header("content-type", "application/json")
                .with_body(body),
        )
    }

    async fn deactivate(&self) -> ClientResult<()> {
        // `connected` is cleared by the task once DISCONNECT is out.
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let delivered = self.commands.send(Outbound::Shutdown(ack_tx)).is_ok();
        let task = self.task.lock().await.take();
        if !delivered {
            return Ok(());
        }

        match time::timeout(SHUTDOWN_TIMEOUT, ack_rx).await {
            Ok(_) => Ok(()),
            Err(_) => {
                if let Some(task) = task {
                    task.abort();
                }
                Err(ClientError::Transport(
                    "timed out waiting for the transport to shut down".into(),
                ))
            }
        }
    }
}

enum DriveEnd {
    Lost,
    Shutdown,
}

async fn run_transport(
    options: TransportOptions,
    connected: Arc<AtomicBool>,
    mut commands: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        match dial(connect_async(options.url.as_str()), &mut commands).await {
            Dial::Open(ws_stream) => {
                debug!(url = %options.url, "transport: websocket open");
                let end = drive(ws_stream, &options, &connected, &mut commands, &events).await;
                connected.store(false, Ordering::SeqCst);
                if let DriveEnd::Shutdown = end {
                    break;
                }
            }
            Dial::Failed(reason) => {
                warn!(url = %options.url, "transport: websocket connect failed: {reason}");
                let _ = events.send(TransportEvent::SocketError(reason));
            }
            Dial::Shutdown => break,
        }

        // A zero delay disables re-dialling.
        if options.reconnect_delay.is_zero() {
            info!(url = %options.url, "transport: reconnect disabled, giving up");
            break;
        }
        let _ = events.send(TransportEvent::Reconnecting);
        info!(
            delay_ms = options.reconnect_delay.as_millis() as u64,
            "transport: reconnect scheduled"
        );
        if !wait_for_redial(options.reconnect_delay, &mut commands).await {
            break;
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Disconnected);
    info!(url = %options.url, "transport: stopped");
}

enum Dial<S> {
    Open(S),
    Failed(String),
    Shutdown,
}

/// Waits for the WebSocket handshake while still honouring shutdown.
async fn dial<S, R>(
    connecting: impl Future<Output = Result<(S, R), WsError>>,
    commands: &mut mpsc::UnboundedReceiver<Outbound>,
) -> Dial<S> {
    let connecting = time::timeout(CONNECT_TIMEOUT, connecting);
    tokio::pin!(connecting);
    loop {
        tokio::select! {
            result = &mut connecting => {
                return match result {
                    Ok(Ok((ws_stream, _))) => Dial::Open(ws_stream),
                    Ok(Err(err)) => Dial::Failed(err.to_string()),
                    Err(_) => Dial::Failed("connect timed out".into()),
                };
            }
            command = commands.recv() => {
                if !handle_offline(command) {
                    return Dial::Shutdown;
                }
            }
        }
    }
}

/// Sleeps out the reconnect delay. Returns false when shutdown was requested.
async fn wait_for_redial(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Outbound>,
) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands.recv() => {
                if !handle_offline(command) {
                    return false;
                }
            }
        }
    }
}

/// Handles a command while no socket is open. Returns false on shutdown.
fn handle_offline(command: Option<Outbound>) -> bool {
    match command {
        Some(Outbound::Frame(frame)) => {
            debug!(command = %frame.command, "transport: dropping frame while offline");
            true
        }
        Some(Outbound::Shutdown(ack)) => {
            let _ = ack.send(());
            false
        }
        None => false,
    }
}

async fn drive<S>(
    ws_stream: S,
    options: &TransportOptions,
    connected: &AtomicBool,
    commands: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> DriveEnd
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut ws_writer, mut ws_reader) = ws_stream.split();
    let ours = HeartBeat::new(options.heartbeat_outgoing, options.heartbeat_incoming);

    let mut connect = Frame::new(Command::Connect)
        .header("accept-version", ACCEPT_VERSION)
        .header("heart-beat", ours.header_value());
    for (name, value) in &options.connect_headers {
        connect = connect.header(name.clone(), value.clone());
    }
    if let Err(err) = ws_writer.send(Message::Text(connect.encode())).await {
        let _ = events.send(TransportEvent::SocketError(err.to_string()));
        return DriveEnd::Lost;
    }

    let mut outgoing: Option<Interval> = None;
    let mut incoming_limit: Option<Duration> = None;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            incoming = ws_reader.next() => {
                last_seen = Instant::now();
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let (frames, bad) = parse_frames_partial(&text);
                        if let Some(err) = bad {
                            warn!(parsed = frames.len(), "transport: dropping unparsable frame: {err}");
                        }
                        for frame in frames {
                            match frame.command {
                                Command::Connected => {
                                    let server = frame
                                        .get("heart-beat")
                                        .and_then(HeartBeat::parse)
                                        .unwrap_or_default();
                                    let agreed = ours.negotiate(&server);
                                    outgoing = (!agreed.send_every.is_zero()).then(|| {
                                        let mut interval = time::interval_at(
                                            Instant::now() + agreed.send_every,
                                            agreed.send_every,
                                        );
                                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                                        interval
                                    });
                                    incoming_limit = (!agreed.receive_every.is_zero())
                                        .then(|| agreed.receive_every * 2);
                                    connected.store(true, Ordering::SeqCst);
                                    info!(
                                        version = frame.get("version").unwrap_or("1.0"),
                                        heartbeat = %agreed.header_value(),
                                        "transport: connected"
                                    );
                                    let _ = events.send(TransportEvent::Connected {
                                        server: frame.get("server").map(str::to_string),
                                    });
                                }
                                Command::Message => {
                                    let Some(subscription) = frame.get("subscription") else {
                                        warn!("transport: MESSAGE without subscription header");
                                        continue;
                                    };
                                    let _ = events.send(TransportEvent::Message {
                                        subscription: SubscriptionId(subscription.to_string()),
                                        destination: frame.get("destination").unwrap_or_default().to_string(),
                                        body: frame.body,
                                    });
                                }
                                Command::Error => {
                                    let message = frame.get("message").unwrap_or("broker error").to_string();
                                    warn!(broker_message = %message, "transport: broker sent ERROR");
                                    let _ = events.send(TransportEvent::BrokerError {
                                        message,
                                        body: frame.body,
                                    });
                                }
                                other => debug!(command = %other, "transport: ignoring frame"),
                            }
                        }
                    }
                    Some(Ok(Message::Close(close))) => {
                        info!(?close, "transport: websocket closed by server");
                        return DriveEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("transport: websocket receive failed: {err}");
                        let _ = events.send(TransportEvent::SocketError(err.to_string()));
                        return DriveEnd::Lost;
                    }
                    None => return DriveEnd::Lost,
                }
            }
            command = commands.recv() => match command {
                Some(Outbound::Frame(frame)) => {
                    if let Err(err) = ws_writer.send(Message::Text(frame.encode())).await {
                        warn!("transport: websocket send failed: {err}");
                        let _ = events.send(TransportEvent::SocketError(err.to_string()));
                        return DriveEnd::Lost;
                    }
                }
                Some(Outbound::Shutdown(ack)) => {
                    close_gracefully(&mut ws_writer, &mut ws_reader, connected).await;
                    let _ = ack.send(());
                    return DriveEnd::Shutdown;
                }
                None => {
                    close_gracefully(&mut ws_writer, &mut ws_reader, connected).await;
                    return DriveEnd::Shutdown;
                }
            },
            _ = next_tick(&mut outgoing) => {
                if let Err(err) = ws_writer.send(Message::Text(HEARTBEAT_FRAME.to_string())).await {
                    warn!("transport: heart-beat send failed: {err}");
                    let _ = events.send(TransportEvent::SocketError(err.to_string()));
                    return DriveEnd::Lost;
                }
            }
            _ = silence(incoming_limit, last_seen) => {
                warn!("transport: no data from broker within the heart-beat window");
                let _ = events.send(TransportEvent::SocketError("heart-beat timeout".into()));
                return DriveEnd::Lost;
            }
        }
    }
}

/// Sends DISCONNECT and waits briefly for its RECEIPT before closing.
async fn close_gracefully<W, R>(ws_writer: &mut W, ws_reader: &mut R, connected: &AtomicBool)
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    if connected.swap(false, Ordering::SeqCst) {
        let receipt = Uuid::new_v4().to_string();
        let disconnect = Frame::new(Command::Disconnect).header("receipt", receipt.clone());
        if ws_writer.send(Message::Text(disconnect.encode())).await.is_ok() {
            let waited = time::timeout(DISCONNECT_RECEIPT_TIMEOUT, async {
                while let Some(Ok(message)) = ws_reader.next().await {
                    let Message::Text(text) = message else { continue };
                    let (frames, _) = parse_frames_partial(&text);
                    if frames.iter().any(|frame| {
                        frame.command == Command::Receipt
                            && frame.get("receipt-id") == Some(receipt.as_str())
                    }) {
                        return;
                    }
                }
            })
            .await;
            if waited.is_err() {
                debug!("transport: no receipt for DISCONNECT");
            }
        }
    }
    let _ = ws_writer.close().await;
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn silence(limit: Option<Duration>, last_seen: Instant) {
    match limit {
        Some(limit) => time::sleep_until(last_seen + limit).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
