//! Streaming views over the messaging client: `listen` and `chat`.

use std::pin::Pin;

use anyhow::Result;
use client_core::{guard::require_login, ClinicClient, ConnectionState};
use shared::protocol::{ChatMessage, NotificationRecord};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, WatchStream},
    Stream, StreamExt,
};
use tracing::warn;

#[derive(Debug)]
enum LiveEvent {
    State(ConnectionState),
    Public(ChatMessage),
    Private(ChatMessage),
    Notification(NotificationRecord),
}

type LiveStream = Pin<Box<dyn Stream<Item = LiveEvent> + Send>>;

fn live_events(client: &ClinicClient) -> LiveStream {
    let messaging = &client.messaging;
    let state = WatchStream::new(messaging.connection_state()).map(LiveEvent::State);
    let public = BroadcastStream::new(messaging.public_chat())
        .filter_map(keep_delivered)
        .map(LiveEvent::Public);
    let private = BroadcastStream::new(messaging.private_chat())
        .filter_map(keep_delivered)
        .map(LiveEvent::Private);
    let notifications = BroadcastStream::new(messaging.notifications())
        .filter_map(keep_delivered)
        .map(LiveEvent::Notification);
    Box::pin(state.merge(public).merge(private).merge(notifications))
}

fn keep_delivered<T>(item: Result<T, BroadcastStreamRecvError>) -> Option<T> {
    match item {
        Ok(value) => Some(value),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "live view fell behind, events dropped");
            None
        }
    }
}

fn print_event(event: &LiveEvent) {
    match event {
        LiveEvent::State(state) => println!("-- connection {state}"),
        LiveEvent::Public(message) => println!("{}", chat_line(message, "all")),
        LiveEvent::Private(message) => println!("{}", chat_line(message, "private")),
        LiveEvent::Notification(record) => {
            println!("!! {}: {}", record.title, record.message);
        }
    }
}

fn chat_line(message: &ChatMessage, scope: &str) -> String {
    let when = message
        .timestamp
        .map(|at| at.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".into());
    format!("[{when}] ({scope}) {}: {}", message.sender, message.content)
}

/// Prints live traffic until Ctrl-C, then leaves the chat cleanly.
pub async fn listen(client: &ClinicClient) -> Result<()> {
    require_login(&client.session).await?;
    let mut events = live_events(client);
    let tasks = client.start();

    match client.notifications.load_page(1).await {
        Ok(()) => println!("{} unread notifications", client.notifications.unread().await),
        Err(err) => println!("{}", err.user_message()),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    client.shutdown().await;
    for task in tasks {
        task.abort();
    }
    Ok(())
}

/// Sends each stdin line as a chat message; `/quit` or end of input leaves.
pub async fn chat(client: &ClinicClient, to: Option<String>) -> Result<()> {
    let user = require_login(&client.session).await?;
    let mut events = live_events(client);
    let tasks = client.start();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    match &to {
        Some(recipient) => println!("Chatting privately with {recipient} as {}", user.email),
        None => println!("Chatting in the public room as {}", user.email),
    }

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim() == "/quit" {
                    break;
                }
                if let Err(err) = client.messaging.send_chat(&line, to.as_deref()).await {
                    println!("{}", err.user_message());
                }
            }
            event = events.next() => match event {
                // Notifications are left to `listen`.
                Some(LiveEvent::Notification(_)) => {}
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    client.shutdown().await;
    for task in tasks {
        task.abort();
    }
    Ok(())
}
