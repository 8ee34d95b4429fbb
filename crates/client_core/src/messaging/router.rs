//! Classifies inbound payloads by channel name, then by shape.

use serde_json::Value;
use shared::protocol::{ChatMessage, NotificationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    Notification,
    Chat,
}

/// Notification channels are checked first so `/user/queue/notifications`
/// never falls through to the chat rule.
pub fn classify(channel: &str) -> Option<ChannelClass> {
    if channel.contains("notifications") {
        Some(ChannelClass::Notification)
    } else if channel.contains("private") || channel.contains("public") {
        Some(ChannelClass::Chat)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutedPayload {
    Chat(ChatMessage),
    Notification(NotificationRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Delivered(RoutedPayload),
    /// Not JSON, or JSON that passed the shape test but not decoding.
    Malformed(String),
    ShapeMismatch(ChannelClass),
    UnknownChannel,
}

pub fn route(channel: &str, body: &str) -> RouteOutcome {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => return RouteOutcome::Malformed(err.to_string()),
    };

    match classify(channel) {
        Some(ChannelClass::Notification) => {
            if !is_notification_shape(&value) {
                return RouteOutcome::ShapeMismatch(ChannelClass::Notification);
            }
            match serde_json::from_value(value) {
                Ok(record) => RouteOutcome::Delivered(RoutedPayload::Notification(record)),
                Err(err) => RouteOutcome::Malformed(err.to_string()),
            }
        }
        Some(ChannelClass::Chat) => {
            if !is_chat_shape(&value) {
                return RouteOutcome::ShapeMismatch(ChannelClass::Chat);
            }
            match serde_json::from_value(value) {
                Ok(message) => RouteOutcome::Delivered(RoutedPayload::Chat(message)),
                Err(err) => RouteOutcome::Malformed(err.to_string()),
            }
        }
        None => RouteOutcome::UnknownChannel,
    }
}

/// String `title` and `message`; `id`, when present, must be a number.
pub fn is_notification_shape(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let id_ok = match object.get("id") {
        None => true,
        Some(id) => id.is_number(),
    };
    object.get("title").is_some_and(Value::is_string)
        && object.get("message").is_some_and(Value::is_string)
        && id_ok
}

pub fn is_chat_shape(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.get("sender").is_some_and(Value::is_string)
        && object.get("content").is_some_and(Value::is_string)
}

#[cfg(test)]
#[path = "../tests/router_tests.rs"]
mod tests;
