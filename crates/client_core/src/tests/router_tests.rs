use shared::domain::{ChatMessageKind, NotificationId};

use super::*;

#[test]
fn private_chat_payload_is_delivered() {
    let outcome = route("/user/queue/private", r#"{"sender":"a","content":"hi"}"#);
    let RouteOutcome::Delivered(RoutedPayload::Chat(message)) = outcome else {
        panic!("expected chat delivery, got {outcome:?}");
    };
    assert_eq!(message.sender, "a");
    assert_eq!(message.content, "hi");
    assert_eq!(message.kind, ChatMessageKind::Chat);
}

#[test]
fn chat_payload_with_wrong_shape_is_dropped() {
    assert_eq!(
        route("/user/queue/private", r#"{"foo":1}"#),
        RouteOutcome::ShapeMismatch(ChannelClass::Chat)
    );
    assert_eq!(
        route("/topic/public", r#"{"sender":"a","content":7}"#),
        RouteOutcome::ShapeMismatch(ChannelClass::Chat)
    );
    assert_eq!(
        route("/topic/public", r#"["sender","content"]"#),
        RouteOutcome::ShapeMismatch(ChannelClass::Chat)
    );
}

#[test]
fn both_notification_channels_route_to_notifications() {
    for channel in ["/user/queue/notifications", "/topic/notifications"] {
        let outcome = route(
            channel,
            r#"{"id":5,"type":"NEW_MESSAGE","title":"T","message":"M","read":false}"#,
        );
        let RouteOutcome::Delivered(RoutedPayload::Notification(record)) = outcome else {
            panic!("expected notification on {channel}, got {outcome:?}");
        };
        assert_eq!(record.id, Some(NotificationId(5)));
        assert_eq!(record.title, "T");
    }
}

#[test]
fn notification_id_must_be_numeric_when_present() {
    assert_eq!(
        route("/topic/notifications", r#"{"id":"5","title":"T","message":"M"}"#),
        RouteOutcome::ShapeMismatch(ChannelClass::Notification)
    );
    assert!(matches!(
        route("/topic/notifications", r#"{"title":"T","message":"M"}"#),
        RouteOutcome::Delivered(RoutedPayload::Notification(_))
    ));
}

#[test]
fn shape_valid_but_undecodable_payload_is_malformed() {
    assert!(matches!(
        route(
            "/topic/notifications",
            r#"{"title":"T","message":"M","type":"NOT_A_TYPE"}"#
        ),
        RouteOutcome::Malformed(_)
    ));
}

#[test]
fn invalid_json_and_unknown_channels_are_dropped() {
    assert!(matches!(
        route("/topic/public", "not json"),
        RouteOutcome::Malformed(_)
    ));
    assert_eq!(
        route("/topic/other", r#"{"sender":"a","content":"hi"}"#),
        RouteOutcome::UnknownChannel
    );
}

#[test]
fn notifications_rule_wins_over_chat_rule() {
    assert_eq!(
        classify("/user/queue/private-notifications"),
        Some(ChannelClass::Notification)
    );
    assert_eq!(classify("/topic/public"), Some(ChannelClass::Chat));
    assert_eq!(classify("/queue/audit"), None);
}
