use super::*;

#[test]
fn encodes_send_frame_with_content_length() {
    let frame = Frame::new(Command::Send)
        .header("destination", "/app/chat.public")
        .header("content-type", "application/json")
        .with_body(r#"{"content":"héllo"}"#);

    let encoded = frame.encode();
    assert!(encoded.starts_with("SEND\ndestination:/app/chat.public\n"));
    // byte length, not char count
    assert!(encoded.contains("content-length:20\n"));
    assert!(encoded.ends_with("\n\n{\"content\":\"héllo\"}\0"));
}

#[test]
fn escapes_header_values_except_on_connect() {
    let send = Frame::new(Command::Send).header("x-note", "a:b\nc\\d").encode();
    assert!(send.contains("x-note:a\\cb\\nc\\\\d\n"));

    let connect = Frame::new(Command::Connect)
        .header("Authorization", "Bearer a:b")
        .encode();
    assert!(connect.contains("Authorization:Bearer a:b\n"));
}

#[test]
fn parses_connected_frame_without_unescaping() {
    let frames = parse_frames("CONNECTED\nversion:1.2\nheart-beat:0,0\nserver:x\\cy\n\n\0")
        .expect("parse");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command, Command::Connected);
    assert_eq!(frames[0].get("version"), Some("1.2"));
    assert_eq!(frames[0].get("server"), Some("x\\cy"));
}

#[test]
fn parses_message_and_unescapes_headers() {
    let raw = "MESSAGE\r\nsubscription:sub-0\r\ndestination:/topic/public\r\nx-tag:a\\cb\r\n\r\n{\"sender\":\"a\"}\0";
    let frames = parse_frames(raw).expect("parse");
    let frame = &frames[0];
    assert_eq!(frame.command, Command::Message);
    assert_eq!(frame.get("subscription"), Some("sub-0"));
    assert_eq!(frame.get("x-tag"), Some("a:b"));
    assert_eq!(frame.body, "{\"sender\":\"a\"}");
}

#[test]
fn content_length_allows_embedded_nul() {
    let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
    let frames = parse_frames(raw).expect("parse");
    assert_eq!(frames[0].body, "a\0b");
}

#[test]
fn skips_heartbeats_and_reads_multiple_frames() {
    let raw = "\n\nRECEIPT\nreceipt-id:77\n\n\0\nERROR\nmessage:bad token\n\nDetails\0\n";
    let frames = parse_frames(raw).expect("parse");
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].get("receipt-id"), Some("77"));
    assert_eq!(frames[1].command, Command::Error);
    assert_eq!(frames[1].body, "Details");

    assert!(parse_frames(HEARTBEAT_FRAME).expect("heartbeat").is_empty());
}

#[test]
fn repeated_headers_keep_first_value() {
    let frames = parse_frames("MESSAGE\nfoo:1\nfoo:2\n\n\0").expect("parse");
    assert_eq!(frames[0].get("foo"), Some("1"));
}

#[test]
fn rejects_bad_input() {
    assert_eq!(
        parse_frames("BOGUS\n\n\0"),
        Err(StompError::UnknownCommand("BOGUS".into()))
    );
    assert_eq!(parse_frames("MESSAGE\nfoo:1\n\nno terminator"), Err(StompError::Incomplete));
    assert!(matches!(
        parse_frames("MESSAGE\nnocolon\n\n\0"),
        Err(StompError::MalformedHeader(_))
    ));
    assert!(matches!(
        parse_frames("MESSAGE\nfoo:\\x\n\n\0"),
        Err(StompError::InvalidEscape(_))
    ));
    assert!(matches!(
        parse_frames("MESSAGE\ncontent-length:abc\n\n\0"),
        Err(StompError::InvalidContentLength(_))
    ));
}

#[test]
fn encoded_frames_parse_back() {
    let frame = Frame::new(Command::Subscribe)
        .header("id", "sub-3")
        .header("destination", "/user/queue/notifications");
    let parsed = parse_frames(&frame.encode()).expect("parse");
    assert_eq!(parsed, vec![frame]);
}

#[test]
fn negotiates_heartbeats() {
    let ours = HeartBeat::new(Duration::from_millis(4000), Duration::from_millis(4000));
    assert_eq!(ours.header_value(), "4000,4000");

    let server = HeartBeat::parse("10000,0").expect("parse");
    let agreed = ours.negotiate(&server);
    assert_eq!(agreed.send_every, Duration::ZERO);
    assert_eq!(agreed.receive_every, Duration::from_millis(10000));

    let none = ours.negotiate(&HeartBeat::parse("0,0").expect("parse"));
    assert_eq!(none, HeartBeat::default());

    assert!(HeartBeat::parse("garbage").is_none());
}

#[test]
fn partial_parse_keeps_frames_before_a_bad_one() {
    let raw = "MESSAGE\nsubscription:sub-0\n\n{\"a\":1}\0\nMESSAGE\nnocolon\n\n\0MESSAGE\n\n\0";
    let (frames, err) = parse_frames_partial(raw);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].get("subscription"), Some("sub-0"));
    assert_eq!(frames[0].body, "{\"a\":1}");
    assert_eq!(err, Some(StompError::MalformedHeader("nocolon".into())));

    assert!(parse_frames(raw).is_err());
    let (frames, err) = parse_frames_partial("MESSAGE\n\n\0\nMESSAGE\n\n\0");
    assert_eq!((frames.len(), err), (2, None));
}
