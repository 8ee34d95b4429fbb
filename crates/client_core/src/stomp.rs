//! STOMP 1.2 framing as spoken by the clinic server's message broker.
//!
//! Only the commands a subscribing client needs are modelled. Each WebSocket
//! text message may carry zero or more frames; a bare EOL is a heart-beat.

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";
pub const HEARTBEAT_FRAME: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = StompError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StompError {
    #[error("frame is truncated")]
    Incomplete,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("malformed header line '{0}'")]
    MalformedHeader(String),
    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),
    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins for repeated headers (STOMP 1.2).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Parses every complete frame in `input`, skipping heart-beat EOLs.
/// Any malformed frame fails the whole input.
pub fn parse_frames(input: &str) -> Result<Vec<Frame>, StompError> {
    match parse_frames_partial(input) {
        (frames, None) => Ok(frames),
        (_, Some(err)) => Err(err),
    }
}

/// Like [`parse_frames`], but keeps the frames that precede a malformed one.
/// Parsing stops at the first error, which is returned alongside.
pub fn parse_frames_partial(input: &str) -> (Vec<Frame>, Option<StompError>) {
    let mut pos = 0;
    let mut frames = Vec::new();
    loop {
        match next_frame(input, &mut pos) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => return (frames, None),
            Err(err) => return (frames, Some(err)),
        }
    }
}

fn next_frame(input: &str, pos: &mut usize) -> Result<Option<Frame>, StompError> {
    let bytes = input.as_bytes();
    while *pos < bytes.len() && (bytes[*pos] == b'\n' || bytes[*pos] == b'\r') {
        *pos += 1;
    }
    if *pos >= bytes.len() {
        return Ok(None);
    }
    let mut cursor = *pos;

    let (command_line, next) = read_line(input, cursor)?;
    cursor = next;
    let command: Command = command_line.parse()?;

    let mut headers = Vec::new();
    loop {
        let (line, next) = read_line(input, cursor)?;
        cursor = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| StompError::InvalidContentLength(value.clone()))
        })
        .transpose()?;

    let body_end = match content_length {
        Some(len) => {
            let end = cursor.checked_add(len).ok_or(StompError::Incomplete)?;
            if bytes.get(end) != Some(&0) {
                return Err(StompError::Incomplete);
            }
            end
        }
        None => bytes[cursor..]
            .iter()
            .position(|b| *b == 0)
            .map(|offset| cursor + offset)
            .ok_or(StompError::Incomplete)?,
    };

    let body = input
        .get(cursor..body_end)
        .ok_or(StompError::Incomplete)?
        .to_string();
    *pos = body_end + 1;

    Ok(Some(Frame {
        command,
        headers,
        body,
    }))
}

fn read_line(input: &str, pos: usize) -> Result<(&str, usize), StompError> {
    let rest = input.get(pos..).ok_or(StompError::Incomplete)?;
    let offset = rest.find('\n').ok_or(StompError::Incomplete)?;
    let line = rest[..offset].strip_suffix('\r').unwrap_or(&rest[..offset]);
    Ok((line, pos + offset + 1))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

/// `heart-beat` header value: how often a peer can send, and how often it
/// wants to receive. Zero disables the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub send_every: Duration,
    pub receive_every: Duration,
}

impl HeartBeat {
    pub fn new(send_every: Duration, receive_every: Duration) -> Self {
        Self {
            send_every,
            receive_every,
        }
    }

    pub fn header_value(&self) -> String {
        format!(
            "{},{}",
            self.send_every.as_millis(),
            self.receive_every.as_millis()
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (send, receive) = raw.split_once(',')?;
        Some(Self {
            send_every: Duration::from_millis(send.trim().parse().ok()?),
            receive_every: Duration::from_millis(receive.trim().parse().ok()?),
        })
    }

    /// Intervals this client actually uses after the CONNECTED handshake:
    /// `send_every` for outgoing EOLs, `receive_every` for the liveness check.
    pub fn negotiate(&self, server: &HeartBeat) -> HeartBeat {
        let agree = |ours: Duration, theirs: Duration| {
            if ours.is_zero() || theirs.is_zero() {
                Duration::ZERO
            } else {
                ours.max(theirs)
            }
        };
        HeartBeat {
            send_every: agree(self.send_every, server.receive_every),
            receive_every: agree(self.receive_every, server.send_every),
        }
    }
}

#[cfg(test)]
#[path = "tests/stomp_tests.rs"]
mod tests;
