//! STOMP 1.2 frame model and text codec for the realtime chat transport.
//!
//! This crate owns the wire representation spoken between `chatsync` and the
//! message broker. Frames travel as WebSocket text messages: a command line,
//! `key:value` header lines, a blank line, the body and a trailing NUL.
//! Bare end-of-line messages are heart-beats and carry no frame.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Header naming the destination of a SEND/SUBSCRIBE/MESSAGE frame.
pub const HEADER_DESTINATION: &str = "destination";
/// Header carrying the subscription id on SUBSCRIBE/UNSUBSCRIBE/MESSAGE frames.
pub const HEADER_ID: &str = "id";
/// Header on MESSAGE frames naming the subscription that matched.
pub const HEADER_SUBSCRIPTION: &str = "subscription";
/// Byte length of the body.
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
/// MIME type of the body.
pub const HEADER_CONTENT_TYPE: &str = "content-type";
/// Short error description on ERROR frames.
pub const HEADER_MESSAGE: &str = "message";

const NUL: char = '\0';

/// Error returned by [`decode_frame`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// The input held nothing but line endings.
    #[error("empty frame")]
    Empty,
    /// The command line did not name a known STOMP command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    /// A header line had no `:` separator.
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    /// A header contained a backslash escape outside the STOMP 1.2 set.
    #[error("invalid header escape in: {0}")]
    InvalidEscape(String),
    /// `content-length` was not a number or pointed past the input.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    /// The frame was not terminated by a NUL octet.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
}

/// STOMP frame command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    /// Wire spelling of the command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    fn parse(raw: &str) -> Result<Self, CodecError> {
        let command = match raw {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(CodecError::UnknownCommand(other.to_owned())),
        };
        Ok(command)
    }

    /// CONNECT and CONNECTED headers are exempt from escaping.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
///
/// Headers keep their wire order. Repeated header names are legal on the
/// wire; lookups return the first occurrence as STOMP 1.2 requires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    // =========================================================================
    // CLIENT FRAMES
    // =========================================================================

    /// CONNECT frame for the given virtual host. Extra headers (credentials,
    /// heart-beat) are appended in order.
    #[must_use]
    pub fn connect(host: &str, extra: &[(&str, &str)]) -> Self {
        let mut frame = Self::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host);
        for (k, v) in extra {
            frame = frame.with_header(*k, *v);
        }
        frame
    }

    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header(HEADER_ID, id)
            .with_header(HEADER_DESTINATION, destination)
            .with_header("ack", "auto")
    }

    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header(HEADER_ID, id)
    }

    /// SEND frame carrying a JSON body.
    #[must_use]
    pub fn send(destination: &str, body: impl Into<String>) -> Self {
        Self::new(Command::Send)
            .with_header(HEADER_DESTINATION, destination)
            .with_header(HEADER_CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    #[must_use]
    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }
}

/// `true` when the text is a heart-beat (only EOLs, possibly empty).
#[must_use]
pub fn is_heartbeat(text: &str) -> bool {
    text.chars().all(|c| c == '\n' || c == '\r')
}

/// Encode a frame into its text wire form, NUL included.
///
/// A `content-length` header is added for non-empty bodies unless the frame
/// already carries one.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    let escape = frame.command.escapes_headers();
    let mut out = String::with_capacity(64 + frame.body.len());
    out.push_str(frame.command.as_str());
    out.push('\n');
    for (k, v) in &frame.headers {
        push_header(&mut out, k, v, escape);
    }
    if !frame.body.is_empty() && frame.header(HEADER_CONTENT_LENGTH).is_none() {
        push_header(&mut out, HEADER_CONTENT_LENGTH, &frame.body.len().to_string(), false);
    }
    out.push('\n');
    out.push_str(&frame.body);
    out.push(NUL);
    out
}

/// Decode one frame from its text wire form.
///
/// Leading EOLs (heart-beats preceding the frame) are skipped and both LF
/// and CRLF line endings are accepted.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first structural problem found.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Err(CodecError::Empty);
    }

    let (command_line, mut rest) = split_line(text).ok_or(CodecError::MissingTerminator)?;
    let command = Command::parse(command_line)?;
    let unescape_headers = command.escapes_headers();

    let mut headers = Vec::new();
    loop {
        let (line, after) = split_line(rest).ok_or(CodecError::MissingTerminator)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader(line.to_owned()))?;
        if unescape_headers {
            headers.push((unescape(key)?, unescape(value)?));
        } else {
            headers.push((key.to_owned(), value.to_owned()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == HEADER_CONTENT_LENGTH)
        .map(|(_, v)| v.clone());

    let body = match content_length {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| CodecError::InvalidContentLength(raw.clone()))?;
            let body = rest
                .get(..len)
                .ok_or_else(|| CodecError::InvalidContentLength(raw.clone()))?;
            if !rest[len..].starts_with(NUL) {
                return Err(CodecError::MissingTerminator);
            }
            body
        }
        None => {
            let end = rest.find(NUL).ok_or(CodecError::MissingTerminator)?;
            &rest[..end]
        }
    };

    Ok(Frame { command, headers, body: body.to_owned() })
}

// =============================================================================
// HELPERS
// =============================================================================

fn split_line(text: &str) -> Option<(&str, &str)> {
    let idx = text.find('\n')?;
    let line = text[..idx].strip_suffix('\r').unwrap_or(&text[..idx]);
    Some((line, &text[idx + 1..]))
}

fn push_header(out: &mut String, key: &str, value: &str, escape: bool) {
    if escape {
        escape_into(out, key);
        out.push(':');
        escape_into(out, value);
    } else {
        out.push_str(key);
        out.push(':');
        out.push_str(value);
    }
    out.push('\n');
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(CodecError::InvalidEscape(raw.to_owned())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
