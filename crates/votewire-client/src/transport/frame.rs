//! STOMP 1.2 frame codec.
//!
//! ```text
//! COMMAND\n
//! header:value\n
//! \n
//! body\0
//! ```
//!
//! A message consisting only of EOLs is a heart-beat and decodes to `None`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Frame decoding failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Command line is not a STOMP command.
    #[error("unknown STOMP command: {0}")]
    UnknownCommand(String),
    /// Header line without `:` or with an invalid escape.
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    /// `content-length` is not a number or exceeds the payload.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),
    /// Body is not NUL-terminated.
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
    /// Command or header bytes are not UTF-8.
    #[error("frame head is not valid UTF-8")]
    InvalidUtf8,
}

/// Commands exchanged with the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StompCommand {
    /// Client handshake.
    Connect,
    /// Broker handshake reply.
    Connected,
    /// Register interest in a destination.
    Subscribe,
    /// Cancel a subscription.
    Unsubscribe,
    /// Publish to a destination.
    Send,
    /// Broker delivery for a subscription.
    Message,
    /// Broker-reported failure; the broker closes afterwards.
    Error,
    /// Graceful client close.
    Disconnect,
    /// Broker acknowledgement of a `receipt` header.
    Receipt,
}

impl StompCommand {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
            Self::Receipt => "RECEIPT",
        }
    }

    /// CONNECT and CONNECTED headers are not escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for StompCommand {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            "RECEIPT" => Self::Receipt,
            other => return Err(FrameError::UnknownCommand(other.to_owned())),
        })
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order. Repeated keys: the first one wins on lookup.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl Frame {
    /// Empty frame with the given command.
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Builder: append a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Builder: set the body.
    #[must_use]
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value of header `key`.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire bytes. Adds `content-length` when a body is present.
    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (key, value) in &self.headers {
            push_header_part(&mut out, key, escape);
            out.push(b':');
            push_header_part(&mut out, value, escape);
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.get_header("content-length").is_none() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Parse one frame from a transport message. Heart-beats yield `Ok(None)`.
    pub fn decode(input: &[u8]) -> Result<Option<Self>, FrameError> {
        let start = input
            .iter()
            .position(|b| *b != b'\n' && *b != b'\r');
        let Some(start) = start else {
            return Ok(None);
        };
        let mut rest = &input[start..];

        let command_line = take_line(&mut rest)?;
        let command: StompCommand = command_line.parse()?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = take_line(&mut rest)?;
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_owned()))?;
            if escaped {
                headers.push((unescape(key)?, unescape(value)?));
            } else {
                headers.push((key.to_owned(), value.to_owned()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                if rest.len() < len {
                    return Err(FrameError::InvalidContentLength(len.to_string()));
                }
                if rest.get(len).is_some_and(|b| *b != 0) {
                    return Err(FrameError::MissingTerminator);
                }
                rest[..len].to_vec()
            }
            None => {
                let end = rest
                    .iter()
                    .position(|b| *b == 0)
                    .ok_or(FrameError::MissingTerminator)?;
                rest[..end].to_vec()
            }
        };

        Ok(Some(Self {
            command,
            headers,
            body,
        }))
    }
}

/// Take one line (without its EOL) off the front of `rest`.
fn take_line<'a>(rest: &mut &'a [u8]) -> Result<&'a str, FrameError> {
    let pos = rest
        .iter()
        .position(|b| *b == b'\n')
        .ok_or(FrameError::MissingTerminator)?;
    let mut line = &rest[..pos];
    *rest = &rest[pos + 1..];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)
}

fn push_header_part(out: &mut Vec<u8>, s: &str, escape: bool) {
    if !escape {
        out.extend_from_slice(s.as_bytes());
        return;
    }
    for ch in s.chars() {
        match ch {
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            ':' => out.extend_from_slice(b"\\c"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn unescape(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
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
            _ => return Err(FrameError::MalformedHeader(s.to_owned())),
        }
    }
    Ok(out)
}
