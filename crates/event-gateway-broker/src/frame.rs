// File: src/frame.rs
//
// STOMP 1.2 frames and the tokio-util codec that moves them over TCP

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use event_gateway_core::error::GatewayError;

/// Commands this client sends or expects. Artemis accepts LF or CRLF
/// line endings; we emit LF and tolerate both on read.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const SEND: &str = "SEND";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ACK: &str = "ACK";
    pub const NACK: &str = "NACK";
    pub const ERROR: &str = "ERROR";
    pub const RECEIPT: &str = "RECEIPT";
    pub const DISCONNECT: &str = "DISCONNECT";
}

/// One STOMP frame, or the empty line a peer sends as a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompFrame {
    Frame {
        command: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Heartbeat,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        StompFrame::Frame {
            command: command.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        if let StompFrame::Frame { headers, .. } = &mut self {
            headers.push((name.to_string(), value.into()));
        }
        self
    }

    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        if let StompFrame::Frame { body, .. } = &mut self {
            *body = bytes.into();
        }
        self
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            StompFrame::Frame { command, .. } => Some(command),
            StompFrame::Heartbeat => None,
        }
    }

    /// First header with the given name, per the STOMP repeated-header rule.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        match self {
            StompFrame::Frame { headers, .. } => headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            StompFrame::Heartbeat => None,
        }
    }

    pub fn body_text(&self) -> String {
        match self {
            StompFrame::Frame { body, .. } => String::from_utf8_lossy(body).into_owned(),
            StompFrame::Heartbeat => String::new(),
        }
    }
}

/// Header values escape `\` `:` LF CR as `\\` `\c` `\n` `\r`
/// (all frames except CONNECT/CONNECTED).
fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ':' => out.push_str("\\c"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('c') => out.push(':'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Frame codec: `COMMAND LF headers LF LF body NUL`, heartbeats are bare
/// EOLs between frames.
#[derive(Debug, Default)]
pub struct StompCodec;

impl Encoder<StompFrame> for StompCodec {
    type Error = GatewayError;

    fn encode(&mut self, frame: StompFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            StompFrame::Heartbeat => {
                dst.put_u8(b'\n');
                Ok(())
            }
            StompFrame::Frame { command, headers, body } => {
                let plain_headers = command == commands::CONNECT || command == commands::CONNECTED;
                dst.put_slice(command.as_bytes());
                dst.put_u8(b'\n');
                for (name, value) in &headers {
                    if plain_headers {
                        dst.put_slice(name.as_bytes());
                        dst.put_u8(b':');
                        dst.put_slice(value.as_bytes());
                    } else {
                        dst.put_slice(escape_header(name).as_bytes());
                        dst.put_u8(b':');
                        dst.put_slice(escape_header(value).as_bytes());
                    }
                    dst.put_u8(b'\n');
                }
                if !body.is_empty() {
                    dst.put_slice(format!("content-length:{}\n", body.len()).as_bytes());
                }
                dst.put_u8(b'\n');
                dst.put_slice(&body);
                dst.put_u8(b'\0');
                Ok(())
            }
        }
    }
}

impl Decoder for StompCodec {
    type Item = StompFrame;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Bare EOLs between frames are heartbeats
        if let Some(&first) = src.first() {
            if first == b'\n' {
                src.advance(1);
                return Ok(Some(StompFrame::Heartbeat));
            }
            if first == b'\r' && src.len() >= 2 && src[1] == b'\n' {
                src.advance(2);
                return Ok(Some(StompFrame::Heartbeat));
            }
        }

        // Locate the blank line terminating the header section
        let header_end = match find_blank_line(src) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let head = std::str::from_utf8(&src[..header_end.start])
            .map_err(|e| GatewayError::transport(format!("non-UTF8 STOMP header block: {}", e)))?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = match lines.next() {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => return Err(GatewayError::transport("STOMP frame with empty command")),
        };
        let plain_headers = command == commands::CONNECT || command == commands::CONNECTED;

        let mut headers = Vec::new();
        let mut content_length: Option<usize> = None;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                GatewayError::transport(format!("malformed STOMP header line '{}'", line))
            })?;
            let (name, value) = if plain_headers {
                (name.to_string(), value.to_string())
            } else {
                (unescape_header(name), unescape_header(value))
            };
            if name == "content-length" {
                content_length = value.parse().ok();
            }
            headers.push((name, value));
        }

        let body_start = header_end.end;
        let body_end = match content_length {
            Some(len) => {
                // body + trailing NUL
                if src.len() < body_start + len + 1 {
                    return Ok(None);
                }
                body_start + len
            }
            None => match src[body_start..].iter().position(|&b| b == b'\0') {
                Some(offset) => body_start + offset,
                None => return Ok(None),
            },
        };
        if src.len() <= body_end || src[body_end] != b'\0' {
            return if src.len() <= body_end {
                Ok(None)
            } else {
                Err(GatewayError::transport("STOMP body not NUL-terminated"))
            };
        }

        let body = src[body_start..body_end].to_vec();
        src.advance(body_end + 1);
        Ok(Some(StompFrame::Frame { command, headers, body }))
    }
}

struct HeaderEnd {
    /// Offset of the blank line (exclusive end of the header bytes).
    start: usize,
    /// Offset of the first body byte.
    end: usize,
}

fn find_blank_line(src: &BytesMut) -> Option<HeaderEnd> {
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\n' {
            if i + 1 < src.len() && src[i + 1] == b'\n' {
                return Some(HeaderEnd { start: i, end: i + 2 });
            }
            if i + 2 < src.len() && src[i + 1] == b'\r' && src[i + 2] == b'\n' {
                return Some(HeaderEnd { start: i, end: i + 3 });
            }
        }
        i += 1;
    }
    None
}
