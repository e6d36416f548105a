//! DAP base protocol over tokio byte streams.
//!
//! A message is a header block (`Content-Length` is the only header that
//! matters), a blank line, then exactly that many bytes of JSON.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Bodies larger than this are rejected before any of them is read.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Header lines longer than this are rejected instead of buffered.
const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;

/// Body bytes reserved up front; larger bodies grow the buffer as they arrive.
const INITIAL_BODY_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DapError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dap protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, DapError>;

/// The `type` field every DAP message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

/// An incoming message. Only `kind == Request` is acted upon; responses to
/// reverse requests and stray events still parse so they can be skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn for_request(
        seq: i64,
        request: &Request,
        success: bool,
        body: Option<Value>,
        message: Option<String>,
    ) -> Self {
        Self {
            seq,
            kind: MessageKind::Response,
            request_seq: request.seq,
            success,
            command: request.command.clone(),
            message,
            body,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub seq: i64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            kind: MessageKind::Event,
            event: event.into(),
            body,
        }
    }
}

/// Header state of the message currently being read.
#[derive(Debug, Default)]
struct HeaderBlock {
    started: bool,
    content_length: Option<usize>,
}

impl HeaderBlock {
    /// Feed one header line without its line terminator. Returns `true` once
    /// the blank line closing the block has been seen.
    fn feed(&mut self, line: &[u8]) -> Result<bool> {
        if line.is_empty() {
            // Blank lines before the first header are noise between messages.
            return Ok(self.started);
        }
        self.started = true;

        let line = std::str::from_utf8(line)
            .map_err(|_| DapError::Protocol("header line is not valid UTF-8".to_string()))?;
        let Some((name, value)) = line.split_once(':') else {
            return Ok(false);
        };
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            self.content_length = Some(parse_content_length(value)?);
        }
        Ok(false)
    }

    fn into_content_length(self) -> Result<usize> {
        self.content_length
            .ok_or_else(|| DapError::Protocol("missing Content-Length header".to_string()))
    }
}

fn parse_content_length(value: &str) -> Result<usize> {
    let value = value.trim();
    let len = value
        .parse::<usize>()
        .map_err(|e| DapError::Protocol(format!("invalid Content-Length {value:?}: {e}")))?;
    if len > MAX_MESSAGE_BYTES {
        return Err(DapError::Protocol(format!(
            "Content-Length {len} exceeds the {MAX_MESSAGE_BYTES} byte limit"
        )));
    }
    Ok(len)
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

pub struct DapReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> DapReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: Vec::new(),
        }
    }

    /// Read one message body. Returns `Ok(None)` on a clean EOF between
    /// messages.
    pub async fn read_value(&mut self) -> Result<Option<Value>> {
        let Some(len) = self.read_header_block().await? else {
            return Ok(None);
        };

        let mut body = Vec::with_capacity(len.min(INITIAL_BODY_CAPACITY));
        (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut body)
            .await?;
        if body.len() < len {
            return Err(DapError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {} of {len} body bytes", body.len()),
            )));
        }
        Ok(Some(serde_json::from_slice(&body)?))
    }

    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        let Some(value) = self.read_value().await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Content length of the next message, or `None` at EOF before any header.
    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut block = HeaderBlock::default();
        loop {
            self.line.clear();
            let n = (&mut self.reader)
                .take(MAX_HEADER_LINE_BYTES as u64 + 1)
                .read_until(b'\n', &mut self.line)
                .await?;
            if n == 0 {
                if block.started {
                    return Err(DapError::Protocol(
                        "stream ended inside a header block".to_string(),
                    ));
                }
                return Ok(None);
            }
            if n > MAX_HEADER_LINE_BYTES {
                return Err(DapError::Protocol(format!(
                    "header line longer than {MAX_HEADER_LINE_BYTES} bytes"
                )));
            }

            if block.feed(strip_line_ending(&self.line))? {
                return block.into_content_length().map(Some);
            }
        }
    }
}

pub struct DapWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> DapWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Frame and flush one message.
    pub async fn write_message<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
