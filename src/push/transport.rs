//! Push transport seam and its Server-Sent Events implementation.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// One event as received from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFrame {
    pub event: Option<String>,
    pub data: String,
}

#[async_trait]
pub trait PushConnection: Send {
    /// Next frame; `None` once the server closed the stream.
    async fn next_frame(&mut self) -> Option<SyncResult<PushFrame>>;
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, token: &str) -> SyncResult<Box<dyn PushConnection>>;
}

/// Event-stream client for `{push_url}/{namespace}`.
pub struct SseTransport {
    client: Client,
    url: String,
}

impl SseTransport {
    pub fn new(push_url: &str, namespace: &str) -> SyncResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("patrol_sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/{}",
                push_url.trim_end_matches('/'),
                namespace.trim_matches('/')
            ),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn connect(&self, token: &str) -> SyncResult<Box<dyn PushConnection>> {
        if token.trim().is_empty() {
            return Err(SyncError::NoCredential);
        }
        let url = format!("{}?token={}", self.url, urlencoding::encode(token));
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status { endpoint: self.url.clone(), status: status.as_u16() });
        }
        debug!(url = %self.url, "Event stream opened");

        let stream = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed();
        Ok(Box::new(SseConnection { stream, decoder: SseDecoder::default() }))
    }
}

struct SseConnection {
    stream: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
}

#[async_trait]
impl PushConnection for SseConnection {
    async fn next_frame(&mut self) -> Option<SyncResult<PushFrame>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Some(Ok(frame));
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.decoder.feed(&chunk),
                Some(Err(err)) => return Some(Err(err.into())),
                None => return None,
            }
        }
    }
}

/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;
/// Largest `data` payload accepted for one frame.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Incremental `text/event-stream` decoder. Lines may be split across
/// chunks at any byte. Oversized lines and frames are discarded.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    max_line: usize,
    max_frame: usize,
    /// Remainder of an oversized line is being skipped.
    skipping_line: bool,
    /// Current frame overflowed; it ends at the next blank line.
    skipping_frame: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limits(MAX_LINE_BYTES, MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    pub fn with_limits(max_line: usize, max_frame: usize) -> Self {
        Self {
            buffer: Vec::new(),
            event: None,
            data: Vec::new(),
            data_len: 0,
            max_line,
            max_frame,
            skipping_line: false,
            skipping_frame: false,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        if !self.skipping_line {
            self.buffer.extend_from_slice(bytes);
            return;
        }
        if let Some(end) = bytes.iter().position(|b| *b == b'\n') {
            self.skipping_line = false;
            self.buffer.extend_from_slice(&bytes[end + 1..]);
        }
    }

    pub fn next_frame(&mut self) -> Option<PushFrame> {
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            if raw.len() > self.max_line {
                warn!(bytes = raw.len(), "Event stream line over limit; dropping frame");
                self.drop_frame();
                continue;
            }
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if std::mem::take(&mut self.skipping_frame) || self.data.is_empty() {
                    self.event = None;
                    continue;
                }
                self.data_len = 0;
                return Some(PushFrame {
                    event: self.event.take(),
                    data: std::mem::take(&mut self.data).join("\n"),
                });
            }
            if line.starts_with(':') || self.skipping_frame {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "data" => {
                    self.data_len += value.len() + 1;
                    if self.data_len > self.max_frame {
                        warn!(bytes = self.data_len, "Event stream frame over limit; dropping it");
                        self.drop_frame();
                    } else {
                        self.data.push(value.to_string());
                    }
                }
                "event" => self.event = Some(value.to_string()).filter(|e| !e.is_empty()),
                _ => {}
            }
        }

        if self.buffer.len() > self.max_line {
            warn!(bytes = self.buffer.len(), "Event stream line over limit; dropping frame");
            self.buffer.clear();
            self.skipping_line = true;
            self.drop_frame();
        }
        None
    }

    fn drop_frame(&mut self) {
        self.event = None;
        self.data.clear();
        self.data_len = 0;
        self.skipping_frame = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        decoder.feed(b": keep-alive\n\nevent: newIncident\nda");
        assert_eq!(decoder.next_frame(), None);

        decoder.feed(b"ta: {\"id\":1}\r\n\r\ndata: line one\ndata: line two\n\n");
        assert_eq!(
            decoder.next_frame(),
            Some(PushFrame { event: Some("newIncident".into()), data: "{\"id\":1}".into() })
        );
        assert_eq!(
            decoder.next_frame(),
            Some(PushFrame { event: None, data: "line one\nline two".into() })
        );
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn multibyte_text_survives_chunk_boundary() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: กรุงเทพ\n\n".as_bytes();
        decoder.feed(&bytes[..8]);
        assert_eq!(decoder.next_frame(), None);
        decoder.feed(&bytes[8..]);
        assert_eq!(decoder.next_frame().map(|f| f.data), Some("กรุงเทพ".to_string()));
    }

    #[test]
    fn unterminated_line_is_bounded_and_its_frame_dropped() {
        let mut decoder = SseDecoder::with_limits(16, 64);
        decoder.feed(b"data: ");
        decoder.feed(&[b'x'; 40]);
        assert_eq!(decoder.next_frame(), None);
        assert!(decoder.buffer.is_empty());

        decoder.feed(b"xxxx\n\ndata: ok\n\n");
        assert_eq!(decoder.next_frame().map(|f| f.data), Some("ok".to_string()));
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn oversized_frame_is_dropped_until_blank_line() {
        let mut decoder = SseDecoder::with_limits(64, 32);
        for _ in 0..4 {
            decoder.feed(b"data: 0123456789\n");
        }
        decoder.feed(b"\nevent: notification\ndata: fine\n\n");

        assert_eq!(
            decoder.next_frame(),
            Some(PushFrame { event: Some("notification".into()), data: "fine".into() })
        );
        assert!(decoder.data.is_empty());
    }

    #[tokio::test]
    async fn blank_token_is_refused_without_connecting() {
        let transport = SseTransport::new("http://127.0.0.1:9", "patrol").unwrap();
        assert!(matches!(transport.connect("  ").await, Err(SyncError::NoCredential)));
    }

    #[test]
    fn url_joins_namespace() {
        let transport = SseTransport::new("http://push.local/", "/patrol").unwrap();
        assert_eq!(transport.url(), "http://push.local/patrol");
    }
}
