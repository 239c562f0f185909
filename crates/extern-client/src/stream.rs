use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use url::Url;

use extern_core::errors::StreamError;

/// Text chunks of one connection. An `Err` item ends the connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

/// Opens the long-lived fragment stream.
#[async_trait]
pub trait StreamClient: Send + Sync {
    async fn open(&self, url: &Url) -> Result<ChunkStream, StreamError>;
}

/// Streams a GET response body over reqwest.
pub struct HttpStreamClient {
    client: reqwest::Client,
    idle_timeout: Duration,
}

impl HttpStreamClient {
    pub fn new(idle_timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), idle_timeout)
    }

    pub fn with_client(client: reqwest::Client, idle_timeout: Duration) -> Self {
        Self { client, idle_timeout }
    }
}

#[async_trait]
impl StreamClient for HttpStreamClient {
    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn open(&self, url: &Url) -> Result<ChunkStream, StreamError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::from_status(status.as_u16(), body));
        }

        tracing::debug!(%status, "stream opened");
        let bytes = response
            .bytes_stream()
            .map(|r| r.map_err(|e| StreamError::Interrupted(e.to_string())));
        Ok(Box::pin(TextStream::with_idle_timeout(bytes, self.idle_timeout)))
    }
}

/// Decodes a byte stream into text, reassembling code points split across
/// reads. Ends with [`StreamError::IdleTimeout`] if no data arrives within
/// `idle_duration`.
pub struct TextStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>,
    /// Bytes of an incomplete trailing UTF-8 sequence.
    pending: Vec<u8>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    done: bool,
}

impl TextStream {
    pub fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            pending: Vec::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            done: false,
        }
    }
}

impl Stream for TextStream {
    type Item = Result<String, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(deadline);

                    self.pending.extend_from_slice(&bytes);
                    let text = take_utf8(&mut self.pending);
                    if !text.is_empty() {
                        return Poll::Ready(Some(Ok(text)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if self.pending.is_empty() {
                        return Poll::Ready(None);
                    }
                    let rest = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    return Poll::Ready(Some(Ok(rest)));
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        self.done = true;
                        return Poll::Ready(Some(Err(StreamError::IdleTimeout(self.idle_duration))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Decode the longest complete prefix of `buf`, replacing invalid sequences
/// with U+FFFD. An incomplete sequence at the end stays in `buf`.
fn take_utf8(buf: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(buf) {
            Ok(s) => {
                out.push_str(s);
                buf.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&buf[..valid]));
                match e.error_len() {
                    None => {
                        buf.drain(..valid);
                        return out;
                    }
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        buf.drain(..valid + len);
                    }
                }
            }
        }
    }
}
