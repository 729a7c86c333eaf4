use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use client_logging::{client_debug, client_warn};

use crate::event::ChannelEvent;
use crate::sse::SseDecoder;
use crate::{ChannelError, ClientSettings};

/// Factory for one push-channel subscription per job attempt. Opening the
/// channel is what starts the job server-side; there is no separate call.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn open(&self, selector: &str) -> Result<Box<dyn EventSubscription>, ChannelError>;
}

/// A lazy, finite, non-restartable sequence of typed events for one attempt.
#[async_trait]
pub trait EventSubscription: Send {
    /// Next event, or `None` once the stream is exhausted or closed.
    async fn next(&mut self) -> Option<ChannelEvent>;
    /// Stops the subscription; further `next` calls return `None`.
    fn close(&mut self);
}

/// Server-sent-events channel over the `scrape` endpoint.
pub struct SseEventChannel {
    settings: ClientSettings,
}

impl SseEventChannel {
    pub fn new(settings: ClientSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, ChannelError> {
        // Connect timeout only: the stream stays open as long as the job runs.
        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .build()
            .map_err(|err| ChannelError::Network(err.to_string()))
    }
}

#[async_trait]
impl EventChannel for SseEventChannel {
    async fn open(&self, selector: &str) -> Result<Box<dyn EventSubscription>, ChannelError> {
        let mut url = self
            .settings
            .endpoint("scrape")
            .map_err(|err| ChannelError::InvalidUrl(err.to_string()))?;
        url.query_pairs_mut().append_pair("area_id", selector);

        let client = self.build_client()?;
        let response = client
            .get(url.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_event_stream(&content_type) {
            return Err(ChannelError::UnsupportedContentType(content_type));
        }

        client_debug!("event stream open for selector {}", selector);
        Ok(Box::new(SseSubscription {
            stream: Some(response.bytes_stream().boxed()),
            decoder: SseDecoder::new(),
        }))
    }
}

type ByteStream = BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>;

struct SseSubscription {
    stream: Option<ByteStream>,
    decoder: SseDecoder,
}

#[async_trait]
impl EventSubscription for SseSubscription {
    async fn next(&mut self) -> Option<ChannelEvent> {
        loop {
            // Drain decoded frames before touching the wire again.
            while let Some(frame) = self.decoder.next_frame() {
                if let Some(event) = ChannelEvent::from_frame(&frame) {
                    return Some(event);
                }
            }
            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => self.decoder.push(&chunk),
                Some(Err(err)) => {
                    // One synthetic failure event; afterwards the
                    // subscription is exhausted.
                    client_warn!("event stream failed: {}", err);
                    self.stream = None;
                    return Some(ChannelEvent::TransportError { message: None });
                }
                None => {
                    self.stream = None;
                    return None;
                }
            }
        }
    }

    fn close(&mut self) {
        self.stream = None;
        self.decoder = SseDecoder::new();
    }
}

fn is_event_stream(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    essence.eq_ignore_ascii_case("text/event-stream")
}

fn map_reqwest_error(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        return ChannelError::Timeout(err.to_string());
    }
    ChannelError::Network(err.to_string())
}
