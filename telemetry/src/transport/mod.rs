//! Server-sent-events transport for the per-run frame stream.
//!
//! Owns reconnection: after a failure it waits the current reconnection
//! delay (which the server may change with `retry:`) and connects again,
//! resuming from the last event id. A `204 No Content` answer ends the
//! stream for good, as does a run of consecutive `4xx` answers longer than
//! the configured allowance. Consumers see [`TransportEvent::Open`],
//! [`TransportEvent::Message`], [`TransportEvent::Error`] and, at most once,
//! [`TransportEvent::Closed`].

mod sse;

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use sse::{SseDecoder, SseError, SseMessage, MAX_EVENT_BYTES, MAX_LINE_BYTES};

const LAST_EVENT_ID: &str = "Last-Event-ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was (re)established and the stream is flowing
    Open,
    Message(SseMessage),
    /// The connection failed or dropped; a reconnect is scheduled
    Error(String),
    /// The server ended the stream for good; no reconnect follows
    Closed(String),
}

enum StreamEnd {
    Failed(String),
    /// 4xx answer; retried a limited number of times in a row
    Rejected(String),
    Finished(String),
    SinkClosed,
}

/// Consecutive 4xx answers tolerated unless configured otherwise
pub const DEFAULT_CLIENT_ERROR_RETRIES: u32 = 5;

pub struct EventStreamTransport {
    client: Client,
    url: Url,
    reconnect_delay: Duration,
    client_error_retries: u32,
    cancel: CancellationToken,
}

impl EventStreamTransport {
    pub fn new(
        client: Client,
        url: Url,
        reconnect_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            url,
            reconnect_delay,
            client_error_retries: DEFAULT_CLIENT_ERROR_RETRIES,
            cancel,
        }
    }

    /// Reconnects allowed after consecutive 4xx answers before closing.
    pub fn with_client_error_retries(mut self, retries: u32) -> Self {
        self.client_error_retries = retries;
        self
    }

    /// Run until cancelled or until `sink` returns `false`.
    pub fn spawn<F>(self, sink: F) -> JoinHandle<()>
    where
        F: FnMut(TransportEvent) -> bool + Send + 'static,
    {
        tokio::spawn(self.run(sink))
    }

    pub async fn run<F>(self, mut sink: F)
    where
        F: FnMut(TransportEvent) -> bool + Send,
    {
        let mut decoder = SseDecoder::new();
        let mut delay = self.reconnect_delay;
        let mut rejections = 0u32;

        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = self.connect_once(&mut decoder, &mut sink, &mut rejections) => outcome,
            };
            if let Some(retry) = decoder.take_retry() {
                delay = retry;
            }

            match outcome {
                StreamEnd::SinkClosed => break,
                StreamEnd::Finished(reason) => {
                    tracing::info!(url = %self.url, reason = %reason, "Event stream finished");
                    sink(TransportEvent::Closed(reason));
                    break;
                }
                StreamEnd::Rejected(reason) => {
                    rejections += 1;
                    if rejections > self.client_error_retries {
                        tracing::warn!(
                            url = %self.url,
                            error = %reason,
                            attempts = rejections,
                            "Event stream rejected, giving up"
                        );
                        sink(TransportEvent::Closed(reason));
                        break;
                    }
                    tracing::warn!(
                        url = %self.url,
                        error = %reason,
                        attempts = rejections,
                        retry_ms = delay.as_millis() as u64,
                        "Event stream rejected"
                    );
                    if !sink(TransportEvent::Error(reason)) {
                        break;
                    }
                }
                StreamEnd::Failed(reason) => {
                    tracing::warn!(
                        url = %self.url,
                        error = %reason,
                        retry_ms = delay.as_millis() as u64,
                        "Event stream dropped"
                    );
                    if !sink(TransportEvent::Error(reason)) {
                        break;
                    }
                }
            }
            decoder.reset();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::debug!(url = %self.url, "Event stream transport finished");
    }

    async fn connect_once<F>(
        &self,
        decoder: &mut SseDecoder,
        sink: &mut F,
        rejections: &mut u32,
    ) -> StreamEnd
    where
        F: FnMut(TransportEvent) -> bool + Send,
    {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = decoder.last_event_id() {
            request = request.header(LAST_EVENT_ID, id);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return StreamEnd::Failed(format!("connect failed: {e}")),
        };

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return StreamEnd::Finished("server has no more events".to_string());
        }
        if status.is_client_error() {
            return StreamEnd::Rejected(format!("HTTP error: {status}"));
        }
        if !status.is_success() {
            return StreamEnd::Failed(format!("HTTP error: {status}"));
        }
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("text/event-stream"))
            .unwrap_or(false);
        if !is_event_stream {
            return StreamEnd::Failed("response is not an event stream".to_string());
        }

        tracing::debug!(url = %self.url, "Event stream connected");
        *rejections = 0;
        if !sink(TransportEvent::Open) {
            return StreamEnd::SinkClosed;
        }

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return StreamEnd::Failed(format!("stream read failed: {e}")),
            };
            let mut messages = Vec::new();
            let decoded = decoder.push(&bytes, &mut messages);
            for message in messages {
                if !sink(TransportEvent::Message(message)) {
                    return StreamEnd::SinkClosed;
                }
            }
            if let Err(e) = decoded {
                return StreamEnd::Failed(e.to_string());
            }
        }

        StreamEnd::Failed("stream ended by server".to_string())
    }
}
