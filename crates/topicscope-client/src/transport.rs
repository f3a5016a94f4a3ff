//! Streaming search transport.
//!
//! A connection is a spawned task that reads the event stream and forwards
//! [`TransportEvent`]s over a bounded channel. The [`StreamHandle`] returned
//! alongside it is the only way to close the connection; dropping the handle
//! closes it too.

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use topicscope_core::query::encode_value;
use topicscope_core::{Config, Error, MessageRecord, Result};

use crate::api::{map_reqwest_error, read_success_body};
use crate::sse::{SseParser, frame_to_event};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What the search endpoint reported.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Partial results plus completion percentage (as sent, unclamped).
    Progress {
        percent: f64,
        records: Vec<MessageRecord>,
    },
    /// The search finished.
    End,
    /// The connection failed or the backend reported an error.
    Error(String),
    /// The stream ended without a terminal event.
    Closed,
}

impl TransportEvent {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Owner's side of an open connection.
#[derive(Debug)]
pub struct StreamHandle {
    token: CancellationToken,
}

impl StreamHandle {
    #[must_use]
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// A handle not tied to any task.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Close the connection. Safe to call repeatedly.
    pub fn close(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token observers can await to learn the handle was closed.
    #[must_use]
    pub fn closed_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// An opened search stream.
#[derive(Debug)]
pub struct StreamConnection {
    pub events: mpsc::Receiver<TransportEvent>,
    pub handle: StreamHandle,
}

/// Opens streaming searches.
pub trait SearchTransport: Send + Sync {
    /// Open one stream for `query` (a serialized filter carrying `search`).
    ///
    /// Must be called from within a tokio runtime.
    fn open(&self, cluster: &str, topic: &str, query: &str) -> Result<StreamConnection>;
}

/// [`SearchTransport`] over HTTP server-sent events.
#[derive(Debug, Clone)]
pub struct HttpSearchTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpSearchTransport {
    /// No request timeout: a search lasts as long as the backend keeps streaming.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self::with_client(client, config.api_base()))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client, base }
    }

    #[must_use]
    pub fn search_url(&self, cluster: &str, topic: &str, query: &str) -> String {
        let query = query.trim_start_matches('?');
        format!(
            "{}/{}/topic/{}/data/search?{query}",
            self.base,
            encode_value(cluster),
            encode_value(topic)
        )
    }
}

impl SearchTransport for HttpSearchTransport {
    fn open(&self, cluster: &str, topic: &str, query: &str) -> Result<StreamConnection> {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let url = self.search_url(cluster, topic, query);
        let client = self.client.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = task_token.cancelled() => {
                    debug!(url = %url, "search stream closed by owner");
                }
                () = run_stream(client, url.clone(), event_tx) => {}
            }
        });

        Ok(StreamConnection {
            events: event_rx,
            handle: StreamHandle::new(token),
        })
    }
}

async fn run_stream(client: reqwest::Client, url: String, event_tx: mpsc::Sender<TransportEvent>) {
    info!(url = %url, "opening search stream");
    let terminal = match stream_events(&client, &url, &event_tx).await {
        Ok(Some(terminal)) => terminal,
        Ok(None) => return,
        Err(err) => {
            warn!(error = %err, url = %url, "search stream failed");
            TransportEvent::Error(err.to_string())
        }
    };
    let _ = event_tx.send(terminal).await;
}

/// Forward events until a terminal one; return the terminal event to send,
/// or `None` when the receiver has gone away.
async fn stream_events(
    client: &reqwest::Client,
    url: &str,
    event_tx: &mpsc::Sender<TransportEvent>,
) -> Result<Option<TransportEvent>> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(map_reqwest_error)?;
    if !response.status().is_success() {
        return Err(read_success_body(response)
            .await
            .err()
            .unwrap_or_else(|| Error::StreamTransportError("unexpected status".into())));
    }

    let mut parser = SseParser::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk: Bytes = chunk.map_err(map_reqwest_error)?;
        for frame in parser.push(&chunk) {
            let Some(event) = frame_to_event(&frame) else {
                continue;
            };
            if event.is_terminal() {
                return Ok(Some(event));
            }
            if event_tx.send(event).await.is_err() {
                debug!("search event receiver dropped");
                return Ok(None);
            }
        }
    }

    if let Some(event) = parser.finish().as_ref().and_then(frame_to_event) {
        if event.is_terminal() {
            return Ok(Some(event));
        }
        if event_tx.send(event).await.is_err() {
            return Ok(None);
        }
    }
    Ok(Some(TransportEvent::Closed))
}
