//! Runs a [`MessagePageState`] against real collaborators.
//!
//! The controller owns the state and carries out its effects on tokio: fetches
//! and deletes run as spawned tasks whose completions come back as events,
//! the search stream is read as tagged [`PageEvent::Stream`] events, and
//! history pushes go straight to the [`HistorySync`].
//!
//! Nothing outlives the controller: dropping it aborts in-flight requests and
//! closes the search transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use topicscope_client::{SearchTransport, TransportEvent};

use crate::fetcher::PageFetcher;
use crate::history::HistorySync;
use crate::page_state::{Effect, MessagePageState, Notice, PageEvent, RequestId};
use crate::search::SessionId;

struct OpenStream {
    session: SessionId,
    events: mpsc::Receiver<TransportEvent>,
    deadline: Option<JoinHandle<()>>,
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
    }
}

pub struct PageController<H: HistorySync> {
    state: MessagePageState,
    fetcher: Arc<PageFetcher>,
    transport: Arc<dyn SearchTransport>,
    history: H,
    search_max_duration: Option<Duration>,
    events_tx: mpsc::UnboundedSender<PageEvent>,
    events_rx: mpsc::UnboundedReceiver<PageEvent>,
    fetches: HashMap<RequestId, JoinHandle<()>>,
    deletes: HashMap<RequestId, JoinHandle<()>>,
    stream: Option<OpenStream>,
}

impl<H: HistorySync> PageController<H> {
    #[must_use]
    pub fn new(fetcher: PageFetcher, transport: Arc<dyn SearchTransport>, history: H) -> Self {
        let state =
            MessagePageState::new(fetcher.cluster(), fetcher.topic(), fetcher.capabilities());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state,
            fetcher: Arc::new(fetcher),
            transport,
            history,
            search_max_duration: None,
            events_tx,
            events_rx,
            fetches: HashMap::new(),
            deletes: HashMap::new(),
            stream: None,
        }
    }

    /// Stop a search that has not finished after `max` (unbounded when `None`).
    #[must_use]
    pub fn with_search_max_duration(mut self, max: Option<Duration>) -> Self {
        self.search_max_duration = max;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &MessagePageState {
        &self.state
    }

    #[must_use]
    pub const fn history(&self) -> &H {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut H {
        &mut self.history
    }

    /// Open the view with the query restored from history.
    pub fn mount(&mut self) -> Vec<Notice> {
        let query = self.history.restore();
        info!(
            cluster = %self.fetcher.cluster(),
            topic = %self.fetcher.topic(),
            query = %query,
            "mounting data view"
        );
        self.dispatch(PageEvent::Mount { query })
    }

    /// Apply `event` and carry out every effect it causes.
    ///
    /// Effects that can be resolved immediately (such as a stream that failed
    /// to open) are fed back before returning.
    pub fn dispatch(&mut self, event: PageEvent) -> Vec<Notice> {
        let mut queue = VecDeque::from([event]);
        let mut notices = Vec::new();
        while let Some(event) = queue.pop_front() {
            for effect in self.state.update(event) {
                self.execute(effect, &mut queue, &mut notices);
            }
        }
        self.release_finished_stream();
        notices
    }

    /// Wait for the next completion or stream event and apply it.
    ///
    /// Returns `None` once nothing is outstanding.
    pub async fn step(&mut self) -> Option<Vec<Notice>> {
        if !self.has_outstanding_work() {
            return None;
        }
        let event = tokio::select! {
            Some(event) = self.events_rx.recv() => event,
            (session, event) = next_stream_event(&mut self.stream), if self.stream.is_some() => {
                PageEvent::Stream { session, event }
            }
        };
        Some(self.dispatch(event))
    }

    /// Run until no fetch, delete, or search is outstanding.
    pub async fn settle(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Some(batch) = self.step().await {
            notices.extend(batch);
        }
        notices
    }

    #[must_use]
    pub fn has_outstanding_work(&self) -> bool {
        !self.fetches.is_empty() || !self.deletes.is_empty() || self.stream.is_some()
    }

    /// Tear the view down: stop the search and abort in-flight fetches.
    pub fn unmount(&mut self) -> Vec<Notice> {
        let notices = self.dispatch(PageEvent::Unmount);
        self.stream = None;
        notices
    }

    fn execute(
        &mut self,
        effect: Effect,
        queue: &mut VecDeque<PageEvent>,
        notices: &mut Vec<Notice>,
    ) {
        match effect {
            Effect::Fetch {
                request,
                mode,
                filter,
            } => {
                let fetcher = Arc::clone(&self.fetcher);
                let tx = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    let result = fetcher.fetch(&filter, mode).await;
                    let _ = tx.send(PageEvent::FetchCompleted { request, result });
                });
                self.fetches.insert(request, task);
            }
            Effect::CancelFetch(request) => {
                if let Some(task) = self.fetches.remove(&request) {
                    debug!(request = %request, "aborting superseded fetch");
                    task.abort();
                }
            }
            Effect::OpenStream { session, query } => self.open_stream(session, &query, queue),
            Effect::PushHistory(query) => {
                if let Err(err) = self.history.push(&query) {
                    warn!(error = %err, query = %query, "history push failed");
                }
            }
            Effect::Delete {
                request,
                partition,
                key_base64,
                key,
            } => {
                info!(request = %request, partition, key = %key, "deleting record");
                let fetcher = Arc::clone(&self.fetcher);
                let tx = self.events_tx.clone();
                let task = tokio::spawn(async move {
                    let result = fetcher.delete_record(partition, &key_base64).await;
                    let _ = tx.send(PageEvent::DeleteCompleted { request, result });
                });
                self.deletes.insert(request, task);
            }
            Effect::Notify(notice) => {
                if notice.is_error() {
                    warn!(notice = %notice, "notice");
                } else {
                    info!(notice = %notice, "notice");
                }
                notices.push(notice);
            }
        }
    }

    fn open_stream(&mut self, session: SessionId, query: &str, queue: &mut VecDeque<PageEvent>) {
        self.stream = None;
        let (cluster, topic) = (self.fetcher.cluster(), self.fetcher.topic());
        let connection = match self.transport.open(cluster, topic, query) {
            Ok(connection) => connection,
            Err(err) => {
                warn!(session = %session, error = %err, "could not open search stream");
                queue.push_back(PageEvent::Stream {
                    session,
                    event: TransportEvent::Error(err.to_string()),
                });
                return;
            }
        };
        if !self.state.attach_stream(session, connection.handle) {
            return;
        }
        let deadline = self.search_max_duration.map(|max| {
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(max).await;
                let _ = tx.send(PageEvent::SearchDeadline { session });
            })
        });
        self.stream = Some(OpenStream {
            session,
            events: connection.events,
            deadline,
        });
    }

    /// Drop the receiver of a session that is no longer running, and forget
    /// request tasks whose completion has been applied.
    fn release_finished_stream(&mut self) {
        let finished = self
            .stream
            .as_ref()
            .is_some_and(|stream| !self.state.search().is_running_session(stream.session));
        if finished {
            debug!("releasing search stream");
            self.stream = None;
        }
        let pending_fetch = self.state.pending_fetch();
        self.fetches.retain(|request, _| Some(*request) == pending_fetch);
        let pending_delete = self.state.pending_delete();
        self.deletes.retain(|request, _| Some(*request) == pending_delete);
    }
}

impl<H: HistorySync> Drop for PageController<H> {
    fn drop(&mut self) {
        for (_, task) in self.fetches.drain() {
            task.abort();
        }
        for (_, task) in self.deletes.drain() {
            task.abort();
        }
        self.stream = None;
    }
}

/// Next event of the open stream; a closed channel reads as [`TransportEvent::Closed`].
async fn next_stream_event(stream: &mut Option<OpenStream>) -> (SessionId, TransportEvent) {
    match stream {
        Some(stream) => {
            let event = stream.events.recv().await.unwrap_or(TransportEvent::Closed);
            (stream.session, event)
        }
        None => std::future::pending().await,
    }
}
