//! The data view's aggregate state and its transition function.
//!
//! [`MessagePageState::update`] consumes one [`PageEvent`] and returns the
//! [`Effect`]s the caller must carry out. It never performs I/O itself, so
//! every transition can be driven and inspected without a runtime.
//!
//! # Ordering
//!
//! Every fetch and delete carries a [`RequestId`]. Only the completion of the
//! pending request is applied; a new filter action cancels the pending fetch
//! first, so a slow stale response can never overwrite fresher state.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use topicscope_client::{StreamHandle, TransportEvent};
use topicscope_core::{
    Capabilities, Error, Filter, MessageRecord, Page, PartitionOffsetMap, PartitionSelector,
    Result, SchemaEntry, SortOrder, partition_options,
};

use crate::fetcher::{FetchMode, FetchedPage};
use crate::search::{SearchSession, SessionId, SessionUpdate};

/// Identifies one fetch or delete issued by the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ──────────────────────────────────────────────────────────────────────
// Events, effects, notices
// ──────────────────────────────────────────────────────────────────────

/// Everything that can happen to the view.
#[derive(Debug)]
pub enum PageEvent {
    /// The view opened with `query` restored from history.
    Mount { query: String },
    /// Back/forward restored `query`.
    Navigated { query: String },
    SortChanged(SortOrder),
    PartitionChanged(PartitionSelector),
    TimestampChanged(Option<DateTime<Utc>>),
    /// Raw text typed into one partition's offset box.
    OffsetEdited { partition: u32, input: String },
    /// Apply the offsets editor as the `after` cursor.
    OffsetsCommitted,
    SearchSubmitted(String),
    StopSearch,
    NextPage,
    DeleteRequested(MessageRecord),
    DeleteConfirmed,
    DeleteCancelled,
    FetchCompleted {
        request: RequestId,
        result: Result<FetchedPage>,
    },
    Stream {
        session: SessionId,
        event: TransportEvent,
    },
    /// The session ran past its maximum duration.
    SearchDeadline { session: SessionId },
    DeleteCompleted {
        request: RequestId,
        result: Result<()>,
    },
    Unmount,
}

/// Work the caller must carry out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Fetch {
        request: RequestId,
        mode: FetchMode,
        filter: Filter,
    },
    CancelFetch(RequestId),
    /// Open the search stream for `session`, then hand its handle back via
    /// [`MessagePageState::attach_stream`].
    OpenStream { session: SessionId, query: String },
    PushHistory(String),
    Delete {
        request: RequestId,
        partition: u32,
        key_base64: String,
        key: String,
    },
    Notify(Notice),
}

/// User-visible outcomes (toasts, status lines).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    FetchFailed { message: String },
    DeleteScheduled { key: String },
    DeleteFailed { key: String, message: String },
    SearchCompleted { records: usize },
    SearchStopped { records: usize },
    StreamTransportError { message: String },
    SearchTimedOut { records: usize },
    InvalidInput { message: String },
}

impl Notice {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. }
                | Self::DeleteFailed { .. }
                | Self::StreamTransportError { .. }
                | Self::InvalidInput { .. }
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed { message } => write!(f, "Could not load records: {message}"),
            Self::DeleteScheduled { key } => {
                write!(f, "Record '{key}' will be deleted on compaction")
            }
            Self::DeleteFailed { key, message } => {
                write!(f, "Could not delete record '{key}': {message}")
            }
            Self::SearchCompleted { records } => write!(f, "Search finished: {records} records"),
            Self::SearchStopped { records } => write!(f, "Search stopped: {records} records"),
            Self::StreamTransportError { message } => write!(f, "Search stream failed: {message}"),
            Self::SearchTimedOut { records } => {
                write!(f, "Search timed out after {records} records")
            }
            Self::InvalidInput { message } => f.write_str(message),
        }
    }
}

// ──────────────────────────────────────────────────────────────────────
// MessagePageState
// ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MessagePageState {
    cluster: String,
    topic: String,
    capabilities: Capabilities,
    filter: Filter,
    page: Page,
    partition_count: usize,
    offsets: PartitionOffsetMap,
    schemas: Vec<SchemaEntry>,
    search: SearchSession,
    pending_fetch: Option<(RequestId, FetchMode)>,
    pending_delete: Option<(RequestId, String)>,
    delete_candidate: Option<MessageRecord>,
    last_request: u64,
    mounted: bool,
}

impl MessagePageState {
    #[must_use]
    pub fn new(
        cluster: impl Into<String>,
        topic: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            topic: topic.into(),
            capabilities,
            filter: Filter::default(),
            page: Page::default(),
            partition_count: 0,
            offsets: PartitionOffsetMap::default(),
            schemas: Vec::new(),
            search: SearchSession::new(),
            pending_fetch: None,
            pending_delete: None,
            delete_candidate: None,
            last_request: 0,
            mounted: false,
        }
    }

    /// Apply one event.
    pub fn update(&mut self, event: PageEvent) -> Vec<Effect> {
        match event {
            PageEvent::Mount { query } => {
                self.mounted = true;
                self.restore(&query)
            }
            PageEvent::Navigated { query } => self.restore(&query),
            PageEvent::SortChanged(sort) => {
                self.filter.sort = sort;
                self.refetch()
            }
            PageEvent::PartitionChanged(partition) => {
                self.filter.partition = partition;
                self.refetch()
            }
            PageEvent::TimestampChanged(timestamp) => {
                self.filter.set_timestamp(timestamp);
                self.refetch()
            }
            PageEvent::OffsetEdited { partition, input } => self.edit_offset(partition, &input),
            PageEvent::OffsetsCommitted => {
                let cursor = self.offsets.encode();
                self.filter.set_after(Some(cursor));
                self.refetch()
            }
            PageEvent::SearchSubmitted(term) => self.submit_search(term),
            PageEvent::StopSearch => {
                if self.search.stop() {
                    vec![Effect::Notify(Notice::SearchStopped {
                        records: self.search.records().len(),
                    })]
                } else {
                    Vec::new()
                }
            }
            PageEvent::NextPage => self.next_page(),
            PageEvent::DeleteRequested(record) => self.request_delete(record),
            PageEvent::DeleteConfirmed => self.confirm_delete(),
            PageEvent::DeleteCancelled => {
                self.delete_candidate = None;
                Vec::new()
            }
            PageEvent::FetchCompleted { request, result } => {
                self.fetch_completed(request, result)
            }
            PageEvent::Stream { session, event } => self.stream_event(session, event),
            PageEvent::SearchDeadline { session } => {
                if self.search.expire(session) {
                    vec![Effect::Notify(Notice::SearchTimedOut {
                        records: self.search.records().len(),
                    })]
                } else {
                    Vec::new()
                }
            }
            PageEvent::DeleteCompleted { request, result } => {
                self.delete_completed(request, result)
            }
            PageEvent::Unmount => {
                self.mounted = false;
                self.search.stop();
                self.delete_candidate = None;
                self.cancel_pending_fetch().into_iter().collect()
            }
        }
    }

    /// Give the running session the transport opened for it.
    pub fn attach_stream(&mut self, session: SessionId, handle: StreamHandle) -> bool {
        self.search.attach(session, handle)
    }

    // ── transitions ──────────────────────────────────────────────────

    fn restore(&mut self, query: &str) -> Vec<Effect> {
        if let Err(err) = Filter::parse_strict(query) {
            debug!(query, error = %err, "restored query had malformed fields");
        }
        self.filter = Filter::parse(query);
        self.offsets = self.filter.offsets();
        if self.partition_count > 0 {
            self.offsets.resize(self.partition_count);
        }
        self.refetch()
    }

    /// Only partitions the topic actually has can be edited.
    fn edit_offset(&mut self, partition: u32, input: &str) -> Vec<Effect> {
        if partition as usize >= self.partition_count {
            return vec![Effect::Notify(Notice::InvalidInput {
                message: format!(
                    "partition {partition} does not exist (topic has {})",
                    self.partition_count
                ),
            })];
        }
        match self.offsets.set_input(partition, input) {
            Ok(()) => Vec::new(),
            Err(err) => vec![Effect::Notify(Notice::InvalidInput {
                message: err.to_string(),
            })],
        }
    }

    /// Stop any search, cancel the pending fetch, and fetch page 1.
    fn refetch(&mut self) -> Vec<Effect> {
        self.search.stop();
        let mut effects: Vec<Effect> = self.cancel_pending_fetch().into_iter().collect();
        let request = self.next_request();
        self.pending_fetch = Some((request, FetchMode::First));
        effects.push(Effect::Fetch {
            request,
            mode: FetchMode::First,
            filter: self.filter.clone(),
        });
        effects
    }

    fn submit_search(&mut self, term: String) -> Vec<Effect> {
        if term.trim().is_empty() {
            self.filter.set_search(None);
            return self.refetch();
        }
        self.filter.set_search(Some(term));
        let mut effects: Vec<Effect> = self.cancel_pending_fetch().into_iter().collect();
        self.page = Page::default();
        let session = self.search.start();
        let query = self.filter.build();
        effects.push(Effect::PushHistory(query.clone()));
        effects.push(Effect::OpenStream { session, query });
        effects
    }

    fn next_page(&mut self) -> Vec<Effect> {
        if self.pending_fetch.is_some() || self.search.is_running() {
            debug!("next page ignored while another load is in flight");
            return Vec::new();
        }
        let Some(next) = self.page.next.clone().filter(|_| !self.page.records.is_empty()) else {
            return Vec::new();
        };
        let request = self.next_request();
        let mode = FetchMode::Next(next);
        self.pending_fetch = Some((request, mode.clone()));
        vec![Effect::Fetch {
            request,
            mode,
            filter: self.filter.clone(),
        }]
    }

    fn fetch_completed(&mut self, request: RequestId, result: Result<FetchedPage>) -> Vec<Effect> {
        let Some((pending, _)) = &self.pending_fetch else {
            debug!(request = %request, "dropping completion with no fetch pending");
            return Vec::new();
        };
        if *pending != request {
            debug!(request = %request, pending = %pending, "dropping stale fetch completion");
            return Vec::new();
        }
        self.pending_fetch = None;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(err) => {
                return vec![Effect::Notify(Notice::FetchFailed {
                    message: fetch_failure_message(&err),
                })];
            }
        };

        self.partition_count = fetched.partition_count;
        self.schemas = fetched.schemas;
        let page = fetched.page;
        match fetched.mode {
            FetchMode::Next(_) if !page.records.is_empty() => {
                self.page.records.extend(page.records);
                self.page.page_number += 1;
                self.page.total_size = page.total_size;
                self.page.can_delete_records = page.can_delete_records;
                if let Some(next) = &page.next {
                    self.offsets = next.offsets();
                }
                self.page.next = page.next;
            }
            _ => self.page = page,
        }
        self.offsets.resize(self.partition_count);

        info!(
            request = %request,
            records = self.page.records.len(),
            page = self.page.page_number,
            "page published"
        );
        vec![Effect::PushHistory(fetched.history_query)]
    }

    fn stream_event(&mut self, session: SessionId, event: TransportEvent) -> Vec<Effect> {
        match self.search.handle_event(session, event) {
            SessionUpdate::Ignored => Vec::new(),
            SessionUpdate::Progress { appended, .. } => {
                let records = self.search.records();
                let start = records.len() - appended;
                self.page.records.extend_from_slice(&records[start..]);
                Vec::new()
            }
            SessionUpdate::Completed { error } => {
                let records = self.search.records().len();
                let mut effects = Vec::new();
                if let Some(message) = error {
                    effects.push(Effect::Notify(Notice::StreamTransportError { message }));
                }
                effects.push(Effect::Notify(Notice::SearchCompleted { records }));
                effects
            }
        }
    }

    fn request_delete(&mut self, record: MessageRecord) -> Vec<Effect> {
        if !self.page.can_delete_records {
            return vec![Effect::Notify(Notice::DeleteFailed {
                key: record.key,
                message: "deleting records is not permitted on this topic".to_string(),
            })];
        }
        self.delete_candidate = Some(record);
        Vec::new()
    }

    fn confirm_delete(&mut self) -> Vec<Effect> {
        if let Some((_, key)) = &self.pending_delete {
            return vec![Effect::Notify(Notice::InvalidInput {
                message: format!("wait for the delete of '{key}' to finish"),
            })];
        }
        let Some(record) = self.delete_candidate.take() else {
            return Vec::new();
        };
        let request = self.next_request();
        self.pending_delete = Some((request, record.key.clone()));
        vec![Effect::Delete {
            request,
            partition: record.partition,
            key_base64: STANDARD.encode(record.key.as_bytes()),
            key: record.key,
        }]
    }

    fn delete_completed(&mut self, request: RequestId, result: Result<()>) -> Vec<Effect> {
        let key = match self.pending_delete.take() {
            Some((pending, key)) if pending == request => key,
            other => {
                self.pending_delete = other;
                debug!(request = %request, "dropping stale delete completion");
                return Vec::new();
            }
        };
        match result {
            Ok(()) => {
                let mut effects = vec![Effect::Notify(Notice::DeleteScheduled { key })];
                effects.extend(self.refetch());
                effects
            }
            Err(err) => vec![Effect::Notify(Notice::DeleteFailed {
                key,
                message: err.to_string(),
            })],
        }
    }

    fn cancel_pending_fetch(&mut self) -> Option<Effect> {
        self.pending_fetch
            .take()
            .map(|(request, _)| Effect::CancelFetch(request))
    }

    fn next_request(&mut self) -> RequestId {
        self.last_request += 1;
        RequestId(self.last_request)
    }

    // ── accessors ────────────────────────────────────────────────────

    #[must_use]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[must_use]
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    #[must_use]
    pub const fn page(&self) -> &Page {
        &self.page
    }

    #[must_use]
    pub const fn search(&self) -> &SearchSession {
        &self.search
    }

    #[must_use]
    pub const fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// The offsets editor.
    #[must_use]
    pub const fn offsets(&self) -> &PartitionOffsetMap {
        &self.offsets
    }

    #[must_use]
    pub fn schemas(&self) -> &[SchemaEntry] {
        &self.schemas
    }

    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.pending_fetch.is_some()
    }

    #[must_use]
    pub fn pending_fetch(&self) -> Option<RequestId> {
        self.pending_fetch.as_ref().map(|(id, _)| *id)
    }

    #[must_use]
    pub fn pending_delete(&self) -> Option<RequestId> {
        self.pending_delete.as_ref().map(|(id, _)| *id)
    }

    #[must_use]
    pub const fn delete_candidate(&self) -> Option<&MessageRecord> {
        self.delete_candidate.as_ref()
    }

    // ── view helpers ─────────────────────────────────────────────────

    #[must_use]
    pub fn partition_options(&self) -> Vec<PartitionSelector> {
        partition_options(self.partition_count)
    }

    /// `(label, current input)` for each partition's offset box.
    #[must_use]
    pub fn offset_labels(&self) -> Vec<(String, String)> {
        (0..self.partition_count)
            .map(|p| {
                let p = u32::try_from(p).unwrap_or(u32::MAX);
                let value = self.offsets.get(p).map(|o| o.to_string()).unwrap_or_default();
                (format!("Partition {p}"), value)
            })
            .collect()
    }

    #[must_use]
    pub fn schema_subject(&self, id: i64) -> Option<&str> {
        self.schemas
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.subject.as_str())
    }

    /// Link to the schema registry page of schema `id`.
    #[must_use]
    pub fn schema_link(&self, id: i64) -> Option<String> {
        self.schema_subject(id)
            .map(|subject| format!("/ui/{}/schema/details/{subject}", self.cluster))
    }

    #[must_use]
    pub fn is_last_page(&self) -> bool {
        self.page.is_last_page()
    }

    /// Confirmation text for the pending delete.
    #[must_use]
    pub fn delete_prompt(&self) -> Option<String> {
        self.delete_candidate
            .as_ref()
            .map(|r| format!("Do you want to delete message: {} ?", r.key))
    }
}

fn fetch_failure_message(err: &Error) -> String {
    match err {
        Error::FetchFailed(message) => message.clone(),
        other => other.to_string(),
    }
}
