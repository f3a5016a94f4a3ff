//! Streaming search session.
//!
//! ```text
//! Idle ──start──▶ Running ──End/Error/Closed──▶ Completed
//!                    │
//!                    └──stop/expire──▶ Stopped
//! ```
//!
//! The session is a plain state machine: the owner feeds it transport events
//! tagged with the [`SessionId`] they were opened for. Starting a new session
//! closes the previous transport, and events for any session other than the
//! running one are dropped.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use topicscope_client::{StreamHandle, TransportEvent};
use topicscope_core::MessageRecord;

/// Identifies one started session. Strictly increasing per [`SearchSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Running {
        /// 0..=100, two decimals.
        percent: f64,
    },
    Stopped,
    Completed,
}

impl SearchState {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed)
    }
}

/// What applying one transport event did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Stale session, or the session is no longer running.
    Ignored,
    /// `appended` records were added to the end of [`SearchSession::records`].
    Progress { appended: usize, percent: f64 },
    /// The session finished; `error` is set when the transport failed.
    Completed { error: Option<String> },
}

#[derive(Debug, Default)]
pub struct SearchSession {
    last_id: u64,
    current: Option<SessionId>,
    state: SearchState,
    percent: f64,
    records: Vec<MessageRecord>,
    handle: Option<StreamHandle>,
    ignored_events: u64,
}

impl SearchSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh session, superseding any running one.
    ///
    /// The previous transport is closed, accumulated records are cleared, and
    /// the returned id is the only one whose events will be accepted.
    pub fn start(&mut self) -> SessionId {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if let (Some(prev), true) = (self.current, self.state.is_running()) {
            debug!(session = %prev, "superseding running search");
        }
        self.last_id += 1;
        let id = SessionId(self.last_id);
        self.current = Some(id);
        self.state = SearchState::Running { percent: 0.0 };
        self.percent = 0.0;
        self.records.clear();
        info!(session = %id, "search started");
        id
    }

    /// Hand the session the transport opened for `session`.
    ///
    /// A handle for any session other than the running one is closed at once.
    pub fn attach(&mut self, session: SessionId, handle: StreamHandle) -> bool {
        if self.is_running_session(session) {
            if let Some(prev) = self.handle.replace(handle) {
                prev.close();
            }
            true
        } else {
            debug!(session = %session, "closing transport of a session that is not running");
            handle.close();
            false
        }
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, session: SessionId, event: TransportEvent) -> SessionUpdate {
        if !self.is_running_session(session) {
            self.ignored_events += 1;
            debug!(session = %session, current = ?self.current, "ignoring search event");
            return SessionUpdate::Ignored;
        }
        match event {
            TransportEvent::Progress { percent, records } => {
                let percent = normalize_percent(percent);
                let appended = records.len();
                self.records.extend(records);
                self.percent = percent;
                self.state = SearchState::Running { percent };
                debug!(session = %session, percent, records = appended, "search progress");
                SessionUpdate::Progress { appended, percent }
            }
            TransportEvent::End => self.complete(session, None),
            TransportEvent::Error(message) => self.complete(session, Some(message)),
            TransportEvent::Closed => self.complete(session, None),
        }
    }

    fn complete(&mut self, session: SessionId, error: Option<String>) -> SessionUpdate {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        self.percent = 100.0;
        self.state = SearchState::Completed;
        info!(session = %session, records = self.records.len(), error = ?error, "search completed");
        SessionUpdate::Completed { error }
    }

    /// Close the transport and stop. Returns whether a session was running.
    ///
    /// Safe from any state; only a running session changes state.
    pub fn stop(&mut self) -> bool {
        if let Some(handle) = self.handle.take() {
            handle.close();
        }
        if self.state.is_running() {
            self.state = SearchState::Stopped;
            info!(session = ?self.current, records = self.records.len(), "search stopped");
            true
        } else {
            false
        }
    }

    /// Stop `session` because it ran past its allotted time.
    pub fn expire(&mut self, session: SessionId) -> bool {
        if self.is_running_session(session) {
            self.stop()
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_running_session(&self, session: SessionId) -> bool {
        self.current == Some(session) && self.state.is_running()
    }

    #[must_use]
    pub const fn state(&self) -> SearchState {
        self.state
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }

    #[must_use]
    pub const fn percent(&self) -> f64 {
        self.percent
    }

    #[must_use]
    pub const fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    /// Records received so far, in arrival order.
    #[must_use]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Whether a transport is currently held open.
    #[must_use]
    pub fn has_transport(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    /// Events dropped because they were stale or late.
    #[must_use]
    pub const fn ignored_events(&self) -> u64 {
        self.ignored_events
    }
}

/// Clamp to 0..=100 and round to two decimals. NaN reads as 0.
#[must_use]
pub fn normalize_percent(raw: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    (raw.clamp(0.0, 100.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use topicscope_core::RawRecord;

    fn record(key: &str, offset: u64) -> MessageRecord {
        MessageRecord::from(RawRecord {
            key: Some(key.to_string()),
            value: Some(format!("v-{key}")),
            offset,
            ..RawRecord::default()
        })
    }

    fn progress(percent: f64, records: Vec<MessageRecord>) -> TransportEvent {
        TransportEvent::Progress { percent, records }
    }

    #[test]
    fn progress_then_end_accumulates_in_order() {
        let mut session = SearchSession::new();
        let id = session.start();
        session.attach(id, StreamHandle::detached());

        session.handle_event(id, progress(10.0, vec![record("A", 1)]));
        assert_eq!(session.state(), SearchState::Running { percent: 10.0 });
        session.handle_event(id, progress(55.0, vec![record("B", 0)]));
        let update = session.handle_event(id, TransportEvent::End);

        assert_eq!(update, SessionUpdate::Completed { error: None });
        let keys: Vec<_> = session.records().iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["A", "B"]);
        assert_eq!(session.state(), SearchState::Completed);
        assert!((session.percent() - 100.0).abs() < f64::EPSILON);
        assert!(!session.has_transport());
    }

    #[test]
    fn stop_is_idempotent_from_any_state() {
        let mut session = SearchSession::new();
        assert!(!session.stop());
        assert_eq!(session.state(), SearchState::Idle);

        let id = session.start();
        session.attach(id, StreamHandle::detached());
        assert!(session.stop());
        assert_eq!(session.state(), SearchState::Stopped);
        assert!(!session.stop());
        assert!(!session.stop());
        assert_eq!(session.state(), SearchState::Stopped);
        assert!(!session.has_transport());
    }

    #[test]
    fn events_after_stop_are_ignored() {
        let mut session = SearchSession::new();
        let id = session.start();
        session.handle_event(id, progress(5.0, vec![record("A", 1)]));
        session.stop();

        assert_eq!(
            session.handle_event(id, progress(50.0, vec![record("late", 2)])),
            SessionUpdate::Ignored
        );
        assert_eq!(session.handle_event(id, TransportEvent::End), SessionUpdate::Ignored);
        assert_eq!(session.records().len(), 1);
        assert_eq!(session.state(), SearchState::Stopped);
        assert_eq!(session.ignored_events(), 2);
    }

    #[test]
    fn starting_again_closes_previous_transport() {
        let mut session = SearchSession::new();
        let first = session.start();
        let first_handle = StreamHandle::detached();
        let first_token = first_handle.closed_token();
        session.attach(first, first_handle);
        session.handle_event(first, progress(30.0, vec![record("old", 1)]));

        let second = session.start();
        assert!(second > first);
        assert!(first_token.is_cancelled());
        assert!(session.records().is_empty());

        let second_handle = StreamHandle::detached();
        let second_token = second_handle.closed_token();
        assert!(session.attach(second, second_handle));
        assert!(!second_token.is_cancelled());
        assert!(session.has_transport());

        assert_eq!(
            session.handle_event(first, progress(90.0, vec![record("stale", 2)])),
            SessionUpdate::Ignored
        );
        assert!(session.records().is_empty());
    }

    #[test]
    fn late_attach_is_closed_immediately() {
        let mut session = SearchSession::new();
        let first = session.start();
        let _second = session.start();
        let handle = StreamHandle::detached();
        let token = handle.closed_token();
        assert!(!session.attach(first, handle));
        assert!(token.is_cancelled());
    }

    #[test]
    fn transport_error_completes_with_message() {
        let mut session = SearchSession::new();
        let id = session.start();
        session.handle_event(id, progress(40.0, Vec::new()));
        let update = session.handle_event(id, TransportEvent::Error("reset".into()));
        assert_eq!(
            update,
            SessionUpdate::Completed {
                error: Some("reset".into())
            }
        );
        assert_eq!(session.state(), SearchState::Completed);
        assert!((session.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn closed_without_end_completes() {
        let mut session = SearchSession::new();
        let id = session.start();
        assert_eq!(
            session.handle_event(id, TransportEvent::Closed),
            SessionUpdate::Completed { error: None }
        );
    }

    #[test]
    fn expire_only_stops_the_running_session() {
        let mut session = SearchSession::new();
        let first = session.start();
        let second = session.start();
        assert!(!session.expire(first));
        assert!(session.is_running());
        assert!(session.expire(second));
        assert_eq!(session.state(), SearchState::Stopped);
    }

    #[test]
    fn percent_is_clamped_and_rounded() {
        assert!((normalize_percent(12.3456) - 12.35).abs() < 1e-9);
        assert!((normalize_percent(-3.0)).abs() < f64::EPSILON);
        assert!((normalize_percent(250.0) - 100.0).abs() < f64::EPSILON);
        assert!(normalize_percent(f64::NAN).abs() < f64::EPSILON);
    }
}
