//! Navigable history of filter queries.
//!
//! The serialized filter is the shareable state of the view. History keeps one
//! entry per distinct filter the operator settled on, so back/forward walks
//! between views rather than between individual fetches.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use topicscope_core::Result;

/// Reflects the active query into navigable history and reads it back on mount.
pub trait HistorySync: Send {
    /// Make `query` the current entry's query. Pushing the current query again
    /// must not grow the history.
    fn push(&mut self, query: &str) -> Result<()>;

    /// The current entry's query (empty when there is none).
    fn restore(&self) -> String;
}

/// A view's path plus its query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub query: String,
}

impl Location {
    /// The data view of `topic` in `cluster`.
    #[must_use]
    pub fn topic_data(cluster: &str, topic: &str) -> Self {
        Self {
            path: format!("/ui/{cluster}/topic/{topic}/data"),
            query: String::new(),
        }
    }

    #[must_use]
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

/// Entries for one path, with a cursor at the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStack {
    entries: Vec<String>,
    index: usize,
}

impl HistoryStack {
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.index).map(String::as_str)
    }

    /// Returns whether a new entry was created.
    pub fn push(&mut self, query: &str) -> bool {
        if self.current() == Some(query) {
            return false;
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(query.to_string());
        self.index = self.entries.len() - 1;
        true
    }

    pub fn back(&mut self) -> Option<&str> {
        if self.index == 0 || self.entries.is_empty() {
            return None;
        }
        self.index -= 1;
        self.current()
    }

    pub fn forward(&mut self) -> Option<&str> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.current()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

// ──────────────────────────────────────────────────────────────────────
// MemoryHistory
// ──────────────────────────────────────────────────────────────────────

/// In-process history for one view.
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    path: String,
    stack: HistoryStack,
}

impl MemoryHistory {
    #[must_use]
    pub fn new(location: Location) -> Self {
        let mut stack = HistoryStack::default();
        stack.push(&location.query);
        Self {
            path: location.path,
            stack,
        }
    }

    #[must_use]
    pub fn location(&self) -> Location {
        Location {
            path: self.path.clone(),
            query: self.restore(),
        }
    }

    /// Step back; returns the restored query.
    pub fn back(&mut self) -> Option<String> {
        self.stack.back().map(str::to_string)
    }

    /// Step forward; returns the restored query.
    pub fn forward(&mut self) -> Option<String> {
        self.stack.forward().map(str::to_string)
    }

    #[must_use]
    pub const fn stack(&self) -> &HistoryStack {
        &self.stack
    }
}

impl HistorySync for MemoryHistory {
    fn push(&mut self, query: &str) -> Result<()> {
        if self.stack.push(query) {
            debug!(path = %self.path, query, "history push");
        }
        Ok(())
    }

    fn restore(&self) -> String {
        self.stack.current().unwrap_or_default().to_string()
    }
}

// ──────────────────────────────────────────────────────────────────────
// FileHistory
// ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    views: BTreeMap<String, HistoryStack>,
}

/// History persisted as JSON so separate CLI runs share it.
///
/// One file holds a stack per view path; only the stack of the opened view
/// is touched.
#[derive(Debug)]
pub struct FileHistory {
    file: PathBuf,
    path: String,
    contents: HistoryFile,
}

impl FileHistory {
    /// Open (or start) the history of `location.path` stored in `file`.
    ///
    /// A non-empty `location.query` is pushed as the newest entry. A missing
    /// or unreadable file starts empty.
    pub fn open(file: impl Into<PathBuf>, location: Location) -> Result<Self> {
        let file = file.into();
        let contents = load(&file);
        let mut history = Self {
            file,
            path: location.path,
            contents,
        };
        if !location.query.is_empty() || history.stack().is_empty() {
            history.push(&location.query)?;
        }
        Ok(history)
    }

    #[must_use]
    pub fn stack(&self) -> HistoryStack {
        self.contents.views.get(&self.path).cloned().unwrap_or_default()
    }

    pub fn back(&mut self) -> Result<Option<String>> {
        let restored = self.stack_mut().back().map(str::to_string);
        if restored.is_some() {
            self.save()?;
        }
        Ok(restored)
    }

    pub fn forward(&mut self) -> Result<Option<String>> {
        let restored = self.stack_mut().forward().map(str::to_string);
        if restored.is_some() {
            self.save()?;
        }
        Ok(restored)
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    fn stack_mut(&mut self) -> &mut HistoryStack {
        self.contents.views.entry(self.path.clone()).or_default()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.contents)?;
        fs::write(&self.file, json)?;
        Ok(())
    }
}

fn load(file: &Path) -> HistoryFile {
    match fs::read_to_string(file) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
            debug!(file = %file.display(), error = %err, "ignoring unreadable history file");
            HistoryFile::default()
        }),
        Err(_) => HistoryFile::default(),
    }
}

impl HistorySync for FileHistory {
    fn push(&mut self, query: &str) -> Result<()> {
        if self.stack_mut().push(query) {
            debug!(path = %self.path, query, "history push");
            self.save()?;
        }
        Ok(())
    }

    fn restore(&self) -> String {
        self.contents
            .views
            .get(&self.path)
            .and_then(HistoryStack::current)
            .unwrap_or_default()
            .to_string()
    }
}
