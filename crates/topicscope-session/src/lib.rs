//! Data-view session logic for Topicscope
//!
//! - [`history`]: navigable history of filter queries
//! - [`fetcher`]: one paginated fetch joined with its auxiliary reads
//! - [`search`]: the streaming search state machine
//! - [`page_state`]: the aggregate view state as `(state, event) -> effects`
//! - [`controller`]: runs the view state on tokio against real collaborators

#![forbid(unsafe_code)]

pub mod controller;
pub mod fetcher;
pub mod history;
pub mod page_state;
pub mod search;

pub use controller::PageController;
pub use fetcher::{FetchMode, FetchedPage, PageFetcher};
pub use history::{FileHistory, HistorySync, Location, MemoryHistory};
pub use page_state::{Effect, MessagePageState, Notice, PageEvent, RequestId};
pub use search::{SearchSession, SearchState, SessionId, SessionUpdate};
