//! Backend access for Topicscope
//!
//! - [`api`]: the paginated, partitions, schema, and delete endpoints behind
//!   the [`TopicApi`] trait
//! - [`transport`]: the streaming search endpoint behind [`SearchTransport`]
//! - [`sse`]: incremental `text/event-stream` parsing

#![forbid(unsafe_code)]

pub mod api;
pub mod sse;
pub mod transport;

pub use api::{HttpTopicApi, TopicApi};
pub use transport::{
    HttpSearchTransport, SearchTransport, StreamConnection, StreamHandle, TransportEvent,
};
