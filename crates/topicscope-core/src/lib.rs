//! Core types, configuration, and codecs for Topicscope
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - Data models (`MessageRecord`, `Page`, `SchemaEntry`, ...)
//! - The per-partition offset cursor codec
//! - The canonical filter query builder/parser
//! - Common error types

#![forbid(unsafe_code)]

pub mod config;
pub mod cursor;
pub mod error;
pub mod filter;
pub mod models;
pub mod query;
pub mod timestamps;

// Re-export key types for convenience
pub use config::Config;
pub use cursor::{NextPage, PartitionOffsetMap};
pub use error::{Error, Result};
pub use filter::{Filter, PartitionSelector, SortOrder, partition_options};
pub use models::{
    Capabilities, MessageRecord, Page, PartitionSummary, RawRecord, RecordsResponse, SchemaEntry,
    SchemaListResponse, SchemaRefs, SearchProgressBody, normalize_records,
};
