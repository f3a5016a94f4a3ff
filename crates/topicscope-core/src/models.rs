//! Data models for Topicscope
//!
//! `Raw*` types mirror the backend's JSON exactly; everything else is the
//! normalized form the view works with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cursor::NextPage;
use crate::error::Result;

/// Literal shown for an absent key or value.
pub const NULL_LITERAL: &str = "null";

// =============================================================================
// Records
// =============================================================================

/// One record as returned by the paginated or streaming endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub partition: u32,
    pub offset: u64,
    /// Either an object of header name to value, or a list of `{key, value}`.
    #[serde(default)]
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub key_schema_id: Option<i64>,
    #[serde(default)]
    pub value_schema_id: Option<i64>,
}

/// Schema ids attached to a record's key and value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRefs {
    pub key_schema_id: Option<i64>,
    pub value_schema_id: Option<i64>,
}

/// A normalized record, ready to display.
///
/// # Normalization
/// - absent `key`/`value` become the literal `"null"`
/// - absent headers become an empty map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub key: String,
    pub value: String,
    /// ISO-8601 as produced by the backend (empty when absent).
    pub timestamp: String,
    pub partition: u32,
    pub offset: u64,
    pub headers: BTreeMap<String, String>,
    pub schema: SchemaRefs,
}

impl From<RawRecord> for MessageRecord {
    fn from(raw: RawRecord) -> Self {
        Self {
            key: raw.key.unwrap_or_else(|| NULL_LITERAL.to_string()),
            value: raw.value.unwrap_or_else(|| NULL_LITERAL.to_string()),
            timestamp: raw.timestamp.unwrap_or_default(),
            partition: raw.partition,
            offset: raw.offset,
            headers: normalize_headers(raw.headers),
            schema: SchemaRefs {
                key_schema_id: raw.key_schema_id,
                value_schema_id: raw.value_schema_id,
            },
        }
    }
}

/// Normalize a batch of raw records, preserving order.
#[must_use]
pub fn normalize_records(raw: Vec<RawRecord>) -> Vec<MessageRecord> {
    raw.into_iter().map(MessageRecord::from).collect()
}

fn normalize_headers(raw: Option<serde_json::Value>) -> BTreeMap<String, String> {
    fn text(v: &serde_json::Value) -> String {
        match v {
            serde_json::Value::Null => NULL_LITERAL.to_string(),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    let mut out = BTreeMap::new();
    match raw {
        Some(serde_json::Value::Object(map)) => {
            for (k, v) in &map {
                out.insert(k.clone(), text(v));
            }
        }
        Some(serde_json::Value::Array(items)) => {
            for item in &items {
                if let Some(k) = item.get("key").and_then(serde_json::Value::as_str) {
                    let v = item.get("value").map_or_else(|| NULL_LITERAL.to_string(), text);
                    out.insert(k.to_string(), v);
                }
            }
        }
        _ => {}
    }
    out
}

// =============================================================================
// Paginated endpoint
// =============================================================================

/// Body of the paginated records endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsResponse {
    #[serde(default)]
    pub results: Option<Vec<RawRecord>>,
    /// Next-page token; absent once the topic is exhausted.
    #[serde(default)]
    pub after: Option<String>,
    /// Total record count for the current filter.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub can_delete_records: Option<bool>,
}

/// One page of records plus pagination state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub records: Vec<MessageRecord>,
    pub total_size: u64,
    pub next: Option<NextPage>,
    pub can_delete_records: bool,
    /// 1-based page number shown by the pager.
    pub page_number: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            total_size: 0,
            next: None,
            can_delete_records: false,
            page_number: 1,
        }
    }
}

impl Page {
    /// Build page 1 from a backend response.
    #[must_use]
    pub fn from_response(resp: RecordsResponse) -> Self {
        Self {
            records: normalize_records(resp.results.unwrap_or_default()),
            total_size: resp.size.unwrap_or(0),
            next: resp
                .after
                .filter(|a| !a.trim().is_empty())
                .map(NextPage::new),
            can_delete_records: resp.can_delete_records.unwrap_or(false),
            page_number: 1,
        }
    }

    /// Whether the pager should offer no further page.
    #[must_use]
    pub fn is_last_page(&self) -> bool {
        self.next.is_none() || self.records.is_empty()
    }
}

// =============================================================================
// Auxiliary endpoints
// =============================================================================

/// One entry of the partitions listing. Only the count matters to the view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub leader: Option<serde_json::Value>,
}

/// One entry of the schema registry listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub id: i64,
    pub subject: String,
}

/// Body of the schema registry listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaListResponse {
    #[serde(default)]
    pub results: Vec<SchemaEntry>,
}

/// Body of a `progress` event on the streaming search endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchProgressBody {
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub records: Option<Vec<RawRecord>>,
    #[serde(default)]
    pub after: Option<String>,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Permissions the controller needs, passed in explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_access_schema: bool,
}

impl Capabilities {
    /// Derive capabilities from a role document such as
    /// `{"registry": {"registry/read": true}}`.
    pub fn from_roles_json(roles: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(roles)?;
        let can_access_schema = value
            .get("registry")
            .and_then(|r| r.get("registry/read"))
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Ok(Self { can_access_schema })
    }
}
