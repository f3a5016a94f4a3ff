//! Per-partition offset cursor.
//!
//! The backend hands out an opaque resume token for forward pagination. Its
//! `after` fragment lists, for every partition that advanced, `partition-offset`
//! pairs joined by `_`:
//!
//! ```text
//! 0-100_2-55      partition 0 at offset 100, partition 2 at offset 55
//! ```
//!
//! Partitions absent from a cursor are *unset*, never "exhausted".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::query;

/// Separator between partition entries.
pub const PARTITION_SEPARATOR: char = '_';

/// Separator between a partition index and its offset.
pub const OFFSET_SEPARATOR: char = '-';

// ────────────────────────────────────────────────────────────────────
// PartitionOffsetMap
// ────────────────────────────────────────────────────────────────────

/// Offsets keyed by partition index, covering partitions `0..len`.
///
/// Only set entries are stored, so a cursor naming partition `4294967295`
/// costs one entry. `None` from [`get`](Self::get) means unset, which is
/// distinct from offset `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionOffsetMap {
    partition_count: usize,
    offsets: BTreeMap<u32, u64>,
}

impl PartitionOffsetMap {
    /// An all-unset map covering `0..partition_count`.
    #[must_use]
    pub const fn with_partitions(partition_count: usize) -> Self {
        Self {
            partition_count,
            offsets: BTreeMap::new(),
        }
    }

    /// Cover exactly `0..partition_count`, dropping entries past the end.
    pub fn resize(&mut self, partition_count: usize) {
        self.partition_count = partition_count;
        self.offsets
            .retain(|&partition, _| (partition as usize) < partition_count);
    }

    /// Number of partitions covered (set or unset).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.partition_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[must_use]
    pub fn get(&self, partition: u32) -> Option<u64> {
        self.offsets.get(&partition).copied()
    }

    /// Set or clear the offset of `partition`, extending the covered range if needed.
    pub fn set(&mut self, partition: u32, offset: Option<u64>) {
        let end = (partition as usize).saturating_add(1);
        self.partition_count = self.partition_count.max(end);
        match offset {
            Some(offset) => {
                self.offsets.insert(partition, offset);
            }
            None => {
                self.offsets.remove(&partition);
            }
        }
    }

    /// Apply raw text from an offset input box.
    ///
    /// An empty (or whitespace) input clears the entry.
    pub fn set_input(&mut self, partition: u32, raw: &str) -> Result<()> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            self.set(partition, None);
            return Ok(());
        }
        let offset = parse_unsigned(trimmed).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "offset for partition {partition} must be a non-negative integer, got {trimmed:?}"
            ))
        })?;
        self.set(partition, Some(offset));
        Ok(())
    }

    /// Iterate `(partition, offset)` for set entries in ascending partition order.
    pub fn iter_set(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.offsets.iter().map(|(&p, &o)| (p, o))
    }

    /// Encode the set entries as a cursor string (empty when nothing is set).
    #[must_use]
    pub fn encode(&self) -> String {
        encode(self)
    }
}

// ────────────────────────────────────────────────────────────────────
// Codec
// ────────────────────────────────────────────────────────────────────

/// Decode a cursor string into a map.
///
/// The result covers `0..=max_partition_present` without allocating for the
/// gaps; partitions missing from the cursor stay unset. Callers resize to the
/// live partition count afterwards.
pub fn decode(cursor: &str) -> Result<PartitionOffsetMap> {
    let mut map = PartitionOffsetMap::default();
    let trimmed = cursor.trim();
    if trimmed.is_empty() {
        return Ok(map);
    }
    for token in trimmed.split(PARTITION_SEPARATOR) {
        let mut parts = token.split(OFFSET_SEPARATOR);
        let (Some(partition), Some(offset), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::MalformedCursor(format!(
                "token {token:?} in {cursor:?} must be partition{OFFSET_SEPARATOR}offset"
            )));
        };
        let partition = parse_unsigned(partition)
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(|| {
                Error::MalformedCursor(format!("bad partition {partition:?} in {cursor:?}"))
            })?;
        let offset = parse_unsigned(offset).ok_or_else(|| {
            Error::MalformedCursor(format!("bad offset {offset:?} in {cursor:?}"))
        })?;
        map.set(partition, Some(offset));
    }
    Ok(map)
}

/// Encode the set entries of `map` in ascending partition order.
#[must_use]
pub fn encode(map: &PartitionOffsetMap) -> String {
    let mut out = String::new();
    for (partition, offset) in map.iter_set() {
        if !out.is_empty() {
            out.push(PARTITION_SEPARATOR);
        }
        out.push_str(&partition.to_string());
        out.push(OFFSET_SEPARATOR);
        out.push_str(&offset.to_string());
    }
    out
}

/// Digits only; rejects signs, whitespace, and empty strings.
fn parse_unsigned(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

// ────────────────────────────────────────────────────────────────────
// NextPage: the backend's next-page token
// ────────────────────────────────────────────────────────────────────

/// Next-page token as returned by the paginated records endpoint.
///
/// Usually a relative link whose query carries the full filter plus the
/// backend-assigned `after` cursor; a bare cursor is also accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NextPage(String);

impl NextPage {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is a link (as opposed to a bare cursor).
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.0.contains('?')
    }

    /// Query portion of the link; for a bare cursor, `after=<cursor>`.
    #[must_use]
    pub fn query(&self) -> String {
        if self.is_link() {
            query::query_part(&self.0).to_string()
        } else {
            format!("after={}", query::encode_value(&self.0))
        }
    }

    /// The `after` cursor this token resumes from, if any.
    #[must_use]
    pub fn after(&self) -> Option<String> {
        if self.is_link() {
            query::get(query::query_part(&self.0), "after")
        } else if self.0.trim().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }

    /// Decode the `after` cursor, treating a malformed or missing one as empty.
    #[must_use]
    pub fn offsets(&self) -> PartitionOffsetMap {
        self.after()
            .and_then(|after| match decode(&after) {
                Ok(map) => Some(map),
                Err(err) => {
                    tracing::debug!(error = %err, "ignoring malformed next-page cursor");
                    None
                }
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for NextPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_two_partitions_with_gap() {
        let map = decode("0-100_2-55").unwrap();
        assert_eq!(map.get(0), Some(100));
        assert_eq!(map.get(1), None);
        assert_eq!(map.get(2), Some(55));
        assert_eq!(map.len(), 3);
        assert_eq!(map.encode(), "0-100_2-55");
    }

    #[test]
    fn decode_empty_is_empty_map() {
        let map = decode("").unwrap();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn decode_rejects_malformed_tokens() {
        for bad in ["0", "0-", "-5", "0-1-2", "a-1", "0-b", "0-1__1-2", "0--1", "0-+1", "0-1_"] {
            assert!(
                matches!(decode(bad), Err(Error::MalformedCursor(_))),
                "expected MalformedCursor for {bad:?}"
            );
        }
    }

    #[test]
    fn decode_keeps_last_duplicate() {
        let map = decode("1-5_1-9").unwrap();
        assert_eq!(map.get(1), Some(9));
    }

    #[test]
    fn zero_offset_is_distinct_from_unset() {
        let mut map = PartitionOffsetMap::with_partitions(2);
        map.set(1, Some(0));
        assert_eq!(map.get(0), None);
        assert_eq!(map.get(1), Some(0));
        assert_eq!(map.encode(), "1-0");
    }

    #[test]
    fn resize_keeps_entries_and_fills_unset() {
        let mut map = decode("1-7").unwrap();
        map.resize(4);
        assert_eq!(map.len(), 4);
        assert_eq!(map.get(1), Some(7));
        assert_eq!(map.get(3), None);
        map.resize(1);
        assert_eq!(map.len(), 1);
        assert!(map.is_empty());
    }

    #[test]
    fn set_input_parses_or_clears() {
        let mut map = PartitionOffsetMap::with_partitions(3);
        map.set_input(0, "42").unwrap();
        map.set_input(2, " 7 ").unwrap();
        assert_eq!(map.encode(), "0-42_2-7");
        map.set_input(0, "").unwrap();
        assert_eq!(map.encode(), "2-7");
        assert!(matches!(
            map.set_input(1, "-3"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn huge_partition_index_stores_one_entry() {
        let map = decode("4294967295-0").unwrap();
        assert_eq!(map.get(u32::MAX), Some(0));
        assert_eq!(map.iter_set().count(), 1);
        assert_eq!(map.encode(), "4294967295-0");

        let mut map = decode("50000000-1_0-3").unwrap();
        assert_eq!(map.len(), 50_000_001);
        map.resize(3);
        assert_eq!(map.encode(), "0-3");
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn next_page_link_exposes_query_and_after() {
        let next =
            NextPage::new("/api/local/topic/orders/data?sort=Oldest&after=0-100_2-55&partition=2");
        assert!(next.is_link());
        assert_eq!(next.query(), "sort=Oldest&after=0-100_2-55&partition=2");
        assert_eq!(next.after().as_deref(), Some("0-100_2-55"));
        assert_eq!(next.offsets().get(2), Some(55));
    }

    #[test]
    fn next_page_bare_cursor() {
        let next = NextPage::new("3-9");
        assert!(!next.is_link());
        assert_eq!(next.query(), "after=3-9");
        assert_eq!(next.after().as_deref(), Some("3-9"));
    }

    #[test]
    fn next_page_with_malformed_cursor_yields_empty_offsets() {
        let next = NextPage::new("/api/c/topic/t/data?after=garbage");
        assert!(next.offsets().is_empty());
    }
}
