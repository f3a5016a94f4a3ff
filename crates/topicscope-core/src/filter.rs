//! Filter selection and its canonical query-string form.
//!
//! The query string is both the request sent to the backend and the state
//! persisted in navigable history, so `build` is deterministic: parameters are
//! always emitted in the order `sort`, `after`, `partition`, `timestamp`,
//! `search`, and only when non-empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cursor::{self, PartitionOffsetMap};
use crate::error::{Error, Result};
use crate::query;
use crate::timestamps;

// ────────────────────────────────────────────────────────────────────
// SortOrder
// ────────────────────────────────────────────────────────────────────

/// Which end of each partition to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Oldest,
    Newest,
}

impl SortOrder {
    pub const ALL: [Self; 2] = [Self::Oldest, Self::Newest];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oldest => "Oldest",
            Self::Newest => "Newest",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Oldest" | "oldest" => Ok(Self::Oldest),
            "Newest" | "newest" => Ok(Self::Newest),
            other => Err(Error::MalformedFilterQuery(format!(
                "sort must be Oldest or Newest, got {other:?}"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────
// PartitionSelector
// ────────────────────────────────────────────────────────────────────

/// Restrict the view to one partition, or show all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PartitionSelector {
    #[default]
    All,
    Partition(u32),
}

impl fmt::Display for PartitionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Partition(p) => write!(f, "{p}"),
        }
    }
}

impl FromStr for PartitionSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        trimmed.parse::<u32>().map(Self::Partition).map_err(|_| {
            Error::MalformedFilterQuery(format!(
                "partition must be All or a partition index, got {trimmed:?}"
            ))
        })
    }
}

/// Options for the partition picker: `All`, then `0..partition_count`.
#[must_use]
pub fn partition_options(partition_count: usize) -> Vec<PartitionSelector> {
    std::iter::once(PartitionSelector::All)
        .chain((0..partition_count).map(|p| PartitionSelector::Partition(p as u32)))
        .collect()
}

// ────────────────────────────────────────────────────────────────────
// Filter
// ────────────────────────────────────────────────────────────────────

/// The operator's current filter selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub sort: SortOrder,
    pub partition: PartitionSelector,
    /// Lower bound on record timestamps.
    pub timestamp: Option<DateTime<Utc>>,
    /// Per-partition resume cursor (`0-100_2-55`).
    pub after: Option<String>,
    /// Free-text search term.
    pub search: Option<String>,
}

impl Filter {
    #[must_use]
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_partition(mut self, partition: PartitionSelector) -> Self {
        self.partition = partition;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.set_timestamp(timestamp);
        self
    }

    #[must_use]
    pub fn with_after(mut self, after: Option<String>) -> Self {
        self.set_after(after);
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.set_search(search);
        self
    }

    /// Store the timestamp at the precision the query can carry.
    pub fn set_timestamp(&mut self, timestamp: Option<DateTime<Utc>>) {
        self.timestamp = timestamp.map(timestamps::truncate_to_millis);
    }

    /// Empty cursors are stored as `None`.
    pub fn set_after(&mut self, after: Option<String>) {
        self.after = after.filter(|a| !a.trim().is_empty());
    }

    /// Empty search terms are stored as `None`.
    pub fn set_search(&mut self, search: Option<String>) {
        self.search = search.filter(|s| !s.is_empty());
    }

    /// The trimmed search term, if one is set.
    #[must_use]
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }

    /// Offsets encoded in the `after` cursor, or an empty map.
    #[must_use]
    pub fn offsets(&self) -> PartitionOffsetMap {
        self.after
            .as_deref()
            .and_then(|a| cursor::decode(a).ok())
            .unwrap_or_default()
    }

    /// Serialize to the canonical query string.
    #[must_use]
    pub fn build(&self) -> String {
        let mut params: Vec<(&'static str, String)> = Vec::with_capacity(5);
        params.push(("sort", self.sort.as_str().to_string()));
        if let Some(after) = self.after.as_deref().filter(|a| !a.is_empty()) {
            params.push(("after", query::encode_value(after)));
        }
        if let PartitionSelector::Partition(p) = self.partition {
            params.push(("partition", p.to_string()));
        }
        if let Some(ts) = &self.timestamp {
            params.push(("timestamp", timestamps::format_millis_z(ts)));
        }
        if let Some(search) = self.search_term() {
            params.push(("search", query::encode_value(search)));
        }
        query::join(&params)
    }

    /// Restore a filter from a query string, falling back per field.
    ///
    /// Never fails: the view always has something to render. Unknown keys are
    /// ignored; a malformed value leaves that field at its default.
    #[must_use]
    pub fn parse(query_string: &str) -> Self {
        let (filter, problems) = Self::parse_collecting(query_string);
        for problem in &problems {
            tracing::debug!(error = %problem, "filter query field fell back to default");
        }
        filter
    }

    /// Like [`Filter::parse`], but report the first malformed field.
    pub fn parse_strict(query_string: &str) -> Result<Self> {
        let (filter, mut problems) = Self::parse_collecting(query_string);
        if problems.is_empty() {
            Ok(filter)
        } else {
            Err(problems.swap_remove(0))
        }
    }

    fn parse_collecting(query_string: &str) -> (Self, Vec<Error>) {
        let mut filter = Self::default();
        let mut problems = Vec::new();
        for (key, value) in query::pairs(query_string) {
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "sort" => match value.parse() {
                    Ok(sort) => filter.sort = sort,
                    Err(err) => problems.push(err),
                },
                "partition" => match value.parse() {
                    Ok(partition) => filter.partition = partition,
                    Err(err) => problems.push(err),
                },
                "timestamp" => match timestamps::parse_instant(&value) {
                    Some(ts) => filter.set_timestamp(Some(ts)),
                    None => problems.push(Error::MalformedFilterQuery(format!(
                        "timestamp {value:?} is not an ISO-8601 instant"
                    ))),
                },
                "after" => match cursor::decode(&value) {
                    Ok(_) => filter.set_after(Some(value)),
                    Err(err) => problems.push(err),
                },
                "search" => filter.set_search(Some(value)),
                _ => {}
            }
        }
        (filter, problems)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn default_filter_serializes_to_sort_only() {
        let f = Filter::default()
            .with_sort(SortOrder::Oldest)
            .with_partition(PartitionSelector::All);
        assert_eq!(f.build(), "sort=Oldest");
    }

    #[test]
    fn full_filter_serializes_in_fixed_order() {
        let f = Filter::default()
            .with_search(Some("err".into()))
            .with_timestamp(Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()))
            .with_partition(PartitionSelector::Partition(2))
            .with_sort(SortOrder::Newest);
        assert_eq!(
            f.build(),
            "sort=Newest&partition=2&timestamp=2023-01-01T00:00:00.000Z&search=err"
        );
    }

    #[test]
    fn after_sits_between_sort_and_partition() {
        let f = Filter::default()
            .with_partition(PartitionSelector::Partition(0))
            .with_after(Some("0-100_2-55".into()));
        assert_eq!(f.build(), "sort=Oldest&after=0-100_2-55&partition=0");
    }

    #[test]
    fn timestamp_is_normalized_to_utc() {
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let local = tz.with_ymd_and_hms(2023, 3, 4, 19, 0, 0).unwrap();
        let f = Filter::default().with_timestamp(Some(local.with_timezone(&Utc)));
        assert_eq!(f.build(), "sort=Oldest&timestamp=2023-03-05T00:00:00.000Z");
    }

    #[test]
    fn empty_strings_are_not_serialized() {
        let f = Filter::default()
            .with_after(Some(String::new()))
            .with_search(Some(String::new()));
        assert_eq!(f.build(), "sort=Oldest");
    }

    #[test]
    fn search_term_is_percent_encoded() {
        let f = Filter::default().with_search(Some("a b&c".into()));
        assert_eq!(f.build(), "sort=Oldest&search=a%20b%26c");
        assert_eq!(Filter::parse(&f.build()), f);
    }

    #[test]
    fn parse_round_trips_build() {
        let f = Filter::default()
            .with_sort(SortOrder::Newest)
            .with_partition(PartitionSelector::Partition(3))
            .with_timestamp(Some(Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()))
            .with_after(Some("0-1_3-9".into()))
            .with_search(Some("timeout".into()));
        assert_eq!(Filter::parse(&f.build()), f);
    }

    #[test]
    fn parse_falls_back_per_field() {
        let f =
            Filter::parse("?sort=Sideways&partition=x&timestamp=nope&after=bad&search=ok&zzz=1");
        assert_eq!(f.sort, SortOrder::Oldest);
        assert_eq!(f.partition, PartitionSelector::All);
        assert_eq!(f.timestamp, None);
        assert_eq!(f.after, None);
        assert_eq!(f.search.as_deref(), Some("ok"));
    }

    #[test]
    fn parse_of_garbage_is_default() {
        assert_eq!(Filter::parse("%%%&&==="), Filter::default());
        assert_eq!(Filter::parse(""), Filter::default());
    }

    #[test]
    fn parse_strict_reports_first_problem() {
        let err = Filter::parse_strict("sort=Newest&partition=-1").unwrap_err();
        assert!(matches!(err, Error::MalformedFilterQuery(_)));
        let err = Filter::parse_strict("after=0-").unwrap_err();
        assert!(matches!(err, Error::MalformedCursor(_)));
        assert!(Filter::parse_strict("sort=Newest&partition=All").is_ok());
    }

    #[test]
    fn partition_options_start_with_all() {
        assert_eq!(
            partition_options(3),
            vec![
                PartitionSelector::All,
                PartitionSelector::Partition(0),
                PartitionSelector::Partition(1),
                PartitionSelector::Partition(2),
            ]
        );
        assert_eq!(partition_options(0), vec![PartitionSelector::All]);
    }

    #[test]
    fn offsets_decode_from_after() {
        let f = Filter::default().with_after(Some("1-10".into()));
        assert_eq!(f.offsets().get(1), Some(10));
        assert!(Filter::default().offsets().is_empty());
    }

    #[test]
    fn after_with_highest_partition_parses_cheaply() {
        let f = Filter::parse("after=4294967295-0");
        assert_eq!(f.after.as_deref(), Some("4294967295-0"));
        assert_eq!(f.offsets().get(u32::MAX), Some(0));
        assert_eq!(f.build(), "sort=Oldest&after=4294967295-0");
    }
}
