//! Property tests for the offset cursor codec and filter serialization.
//!
//! Validates:
//! - `decode(encode(m)) == m` restricted to set entries
//! - `encode` output always decodes (never produces a malformed cursor)
//! - `Filter::build` is independent of construction order
//! - `Filter::parse(Filter::build(f)) == f`

use proptest::prelude::*;

use chrono::{TimeZone, Utc};
use topicscope_core::cursor::{self, PartitionOffsetMap};
use topicscope_core::{Filter, PartitionSelector, SortOrder};

// ── Strategies ───────────────────────────────────────────────────────

fn arb_offset_map() -> impl Strategy<Value = PartitionOffsetMap> {
    proptest::collection::vec(proptest::option::of(0..=u64::MAX), 0..24).prop_map(|entries| {
        let mut map = PartitionOffsetMap::with_partitions(entries.len());
        for (p, o) in entries.into_iter().enumerate() {
            map.set(p as u32, o);
        }
        map
    })
}

fn arb_filter_parts() -> impl Strategy<
    Value = (
        SortOrder,
        PartitionSelector,
        Option<i64>,
        Option<PartitionOffsetMap>,
        Option<String>,
    ),
> {
    (
        prop_oneof![Just(SortOrder::Oldest), Just(SortOrder::Newest)],
        prop_oneof![
            Just(PartitionSelector::All),
            (0u32..64).prop_map(PartitionSelector::Partition)
        ],
        proptest::option::of(0i64..4_102_444_800_000),
        proptest::option::of(arb_offset_map()),
        proptest::option::of(".{1,24}"),
    )
}

fn set_entries(map: &PartitionOffsetMap) -> Vec<(u32, u64)> {
    map.iter_set().collect()
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn decode_inverts_encode(map in arb_offset_map()) {
        let encoded = cursor::encode(&map);
        let decoded = cursor::decode(&encoded).expect("encoded cursor must decode");
        prop_assert_eq!(set_entries(&decoded), set_entries(&map));
    }

    #[test]
    fn encode_is_stable_after_roundtrip(map in arb_offset_map()) {
        let once = cursor::encode(&map);
        let twice = cursor::encode(&cursor::decode(&once).unwrap());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn build_ignores_construction_order(parts in arb_filter_parts()) {
        let (sort, partition, millis, offsets, search) = parts;
        let ts = millis.and_then(|m| Utc.timestamp_millis_opt(m).single());
        let after = offsets.map(|m| m.encode());

        let forward = Filter::default()
            .with_sort(sort)
            .with_partition(partition)
            .with_timestamp(ts)
            .with_after(after.clone())
            .with_search(search.clone());
        let backward = Filter::default()
            .with_search(search)
            .with_after(after)
            .with_timestamp(ts)
            .with_partition(partition)
            .with_sort(sort);

        prop_assert_eq!(&forward, &backward);
        prop_assert_eq!(forward.build(), backward.build());
    }

    #[test]
    fn parse_inverts_build(parts in arb_filter_parts()) {
        let (sort, partition, millis, offsets, search) = parts;
        let filter = Filter::default()
            .with_sort(sort)
            .with_partition(partition)
            .with_timestamp(millis.and_then(|m| Utc.timestamp_millis_opt(m).single()))
            .with_after(offsets.map(|m| m.encode()))
            .with_search(search);
        prop_assert_eq!(Filter::parse(&filter.build()), filter);
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn scenario_cursor_with_gap_roundtrips() {
    let map = cursor::decode("0-100_2-55").unwrap();
    assert_eq!(set_entries(&map), vec![(0, 100), (2, 55)]);
    assert_eq!(cursor::encode(&map), "0-100_2-55");
}

#[test]
fn scenario_sort_only() {
    let filter = Filter::default()
        .with_sort(SortOrder::Oldest)
        .with_partition(PartitionSelector::All);
    assert_eq!(filter.build(), "sort=Oldest");
}

#[test]
fn scenario_full_filter() {
    let filter = Filter::default()
        .with_sort(SortOrder::Newest)
        .with_partition("2".parse().unwrap())
        .with_timestamp(Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()))
        .with_search(Some("err".to_string()));
    assert_eq!(
        filter.build(),
        "sort=Newest&partition=2&timestamp=2023-01-01T00:00:00.000Z&search=err"
    );
}
