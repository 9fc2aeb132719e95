//! Property-based tests for the cumulative core and the CUBE engine.
//!
//! Covers: the cumulative sum and distinct definitions, monotonicity, sum
//! additivity and distinct non-additivity under rollup, and the leaf slice of
//! the expanded table matching the plain leaf table.

use std::collections::HashSet;

use cumcube::core::cube::expand;
use cumcube::core::{aggregate, Bucket, PreparedInput, PreparedRow};
use cumcube::{CumulativeTable, DimValue, DimensionTuple, Measure, TimeSpine};
use proptest::prelude::*;

const START: i64 = 202512300000;
const SPINE_LEN: i64 = 6;

fn spine() -> TimeSpine {
    TimeSpine::new(START, START + 10 * (SPINE_LEN - 1)).unwrap()
}

/// Strategy for one prepared row: two small dimensions, a bucket inside the
/// spine, an optional key and an integral cost so sums stay exact.
fn arb_row() -> impl Strategy<Value = PreparedRow> {
    (0..3usize, 0..2usize, 0..SPINE_LEN, 0..6usize, 0..100u32).prop_map(
        |(a, b, offset, key, cost)| PreparedRow {
            tuple: DimensionTuple::leaf(vec![format!("a{a}"), format!("b{b}")]),
            bucket: Bucket::containing(START + 10 * offset),
            sums: vec![f64::from(cost)],
            keys: vec![(key < 5).then(|| format!("u{key}"))],
        },
    )
}

fn arb_input() -> impl Strategy<Value = PreparedInput> {
    prop::collection::vec(arb_row(), 1..40).prop_map(|rows| PreparedInput {
        dimensions: vec!["a".into(), "b".into()],
        measures: vec![
            Measure::distinct("uid", "user_num"),
            Measure::sum("cost", "cost"),
        ],
        rows,
    })
}

fn covers(tuple: &DimensionTuple, leaf: &DimensionTuple) -> bool {
    tuple
        .values()
        .iter()
        .zip(leaf.values())
        .all(|(t, l)| *t == DimValue::All || t == l)
}

/// Expected values straight from the rows: (cumulative cost, distinct keys)
fn expected(input: &PreparedInput, tuple: &DimensionTuple, bucket: Bucket) -> (f64, usize) {
    let rows: Vec<&PreparedRow> = input
        .rows
        .iter()
        .filter(|r| covers(tuple, &r.tuple) && r.bucket <= bucket)
        .collect();
    let cost: f64 = rows.iter().map(|r| r.sums[0]).sum();
    let keys: HashSet<&String> = rows.iter().filter_map(|r| r.keys[0].as_ref()).collect();
    (cost, keys.len())
}

fn all_tuples(table: &CumulativeTable) -> Vec<DimensionTuple> {
    table.tuples().cloned().collect()
}

proptest! {
    /// Leaf cumulative values match their definition at every spine point.
    #[test]
    fn leaf_matches_definition(input in arb_input()) {
        let spine = spine();
        let table = aggregate(&input, &spine).into_table();
        for tuple in all_tuples(&table) {
            for &bucket in spine.buckets() {
                let (cost, users) = expected(&input, &tuple, bucket);
                prop_assert_eq!(table.value(&tuple, bucket, "cost"), Some(cost));
                prop_assert_eq!(table.value(&tuple, bucket, "user_num"), Some(users as f64));
            }
        }
    }

    /// Every series is non-decreasing in time.
    #[test]
    fn series_are_monotone(input in arb_input()) {
        let table = expand(aggregate(&input, &spine()));
        for tuple in all_tuples(&table) {
            for output in ["user_num", "cost"] {
                let series = table.series_for(&tuple, output).unwrap();
                prop_assert!(series.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    /// Rolled-up tuples match the definition over the leaves they cover.
    #[test]
    fn rollups_match_definition(input in arb_input()) {
        let spine = spine();
        let table = expand(aggregate(&input, &spine));
        prop_assert!(table.tuples().any(|t| !t.is_leaf()));
        for tuple in all_tuples(&table) {
            let bucket = spine.buckets()[spine.len() - 1];
            let (cost, users) = expected(&input, &tuple, bucket);
            prop_assert_eq!(table.value(&tuple, bucket, "cost"), Some(cost));
            prop_assert_eq!(table.value(&tuple, bucket, "user_num"), Some(users as f64));
        }
    }

    /// The grand total is additive for sums but not for distinct counts: it
    /// lies between the largest child and the sum of the children.
    #[test]
    fn grand_total_bounds(input in arb_input()) {
        let spine = spine();
        let table = expand(aggregate(&input, &spine));
        let total = DimensionTuple(vec![DimValue::All, DimValue::All]);
        let leaves: Vec<DimensionTuple> = table.tuples().filter(|t| t.is_leaf()).cloned().collect();

        for &bucket in spine.buckets() {
            let child_costs: f64 = leaves
                .iter()
                .filter_map(|t| table.value(t, bucket, "cost"))
                .sum();
            prop_assert_eq!(table.value(&total, bucket, "cost"), Some(child_costs));

            let child_users: Vec<f64> = leaves
                .iter()
                .filter_map(|t| table.value(t, bucket, "user_num"))
                .collect();
            let users = table.value(&total, bucket, "user_num").unwrap();
            prop_assert!(users <= child_users.iter().sum::<f64>());
            prop_assert!(child_users.iter().all(|&c| c <= users));
        }
    }

    /// The leaf slice of the expanded table is the plain leaf table.
    #[test]
    fn leaf_slice_matches_plain(input in arb_input()) {
        let spine = spine();
        let plain = aggregate(&input, &spine).into_table();
        let cubed = expand(aggregate(&input, &spine));
        prop_assert_eq!(plain.leaf_slice(), cubed.leaf_slice());
        prop_assert_eq!(plain.tuples().count(), cubed.leaf_slice().len());
    }
}
