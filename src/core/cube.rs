//! CUBE expansion over every subset of rolled-up dimensions.
//!
//! Mask `m` (bit `j` set = dimension `j` rolled to ALL) is derived from its
//! parent `m & (m - 1)` by rolling the lowest set bit. Sum series are additive,
//! so the parent's cumulative series are added element-wise. Distinct counts
//! are not: each mask regroups the parent's first-seen map by (rolled tuple,
//! key) keeping the earliest bucket, then recounts.
//!
//! Masks are processed by popcount level. A level only reads finished parents
//! from the level below, so its masks run in parallel.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;
use tracing::{debug, info_span};

use super::cumulative::{assemble, FirstSeen, LeafAggregate, SumSeries};
use super::table::{CumulativeTable, DimensionTuple};

/// Aggregated state of one mask
#[derive(Debug, Clone)]
struct MaskAggregate {
    tuples: BTreeSet<DimensionTuple>,
    sums: SumSeries,
    first_seen: Vec<FirstSeen>,
}

impl MaskAggregate {
    /// Child mask with dimension `index` rolled up
    fn roll(&self, index: usize) -> MaskAggregate {
        let tuples = self.tuples.iter().map(|t| t.rolled(index)).collect();

        let mut sums: SumSeries = BTreeMap::new();
        for (tuple, series) in &self.sums {
            match sums.entry(tuple.rolled(index)) {
                Entry::Vacant(entry) => {
                    entry.insert(series.clone());
                }
                Entry::Occupied(mut entry) => {
                    for (acc, add) in entry.get_mut().iter_mut().zip(series) {
                        for (a, b) in acc.iter_mut().zip(add) {
                            *a += b;
                        }
                    }
                }
            }
        }

        let first_seen = self
            .first_seen
            .iter()
            .map(|seen| {
                let mut rolled: FirstSeen = HashMap::with_capacity(seen.len());
                for ((tuple, key), bucket) in seen {
                    rolled
                        .entry((tuple.rolled(index), key.clone()))
                        .and_modify(|b| *b = (*b).min(*bucket))
                        .or_insert(*bucket);
                }
                rolled
            })
            .collect();

        MaskAggregate {
            tuples,
            sums,
            first_seen,
        }
    }
}

/// Expands the leaf aggregate into every rollup combination.
///
/// The result holds the leaf tuples plus one group of tuples per non-empty
/// subset of rolled dimensions, all aligned to the same spine.
pub fn expand(leaf: LeafAggregate) -> CumulativeTable {
    let dims = leaf.dimensions.len();
    let mask_count = 1usize << dims;
    let _span = info_span!("cube_expand", dimensions = dims, masks = mask_count).entered();

    let LeafAggregate {
        dimensions,
        measures,
        spine,
        tuples,
        sums,
        first_seen,
    } = leaf;

    let mut arena: Vec<Option<MaskAggregate>> = (0..mask_count).map(|_| None).collect();
    arena[0] = Some(MaskAggregate {
        tuples,
        sums,
        first_seen,
    });

    for level in 1..=dims {
        let masks: Vec<usize> = (1..mask_count)
            .filter(|m| m.count_ones() as usize == level)
            .collect();

        let derived: Vec<(usize, MaskAggregate)> = masks
            .par_iter()
            .filter_map(|&mask| {
                let parent = mask & (mask - 1);
                let index = mask.trailing_zeros() as usize;
                arena[parent]
                    .as_ref()
                    .map(|aggregate| (mask, aggregate.roll(index)))
            })
            .collect();

        for (mask, aggregate) in derived {
            debug!(
                mask,
                rolled = %dimensions[mask.trailing_zeros() as usize],
                tuples = aggregate.tuples.len(),
                "derived rollup mask"
            );
            arena[mask] = Some(aggregate);
        }
    }

    let mut series = BTreeMap::new();
    for aggregate in arena.iter().flatten() {
        series.extend(assemble(
            &aggregate.tuples,
            &aggregate.sums,
            &aggregate.first_seen,
            &measures,
            &spine,
        ));
    }

    CumulativeTable {
        dimensions,
        measures,
        spine,
        series,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contract::Measure;
    use crate::core::cumulative::{aggregate, PreparedInput, PreparedRow};
    use crate::core::spine::{Bucket, TimeSpine};
    use crate::core::table::DimValue;

    fn row(dims: &[&str], minute: i64, cost: f64, uid: &str) -> PreparedRow {
        PreparedRow {
            tuple: DimensionTuple::leaf(dims.iter().map(|d| d.to_string()).collect()),
            bucket: Bucket::containing(minute),
            sums: vec![cost],
            keys: vec![Some(uid.to_string())],
        }
    }

    fn input(dimensions: &[&str], rows: Vec<PreparedRow>) -> PreparedInput {
        PreparedInput {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            measures: vec![
                Measure::distinct("uid", "user_num"),
                Measure::sum("cost", "cost"),
            ],
            rows,
        }
    }

    #[test]
    fn test_distinct_is_not_additive_across_rollup() {
        let spine = TimeSpine::new(202512300120, 202512300130).unwrap();
        let rows = vec![
            row(&["x"], 202512300121, 1.0, "u1"),
            row(&["y"], 202512300131, 2.0, "u1"),
        ];
        let table = expand(aggregate(&input(&["d1"], rows), &spine));

        let all = DimensionTuple(vec![DimValue::All]);
        let x = DimensionTuple::leaf(vec!["x".into()]);
        let y = DimensionTuple::leaf(vec!["y".into()]);
        assert_eq!(table.series_for(&all, "user_num"), Some(&[1.0, 1.0][..]));
        assert_eq!(table.series_for(&x, "user_num"), Some(&[1.0, 1.0][..]));
        assert_eq!(table.series_for(&y, "user_num"), Some(&[0.0, 1.0][..]));
        assert_eq!(table.series_for(&all, "cost"), Some(&[1.0, 3.0][..]));
    }

    #[test]
    fn test_two_dimensions_produce_all_masks() {
        let spine = TimeSpine::new(202512300120, 202512300120).unwrap();
        let rows = vec![
            row(&["a", "p"], 202512300121, 1.0, "u1"),
            row(&["a", "q"], 202512300122, 2.0, "u2"),
            row(&["b", "p"], 202512300123, 4.0, "u1"),
        ];
        let table = expand(aggregate(&input(&["d1", "d2"], rows), &spine));

        // 3 leaf + 2 (d1 rolled) + 2 (d2 rolled) + 1 (both rolled)
        assert_eq!(table.series.len(), 8);

        let both = DimensionTuple(vec![DimValue::All, DimValue::All]);
        assert_eq!(table.series_for(&both, "user_num"), Some(&[2.0][..]));
        assert_eq!(table.series_for(&both, "cost"), Some(&[7.0][..]));

        let p_over_d1 = DimensionTuple(vec![DimValue::All, DimValue::from("p")]);
        assert_eq!(table.series_for(&p_over_d1, "user_num"), Some(&[1.0][..]));
        assert_eq!(table.series_for(&p_over_d1, "cost"), Some(&[5.0][..]));

        let a_over_d2 = DimensionTuple(vec![DimValue::from("a"), DimValue::All]);
        assert_eq!(table.series_for(&a_over_d2, "user_num"), Some(&[2.0][..]));
    }

    #[test]
    fn test_rollup_keeps_earliest_first_seen() {
        let spine = TimeSpine::new(202512300110, 202512300130).unwrap();
        let rows = vec![
            row(&["x"], 202512300131, 0.0, "u1"),
            row(&["y"], 202512300112, 0.0, "u1"),
        ];
        let table = expand(aggregate(&input(&["d1"], rows), &spine));
        let all = DimensionTuple(vec![DimValue::All]);
        assert_eq!(
            table.series_for(&all, "user_num"),
            Some(&[1.0, 1.0, 1.0][..])
        );
    }

    #[test]
    fn test_leaf_slice_matches_unrolled_table() {
        let spine = TimeSpine::new(202512300110, 202512300130).unwrap();
        let rows = vec![
            row(&["a", "p"], 202512300111, 1.5, "u1"),
            row(&["a", "q"], 202512300125, 2.0, "u2"),
            row(&["b", "p"], 202512300133, 4.0, "u3"),
        ];
        let input = input(&["d1", "d2"], rows);
        let plain = aggregate(&input, &spine).into_table();
        let cubed = expand(aggregate(&input, &spine));
        assert_eq!(cubed.leaf_slice(), plain.leaf_slice());
    }

    #[test]
    fn test_no_dimensions_is_identity() {
        let spine = TimeSpine::new(202512300110, 202512300110).unwrap();
        let table = expand(aggregate(
            &input(&[], vec![row(&[], 202512300111, 2.0, "u1")]),
            &spine,
        ));
        assert_eq!(table.series.len(), 1);
        assert_eq!(
            table.series_for(&DimensionTuple::default(), "cost"),
            Some(&[2.0][..])
        );
    }
}
