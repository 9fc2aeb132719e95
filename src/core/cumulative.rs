//! Leaf-level cumulative aggregation.
//!
//! Sums are bucketed per (tuple, bucket) and prefix-summed over the spine.
//! Distinct measures keep the first bucket each key appeared in per tuple; the
//! number of first appearances per bucket is then prefix-summed the same way.
//! Both paths share `fill_series`, so every series is spine-aligned and
//! forward-filled.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::contract::Measure;
use super::spine::{Bucket, TimeSpine};
use super::table::{CumulativeTable, DimensionTuple};

/// One record after validation, normalization and bucketing
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
    pub tuple: DimensionTuple,
    pub bucket: Bucket,
    /// One value per sum measure, contract order
    pub sums: Vec<f64>,
    /// One key per distinct measure, `None` when the key is not valid
    pub keys: Vec<Option<String>>,
}

/// Rows ready for aggregation, with the dimension and measure layout they follow
#[derive(Debug, Clone, Default)]
pub struct PreparedInput {
    pub dimensions: Vec<String>,
    pub measures: Vec<Measure>,
    pub rows: Vec<PreparedRow>,
}

/// Cumulative sum series per tuple: `[sum measure][spine point]`
pub type SumSeries = BTreeMap<DimensionTuple, Vec<Vec<f64>>>;

/// First bucket each (tuple, key) pair was seen in
pub type FirstSeen = HashMap<(DimensionTuple, String), Bucket>;

/// Where a measure's values live: index into the sum or the distinct slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Sum(usize),
    Distinct(usize),
}

pub(crate) fn layout(measures: &[Measure]) -> Vec<Slot> {
    let mut sums = 0;
    let mut distincts = 0;
    measures
        .iter()
        .map(|m| match m {
            Measure::Sum { .. } => {
                sums += 1;
                Slot::Sum(sums - 1)
            }
            Measure::Distinct { .. } => {
                distincts += 1;
                Slot::Distinct(distincts - 1)
            }
        })
        .collect()
}

/// Prefix sum of `deltas` sampled at each spine point.
///
/// `deltas` must be ordered by bucket. Deltas before the first spine point are
/// included in it; points before any activity are 0.
pub fn fill_series(deltas: impl IntoIterator<Item = (Bucket, f64)>, spine: &TimeSpine) -> Vec<f64> {
    let mut deltas = deltas.into_iter().peekable();
    let mut running = 0.0;
    spine
        .buckets()
        .iter()
        .map(|bucket| {
            while let Some((_, delta)) = deltas.next_if(|(b, _)| b <= bucket) {
                running += delta;
            }
            running
        })
        .collect()
}

/// Aggregated state for one rollup mask: the leaf mask when built by `aggregate`
#[derive(Debug, Clone)]
pub struct LeafAggregate {
    pub dimensions: Vec<String>,
    pub measures: Vec<Measure>,
    pub spine: TimeSpine,
    pub tuples: BTreeSet<DimensionTuple>,
    pub sums: SumSeries,
    /// One map per distinct measure, contract order
    pub first_seen: Vec<FirstSeen>,
}

/// Builds the leaf aggregate from prepared rows
pub fn aggregate(input: &PreparedInput, spine: &TimeSpine) -> LeafAggregate {
    let sum_count = input.measures.iter().filter(|m| !m.is_distinct()).count();
    let distinct_count = input.measures.len() - sum_count;

    let mut tuples = BTreeSet::new();
    if input.dimensions.is_empty() {
        tuples.insert(DimensionTuple::default());
    }

    let mut deltas: HashMap<DimensionTuple, BTreeMap<Bucket, Vec<f64>>> = HashMap::new();
    let mut first_seen: Vec<FirstSeen> = vec![HashMap::new(); distinct_count];

    for row in &input.rows {
        tuples.insert(row.tuple.clone());

        if sum_count > 0 {
            let bucket = deltas
                .entry(row.tuple.clone())
                .or_default()
                .entry(row.bucket)
                .or_insert_with(|| vec![0.0; sum_count]);
            for (acc, value) in bucket.iter_mut().zip(&row.sums) {
                *acc += value;
            }
        }

        for (seen, key) in first_seen.iter_mut().zip(&row.keys) {
            if let Some(key) = key {
                seen.entry((row.tuple.clone(), key.clone()))
                    .and_modify(|b| *b = (*b).min(row.bucket))
                    .or_insert(row.bucket);
            }
        }
    }

    let sums = tuples
        .iter()
        .map(|tuple| {
            let series = (0..sum_count)
                .map(|k| match deltas.get(tuple) {
                    Some(by_bucket) => fill_series(by_bucket.iter().map(|(b, v)| (*b, v[k])), spine),
                    None => vec![0.0; spine.len()],
                })
                .collect();
            (tuple.clone(), series)
        })
        .collect();

    LeafAggregate {
        dimensions: input.dimensions.clone(),
        measures: input.measures.clone(),
        spine: spine.clone(),
        tuples,
        sums,
        first_seen,
    }
}

/// Spine-aligned series for every tuple, one per measure in contract order
pub(crate) fn assemble(
    tuples: &BTreeSet<DimensionTuple>,
    sums: &SumSeries,
    first_seen: &[FirstSeen],
    measures: &[Measure],
    spine: &TimeSpine,
) -> BTreeMap<DimensionTuple, Vec<Vec<f64>>> {
    let new_counts: Vec<HashMap<&DimensionTuple, BTreeMap<Bucket, f64>>> = first_seen
        .iter()
        .map(|seen| {
            let mut counts: HashMap<&DimensionTuple, BTreeMap<Bucket, f64>> = HashMap::new();
            for ((tuple, _key), bucket) in seen {
                *counts.entry(tuple).or_default().entry(*bucket).or_insert(0.0) += 1.0;
            }
            counts
        })
        .collect();

    let slots = layout(measures);
    tuples
        .iter()
        .map(|tuple| {
            let series = slots
                .iter()
                .map(|slot| match slot {
                    Slot::Sum(k) => sums
                        .get(tuple)
                        .map(|s| s[*k].clone())
                        .unwrap_or_else(|| vec![0.0; spine.len()]),
                    Slot::Distinct(k) => match new_counts[*k].get(tuple) {
                        Some(counts) => fill_series(counts.iter().map(|(b, c)| (*b, *c)), spine),
                        None => vec![0.0; spine.len()],
                    },
                })
                .collect();
            (tuple.clone(), series)
        })
        .collect()
}

impl LeafAggregate {
    /// Leaf table without any rollup
    pub fn into_table(self) -> CumulativeTable {
        let series = assemble(
            &self.tuples,
            &self.sums,
            &self.first_seen,
            &self.measures,
            &self.spine,
        );
        CumulativeTable {
            dimensions: self.dimensions,
            measures: self.measures,
            spine: self.spine,
            series,
        }
    }
}
