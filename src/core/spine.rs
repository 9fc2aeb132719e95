//! 10-minute buckets and the time spine every output series is aligned to.
//!
//! Timestamps are 12-digit `YYYYMMDDHHMM` integers. A bucket is the timestamp
//! floored to the 10-minute boundary (`202512300127 -> 202512300120`). The spine
//! steps through real clock time, so it rolls over hours and days correctly.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{CumError, Result};

/// A 10-minute bucket label, `YYYYMMDDHHM0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bucket(i64);

impl Bucket {
    /// Bucket containing a minute timestamp
    pub fn containing(minute_ts: i64) -> Self {
        Bucket(floor_10m(minute_ts))
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012}", self.0)
    }
}

/// `x - x % 10`
pub fn floor_10m(minute_ts: i64) -> i64 {
    minute_ts - minute_ts.rem_euclid(10)
}

/// Parse a minute timestamp from text. Accepts a trailing fraction
/// (`"202512300125.0"`) since spreadsheet and float sources produce it.
pub fn parse_minute_ts(text: &str) -> Option<i64> {
    let text = text.trim();
    let digits = match text.split_once('.') {
        Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => text,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// The run's partition and window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWindow {
    pub date_p: i64,
    pub start_ts: i64,
    pub end_ts: i64,
}

impl RunWindow {
    pub fn new(date_p: i64, start_ts: i64, end_ts: i64) -> Self {
        Self {
            date_p,
            start_ts,
            end_ts,
        }
    }

    pub fn start_bucket(&self) -> Bucket {
        Bucket::containing(self.start_ts)
    }

    pub fn end_bucket(&self) -> Bucket {
        Bucket::containing(self.end_ts)
    }
}

/// Ordered 10-minute buckets from `floor10(start)` to `floor10(end)` inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpine {
    buckets: Vec<Bucket>,
}

impl TimeSpine {
    pub fn new(start_ts: i64, end_ts: i64) -> Result<Self> {
        let start = to_datetime(floor_10m(start_ts))
            .ok_or_else(|| CumError::configuration("start_ts", "a YYYYMMDDHHMM timestamp"))?;
        let end = to_datetime(floor_10m(end_ts))
            .ok_or_else(|| CumError::configuration("end_ts", "a YYYYMMDDHHMM timestamp"))?;
        if start > end {
            return Err(CumError::configuration(
                "start_ts",
                format!("a window start not after end_ts ({start_ts} > {end_ts})"),
            ));
        }

        let mut buckets = Vec::new();
        let mut current = start;
        while current <= end {
            buckets.push(Bucket(from_datetime(&current)));
            current += Duration::minutes(10);
        }
        Ok(Self { buckets })
    }

    pub fn for_window(window: &RunWindow) -> Result<Self> {
        Self::new(window.start_ts, window.end_ts)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn first(&self) -> Option<Bucket> {
        self.buckets.first().copied()
    }

    pub fn last(&self) -> Option<Bucket> {
        self.buckets.last().copied()
    }

    pub fn position(&self, bucket: Bucket) -> Option<usize> {
        self.buckets.binary_search(&bucket).ok()
    }
}

fn to_datetime(ts: i64) -> Option<NaiveDateTime> {
    if !(0..=999_999_999_999).contains(&ts) {
        return None;
    }
    let minute = (ts % 100) as u32;
    let hour = (ts / 100 % 100) as u32;
    let day = (ts / 10_000 % 100) as u32;
    let month = (ts / 1_000_000 % 100) as u32;
    let year = (ts / 100_000_000) as i32;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

fn from_datetime(dt: &NaiveDateTime) -> i64 {
    dt.year() as i64 * 100_000_000
        + dt.month() as i64 * 1_000_000
        + dt.day() as i64 * 10_000
        + dt.hour() as i64 * 100
        + dt.minute() as i64
}
