//! Range deletion spans
//!
//! ## Model
//! - **RangeDel**: a range deletion as written, `[start, end)` at one seqnum
//! - **Span**: a fragment of key space carrying every deletion marker that
//!   covers it; spans produced by [`fragment_range_dels`] are disjoint and
//!   sorted by start key
//!
//! Overlapping range deletions are split into fragments at every start/end
//! boundary, and fragments are further cut at table boundaries when a
//! deletion spans several tables. Defragmentation (see `table_stats::defrag`)
//! reverses the second kind of split for estimation.

use super::comparator::Comparer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Write-order identifier of a key version or deletion marker
pub type SeqNum = u64;

/// Globally unique table identifier
pub type FileNum = u64;

/// One stacked deletion marker inside a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyspanKey {
    pub seq_num: SeqNum,
}

/// A disjoint piece of key space `[start, end)` with its deletion markers
///
/// `keys` is ordered by descending sequence number.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub keys: Vec<KeyspanKey>,
}

impl Span {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>, seq_nums: &[SeqNum]) -> Self {
        let mut keys: Vec<KeyspanKey> = seq_nums
            .iter()
            .map(|&seq_num| KeyspanKey { seq_num })
            .collect();
        keys.sort_by(|a, b| b.seq_num.cmp(&a.seq_num));
        Self {
            start: start.into(),
            end: end.into(),
            keys,
        }
    }

    /// True when the span carries no deletion markers
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn smallest_seq_num(&self) -> Option<SeqNum> {
        self.keys.iter().map(|k| k.seq_num).min()
    }

    pub fn largest_seq_num(&self) -> Option<SeqNum> {
        self.keys.iter().map(|k| k.seq_num).max()
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{{",
            String::from_utf8_lossy(&self.start),
            String::from_utf8_lossy(&self.end)
        )?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "#{}", key.seq_num)?;
        }
        write!(f, "}}")
    }
}

/// An unfragmented range deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDel {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    pub seq_num: SeqNum,
}

impl RangeDel {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>, seq_num: SeqNum) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            seq_num,
        }
    }
}

/// Fragment possibly overlapping range deletions into disjoint spans
///
/// Boundaries are every distinct start and end key; each interval between
/// consecutive boundaries becomes a span carrying all deletions covering it.
/// Deletions with `start >= end` cover nothing and are skipped.
pub fn fragment_range_dels(dels: &[RangeDel], cmp: &dyn Comparer) -> Vec<Span> {
    let dels: Vec<&RangeDel> = dels
        .iter()
        .filter(|d| cmp.compare(&d.start, &d.end) == Ordering::Less)
        .collect();
    if dels.is_empty() {
        return Vec::new();
    }

    let mut bounds: Vec<&[u8]> = Vec::with_capacity(dels.len() * 2);
    for del in &dels {
        bounds.push(&del.start);
        bounds.push(&del.end);
    }
    bounds.sort_by(|a, b| cmp.compare(a, b));
    bounds.dedup_by(|a, b| cmp.equal(a, b));

    let mut spans = Vec::new();
    for window in bounds.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        let mut seq_nums: Vec<SeqNum> = dels
            .iter()
            .filter(|d| {
                cmp.compare(&d.start, lo) != Ordering::Greater
                    && cmp.compare(&d.end, hi) != Ordering::Less
            })
            .map(|d| d.seq_num)
            .collect();
        if seq_nums.is_empty() {
            continue;
        }
        seq_nums.sort_unstable();
        seq_nums.dedup();
        spans.push(Span::new(lo, hi, &seq_nums));
    }
    spans
}

/// Clip spans to `[lower, upper)`, dropping spans left empty
///
/// Models a table that only holds the part of a range deletion that falls
/// within its bounds.
pub fn truncate_spans(spans: &[Span], lower: &[u8], upper: &[u8], cmp: &dyn Comparer) -> Vec<Span> {
    spans
        .iter()
        .filter_map(|span| {
            let start = if cmp.compare(&span.start, lower) == Ordering::Less {
                lower
            } else {
                span.start.as_slice()
            };
            let end = if cmp.compare(&span.end, upper) == Ordering::Greater {
                upper
            } else {
                span.end.as_slice()
            };
            if cmp.compare(start, end) != Ordering::Less {
                return None;
            }
            Some(Span {
                start: start.to_vec(),
                end: end.to_vec(),
                keys: span.keys.clone(),
            })
        })
        .collect()
}
