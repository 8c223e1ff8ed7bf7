//! Range tombstone defragmentation
//!
//! Range deletions are stored fragmented: overlapping deletions are cut at
//! every boundary, and a deletion that straddles table boundaries is cut
//! again per table. For size estimation we want the extent of the original
//! deletion, so runs of fragments that touch end-to-start are coalesced.
//!
//! Adjacency is the only merge criterion. Two deletions that happened to
//! abut are indistinguishable from one deletion that was split, and are
//! reported as one.

use crate::storage::comparator::Comparer;
use crate::storage::keyspan::{SeqNum, Span};
use crate::{Result, StorageError};
use std::cmp::Ordering;
use std::fmt;

/// Maximal run of adjacent fragments
#[derive(Clone, PartialEq, Eq)]
pub struct DefragmentedTombstone {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
    /// Smallest seqnum over every marker of every fragment in the run
    pub min_seq_num: SeqNum,
    /// Largest seqnum over every marker of every fragment in the run
    pub max_seq_num: SeqNum,
}

impl DefragmentedTombstone {
    fn from_fragment(fragment: Span, min_seq_num: SeqNum, max_seq_num: SeqNum) -> Self {
        Self {
            start: fragment.start,
            end: fragment.end,
            min_seq_num,
            max_seq_num,
        }
    }

    fn extend(&mut self, fragment: Span, min_seq_num: SeqNum, max_seq_num: SeqNum) {
        self.end = fragment.end;
        self.min_seq_num = self.min_seq_num.min(min_seq_num);
        self.max_seq_num = self.max_seq_num.max(max_seq_num);
    }
}

impl fmt::Debug for DefragmentedTombstone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}#{},{}",
            String::from_utf8_lossy(&self.start),
            String::from_utf8_lossy(&self.end),
            self.min_seq_num,
            self.max_seq_num
        )
    }
}

/// Sweep `fragments` left to right and call `f` once per coalesced run
///
/// Fragments must be disjoint, sorted by start key and carry at least one
/// deletion marker; anything else is reported as corruption. The first
/// error, from the fragment stream or from `f`, stops the sweep and is
/// returned without further callbacks.
pub fn for_each_defragmented_tombstone<I, F>(
    fragments: I,
    cmp: &dyn Comparer,
    mut f: F,
) -> Result<()>
where
    I: IntoIterator<Item = Result<Span>>,
    F: FnMut(DefragmentedTombstone) -> Result<()>,
{
    let mut current: Option<DefragmentedTombstone> = None;

    for fragment in fragments {
        let fragment = fragment?;
        let (min_seq_num, max_seq_num) =
            match (fragment.smallest_seq_num(), fragment.largest_seq_num()) {
                (Some(min), Some(max)) => (min, max),
                _ => {
                    return Err(StorageError::Corruption(format!(
                        "range deletion fragment {:?} carries no keys",
                        fragment
                    )))
                }
            };
        if cmp.compare(&fragment.start, &fragment.end) != Ordering::Less {
            return Err(StorageError::Corruption(format!(
                "range deletion fragment {:?} is empty",
                fragment
            )));
        }

        current = match current.take() {
            Some(mut run) if cmp.equal(&run.end, &fragment.start) => {
                run.extend(fragment, min_seq_num, max_seq_num);
                Some(run)
            }
            Some(run) => {
                if cmp.compare(&fragment.start, &run.end) == Ordering::Less {
                    return Err(StorageError::Corruption(format!(
                        "range deletion fragment {:?} overlaps or precedes {:?}",
                        fragment, run
                    )));
                }
                f(run)?;
                Some(DefragmentedTombstone::from_fragment(
                    fragment,
                    min_seq_num,
                    max_seq_num,
                ))
            }
            None => Some(DefragmentedTombstone::from_fragment(
                fragment,
                min_seq_num,
                max_seq_num,
            )),
        };
    }

    if let Some(run) = current {
        f(run)?;
    }
    Ok(())
}

/// Collect the defragmented runs of an in-memory fragment list
pub fn defragment(fragments: &[Span], cmp: &dyn Comparer) -> Result<Vec<DefragmentedTombstone>> {
    let mut out = Vec::new();
    for_each_defragmented_tombstone(fragments.iter().cloned().map(Ok), cmp, |t| {
        out.push(t);
        Ok(())
    })?;
    Ok(out)
}
