//! Pluggable key ordering

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Total order over user keys
///
/// Every key-bound comparison in the statistics engine goes through a
/// `Comparer`, so stores with custom key encodings get consistent
/// adjacency and coverage decisions.
pub trait Comparer: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Name recorded alongside the store's tables
    fn name(&self) -> &str;

    fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// Lexicographic byte ordering
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparer;

impl Comparer for BytewiseComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &str {
        "bytewise"
    }
}

impl fmt::Debug for dyn Comparer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Comparer({})", self.name())
    }
}

/// Shared handle to the default comparer
pub fn default_comparer() -> Arc<dyn Comparer> {
    Arc::new(BytewiseComparer)
}
