use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::token::ExpiryToken;

/// Priority structure that surfaces the token with the least remaining
/// lifetime first.
///
/// Tokens are ordered by the deadline they carried when offered; ties break
/// by insertion order. A token killed after insertion keeps its position,
/// but [`poll_due`](ExpiryIndex::poll_due) will drain it as soon as it
/// reaches the head, whether or not its original deadline has passed.
pub struct ExpiryIndex<K> {
    heap: Mutex<BinaryHeap<IndexSlot<K>>>,
    seq: AtomicU64,
}

/// Heap slot capturing a token's deadline at offer time. The snapshot keeps
/// the heap's ordering key immutable even though the token itself can be
/// killed while buried in the middle of the structure.
struct IndexSlot<K> {
    deadline: Instant,
    seq: u64,
    token: Arc<ExpiryToken<K>>,
}

impl<K> Ord for IndexSlot<K> {
    // The max-heap must surface the earliest deadline first, so the
    // comparison is reversed; ties fall back to insertion order.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<K> PartialOrd for IndexSlot<K> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<K> PartialEq for IndexSlot<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<K> Eq for IndexSlot<K> {}

impl<K> ExpiryIndex<K> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Inserts a token. O(log n).
    pub fn offer(&self, token: Arc<ExpiryToken<K>>) {
        let slot = IndexSlot {
            deadline: token.deadline(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            token,
        };
        self.lock().push(slot);
    }

    /// Removes and returns the head token if it is due, `None` otherwise.
    ///
    /// Never blocks and never fails on an empty index; repeated calls drain
    /// all currently-due tokens.
    pub fn poll_due(&self) -> Option<Arc<ExpiryToken<K>>> {
        let mut heap = self.lock();
        if heap.peek().is_some_and(|slot| slot.token.is_due()) {
            heap.pop().map(|slot| slot.token)
        } else {
            None
        }
    }

    /// Number of slots currently held, live tokens and tombstones alike.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, BinaryHeap<IndexSlot<K>>> {
        // The comparators are on Instant and u64 and cannot panic, so a
        // poisoned guard still protects a structurally sound heap.
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Default for ExpiryIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
