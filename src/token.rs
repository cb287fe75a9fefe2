use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A key's expiry claim: the key itself plus the absolute deadline after
/// which the entry it guards stops being reachable.
///
/// A token is immutable except for [`kill`](ExpiryToken::kill), which marks
/// it as already-expired so the expiry index drains it instead of honoring
/// the original deadline. Killing is how a superseded or removed entry's
/// token is retired: the index cannot cheaply delete an arbitrary element,
/// so the token is tagged dead and discarded when it surfaces at the head.
///
/// Equality and hashing consider only the key. A replacement token for the
/// same key is "the same token" as far as map membership goes, even after
/// one of the two has been killed.
#[derive(Debug)]
pub struct ExpiryToken<K> {
    key: K,
    deadline: Instant,
    lifespan_ms: i64,
    killed: AtomicBool,
}

impl<K> ExpiryToken<K> {
    /// Creates a token for `key` that falls due `lifespan` from now.
    pub fn new(key: K, lifespan: Duration) -> Self {
        Self {
            key,
            deadline: Instant::now() + lifespan,
            lifespan_ms: saturating_ms(lifespan),
            killed: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_deadline(key: K, deadline: Instant, lifespan: Duration) -> Self {
        Self {
            key,
            deadline,
            lifespan_ms: saturating_ms(lifespan),
            killed: AtomicBool::new(false),
        }
    }

    /// The key this token guards.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The instant this token was scheduled to fall due, ignoring kills.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Remaining life in milliseconds; zero or negative means due.
    ///
    /// A killed token reports its remaining life rewound by twice its
    /// lifespan, which keeps the result at or below `-lifespan` no matter
    /// how recently the token was created.
    pub fn remaining_ms(&self) -> i64 {
        let now = Instant::now();
        let live = match self.deadline.checked_duration_since(now) {
            Some(left) => saturating_ms(left),
            None => -saturating_ms(now - self.deadline),
        };
        if self.is_killed() {
            live.saturating_sub(self.lifespan_ms.saturating_mul(2))
        } else {
            live
        }
    }

    /// Whether this token should be drained from the expiry index.
    pub fn is_due(&self) -> bool {
        self.remaining_ms() <= 0
    }

    /// Forcibly expires this token. Idempotent.
    ///
    /// Used when the entry it guards is overwritten or explicitly removed
    /// before living out its lifespan.
    pub fn kill(&self) {
        self.killed.store(true, Ordering::Relaxed);
    }

    /// Whether [`kill`](ExpiryToken::kill) has been called.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Relaxed)
    }
}

impl<K: PartialEq> PartialEq for ExpiryToken<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq> Eq for ExpiryToken<K> {}

impl<K: Hash> Hash for ExpiryToken<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

fn saturating_ms(duration: Duration) -> i64 {
    duration.as_millis().min(i64::MAX as u128) as i64
}
