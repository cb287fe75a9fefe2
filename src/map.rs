use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::config::MapConfig;
use crate::index::ExpiryIndex;
use crate::token::ExpiryToken;

/// TTLs are capped at ~100 years to keep `Instant` arithmetic safe.
const MAX_TTL_MS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Internal shared state for the map
struct MapInner<K, V> {
    /// Source of truth for `get`
    values: DashMap<K, V>,
    /// The currently-live expiry token for each stored key
    tokens: DashMap<K, Arc<ExpiryToken<K>>>,
    /// Tokens ordered by deadline; may hold stale tombstones
    index: ExpiryIndex<K>,
    /// Present only when a periodic sweep was configured
    shutdown_tx: Option<watch::Sender<bool>>,
}

/// Thread-safe in-memory key/value store with per-entry TTL.
///
/// Uses `DashMap` for lock-free concurrent access to the value and token
/// stores. Expired entries are reclaimed lazily: every public operation
/// first drains the expiry index of tokens that have fallen due, so a stale
/// entry can never be observed, and no operation pays more than the number
/// of entries actually due at that moment.
///
/// Overwriting or removing a key retires its token by killing it rather
/// than deleting it out of the middle of the index; the dead token is
/// discarded when it surfaces at the index head, after an identity check
/// against the key's currently tracked token. The newest `put` for a key
/// therefore always wins, and an old token can never evict the entry that
/// replaced it.
///
/// Cloning the map is cheap and clones share the same underlying state.
///
/// # Example
///
/// ```rust
/// use expire_map::ExpireMap;
///
/// let map: ExpireMap<&str, &str> = ExpireMap::new();
///
/// map.put("session", "abc123", 5_000); // 5 second TTL
/// assert_eq!(map.get(&"session"), Some("abc123"));
/// ```
pub struct ExpireMap<K, V> {
    inner: Arc<MapInner<K, V>>,
}

impl<K, V> ExpireMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new map with default configuration: purely lazy
    /// reclamation, no background work, no runtime required.
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    /// Creates a new map with custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration enables the periodic sweep and no Tokio
    /// runtime is available to host the sweep task.
    pub fn with_config(config: MapConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = if config.sweep_interval.is_some() {
            // Fail here with a clear message instead of a cryptic panic
            // from tokio::spawn.
            if tokio::runtime::Handle::try_current().is_err() {
                panic!(
                    "expire_map::ExpireMap requires a Tokio runtime when a sweep \
                     interval is configured. Construct the map from within a \
                     runtime, or leave the sweep disabled for lazy reclamation."
                );
            }
            let (tx, rx) = watch::channel(false);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let inner = Arc::new(MapInner {
            values: DashMap::new(),
            tokens: DashMap::new(),
            index: ExpiryIndex::new(),
            shutdown_tx,
        });

        if let (Some(interval), Some(rx)) = (config.sweep_interval, shutdown_rx) {
            tokio::spawn(Self::sweep_task(Arc::downgrade(&inner), interval, rx));
        }

        Self { inner }
    }

    /// Background task that periodically reaps due entries, for systems
    /// that need bounded memory even with no caller traffic.
    async fn sweep_task(
        inner: Weak<MapInner<K, V>>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // Skip the first immediate tick; the map was just created and is empty.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // The task holds only a Weak reference, so dropping the
                    // last map handle actually frees the state instead of
                    // keeping it alive from in here.
                    match inner.upgrade() {
                        Some(inner) => {
                            Self::reap_inner(&inner);
                        }
                        None => break,
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Drains every currently-due token from the index and purges the
    /// entries they still own.
    ///
    /// A drained token is only allowed to evict the entry it was created
    /// for: if the key has been overwritten since, `tokens` holds a newer
    /// token and the drained one is a stale tombstone, discarded without
    /// touching the stores. The check-and-remove on `tokens` is atomic, so
    /// a token installed concurrently can never be swept out by accident.
    fn reap_inner(inner: &MapInner<K, V>) -> usize {
        let mut purged = 0;
        while let Some(due) = inner.index.poll_due() {
            let key = due.key();
            let owned = inner
                .tokens
                .remove_if(key, |_, tracked| Arc::ptr_eq(tracked, &due))
                .is_some();
            if owned {
                inner.values.remove(key);
                purged += 1;
                debug!(key = ?key, "expired entry reaped");
            } else {
                trace!(key = ?key, "stale expiry token discarded");
            }
        }
        purged
    }

    /// Stores `value` under `key` for `ttl_ms` milliseconds.
    ///
    /// A non-positive TTL means the entry is already expired: nothing is
    /// stored and any existing entry for the key is left untouched. If the
    /// key is already present the newest put wins, and the value expires
    /// `ttl_ms` after *this* call, not on the previous entry's schedule.
    pub fn put(&self, key: K, value: V, ttl_ms: i64) {
        if ttl_ms <= 0 {
            return;
        }
        Self::reap_inner(&self.inner);

        let lifespan = Duration::from_millis(ttl_ms.min(MAX_TTL_MS) as u64);
        let token = Arc::new(ExpiryToken::new(key.clone(), lifespan));

        // Atomic replace-and-fetch-previous: once `insert` returns, the old
        // token can no longer be observed as the key's current token, so
        // killing it afterwards cannot evict the fresh entry.
        if let Some(old) = self.inner.tokens.insert(key.clone(), Arc::clone(&token)) {
            old.kill();
            Self::reap_inner(&self.inner);
        }

        self.inner.index.offer(token);
        self.inner.values.insert(key, value);
    }

    /// Retrieves the value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        Self::reap_inner(&self.inner);
        self.inner.values.get(key).map(|entry| entry.value().clone())
    }

    /// Removes `key` and retires its token, whether or not the entry exists.
    pub fn remove(&self, key: &K) {
        // The value goes unconditionally so the value and token stores
        // cannot diverge even when called for a key that was never stored.
        self.inner.values.remove(key);
        if let Some((_, token)) = self.inner.tokens.remove(key) {
            token.kill();
            Self::reap_inner(&self.inner);
        }
    }

    /// Number of live entries.
    ///
    /// Due entries are reaped first, so the count reflects exactly the keys
    /// for which [`get`](ExpireMap::get) would return a value.
    pub fn size(&self) -> usize {
        Self::reap_inner(&self.inner);
        self.inner.values.len()
    }

    /// Returns `true` if the map holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Checks whether `key` is present and not expired.
    pub fn contains_key(&self, key: &K) -> bool {
        Self::reap_inner(&self.inner);
        self.inner.values.contains_key(key)
    }

    /// Drops every entry, tracked token and pending index slot.
    pub fn clear(&self) {
        self.inner.values.clear();
        self.inner.tokens.clear();
        self.inner.index.clear();
    }

    /// Manually drains all currently-due tokens, returning the number of
    /// live entries purged.
    ///
    /// Every public operation already does this on entry; calling it
    /// directly is only useful to bound memory during a quiet period
    /// without waiting for the next access, or as the body of an external
    /// periodic sweep.
    pub fn reap(&self) -> usize {
        Self::reap_inner(&self.inner)
    }

    /// Stops the periodic sweep, if one was configured.
    ///
    /// This is also done automatically when the last map handle is dropped.
    /// Lazy reclamation keeps working after shutdown.
    pub fn shutdown(&self) {
        if let Some(tx) = &self.inner.shutdown_tx {
            let _ = tx.send(true);
        }
    }
}

impl<K, V> Default for ExpireMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for ExpireMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Drop for MapInner<K, V> {
    fn drop(&mut self) {
        // Stop the sweep task when the last handle goes away
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(true);
        }
    }
}
