use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::cache::entry::{DomainInfo, Lifetime};
use crate::cache::CacheKey;
use crate::types::*;

/// Storage strategy behind the authentication cache.
///
/// Every removal (explicit, by expiry, by replacement or by eviction) must
/// call [`DomainInfo::destroy`] on the entry that leaves the cache.
pub trait CachePolicy: Send + Sync {
    /// Refreshing read. A returned entry is live and already acquired; the
    /// caller must [`release`](DomainInfo::release) it. Lookup and acquire
    /// happen atomically with respect to removal.
    fn get(&self, key: &CacheKey) -> Option<Arc<DomainInfo>>;

    /// Non-refreshing read; does not acquire.
    fn peek(&self, key: &CacheKey) -> Option<Arc<DomainInfo>>;

    /// Insert, destroying any entry already held under `key`.
    fn insert(&self, key: CacheKey, entry: Arc<DomainInfo>);

    fn remove(&self, key: &CacheKey) -> Option<Arc<DomainInfo>>;

    fn flush(&self);

    fn keys(&self) -> Vec<CacheKey>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime given to new entries.
    fn default_lifetime(&self) -> Lifetime {
        Lifetime::Never
    }
}

struct Slot {
    entry: Arc<DomainInfo>,
    last_used: u64,
}

/// Time-bounded cache policy with optional LRU capacity bound.
pub struct TimedCachePolicy {
    default_lifetime: Lifetime,
    capacity: Option<usize>,
    entries: Mutex<HashMap<CacheKey, Slot>>,
    tick: AtomicU64,
}

impl TimedCachePolicy {
    pub fn new(default_lifetime: Lifetime) -> Self {
        Self {
            default_lifetime,
            capacity: None,
            entries: Mutex::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    /// Bound the number of entries; `0` means unbounded.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = (capacity > 0).then_some(capacity);
        self
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    /// Remove every entry that is no longer current at `now`.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<Arc<DomainInfo>> = {
            let mut entries = self.entries.lock();
            let keys: Vec<CacheKey> = entries
                .iter()
                .filter(|(_, slot)| !slot.entry.is_current(now))
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter()
                .filter_map(|k| entries.remove(k))
                .map(|slot| slot.entry)
                .collect()
        };
        let count = expired.len();
        for entry in expired {
            entry.destroy();
        }
        if count > 0 {
            tracing::debug!(count, "swept expired cache entries");
        }
        count
    }

    /// Sweep expired entries every `interval` on a background thread.
    ///
    /// The thread stops when the returned handle drops or the policy goes away.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        if interval.is_zero() {
            return SweeperHandle {
                signal,
                thread: None,
            };
        }
        let policy: Weak<Self> = Arc::downgrade(self);
        let thread_signal = Arc::clone(&signal);
        let thread = std::thread::Builder::new()
            .name("callerid-cache-sweeper".to_string())
            .spawn(move || {
                let (stopped, wake) = &*thread_signal;
                loop {
                    {
                        let mut stopped = stopped.lock();
                        if !*stopped {
                            wake.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    match policy.upgrade() {
                        Some(policy) => {
                            policy.sweep(Instant::now());
                        }
                        None => break,
                    }
                }
            });
        match thread {
            Ok(thread) => SweeperHandle {
                signal,
                thread: Some(thread),
            },
            Err(e) => {
                tracing::warn!(error = %e, "could not start cache sweeper; entries expire on lookup only");
                SweeperHandle {
                    signal,
                    thread: None,
                }
            }
        }
    }
}

impl CachePolicy for TimedCachePolicy {
    fn get(&self, key: &CacheKey) -> Option<Arc<DomainInfo>> {
        let now = Instant::now();
        let stale = {
            let mut entries = self.entries.lock();
            let tick = self.next_tick();
            let slot = entries.get_mut(key)?;
            if slot.entry.is_current(now) && slot.entry.acquire() {
                slot.last_used = tick;
                return Some(Arc::clone(&slot.entry));
            }
            entries.remove(key).map(|slot| slot.entry)
        };
        if let Some(entry) = stale {
            tracing::debug!(%key, "dropping stale cache entry");
            entry.destroy();
        }
        None
    }

    fn peek(&self, key: &CacheKey) -> Option<Arc<DomainInfo>> {
        self.entries
            .lock()
            .get(key)
            .map(|slot| Arc::clone(&slot.entry))
    }

    fn insert(&self, key: CacheKey, entry: Arc<DomainInfo>) {
        let mut evicted = Vec::new();
        {
            let mut entries = self.entries.lock();
            let slot = Slot {
                entry,
                last_used: self.next_tick(),
            };
            if let Some(old) = entries.insert(key.clone(), slot) {
                evicted.push(old.entry);
            }
            if let Some(capacity) = self.capacity {
                while entries.len() > capacity {
                    let lru = entries
                        .iter()
                        .filter(|(k, _)| **k != key)
                        .min_by_key(|(_, slot)| slot.last_used)
                        .map(|(k, _)| k.clone());
                    match lru.and_then(|k| entries.remove(&k)) {
                        Some(slot) => evicted.push(slot.entry),
                        None => break,
                    }
                }
            }
        }
        for old in evicted {
            tracing::debug!(key = %old.key(), "evicting cache entry");
            old.destroy();
        }
    }

    fn remove(&self, key: &CacheKey) -> Option<Arc<DomainInfo>> {
        let removed = self.entries.lock().remove(key).map(|slot| slot.entry);
        if let Some(entry) = &removed {
            entry.destroy();
        }
        removed
    }

    fn flush(&self) {
        let drained: Vec<Arc<DomainInfo>> = self
            .entries
            .lock()
            .drain()
            .map(|(_, slot)| slot.entry)
            .collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "flushing authentication cache");
        }
        for entry in drained {
            entry.destroy();
        }
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.entries.lock().keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn default_lifetime(&self) -> Lifetime {
        self.default_lifetime
    }
}

impl Drop for TimedCachePolicy {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Stops the background sweeper when dropped.
pub struct SweeperHandle {
    signal: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let (stopped, wake) = &*self.signal;
        *stopped.lock() = true;
        wake.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("cache sweeper thread panicked");
            }
        }
    }
}
