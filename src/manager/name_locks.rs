use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use crate::types::*;

/// One lock per principal name, created on demand and dropped when nobody
/// holds or waits for it. Distinct names never block each other.
#[derive(Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `name` is free, then hold it until the guard drops.
    pub fn lock(&self, name: &str) -> NameLockGuard<'_> {
        // Cloned under the map's shard lock, so reclaim can see us waiting.
        let lock = Arc::clone(
            self.locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        NameLockGuard {
            owner: self,
            name: name.to_string(),
            held: Some(lock.lock_arc()),
        }
    }

    /// Names that currently have a lock allocated.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct NameLockGuard<'a> {
    owner: &'a NameLocks,
    name: String,
    held: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for NameLockGuard<'_> {
    fn drop(&mut self) {
        // Unlock and give back our reference before reclaiming.
        drop(self.held.take());
        // Only the map's own reference left: no holder, no waiter.
        self.owner
            .locks
            .remove_if(&self.name, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn same_name_serializes() {
        let locks = Arc::new(NameLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (locks, inside, max_inside) =
                    (Arc::clone(&locks), Arc::clone(&inside), Arc::clone(&max_inside));
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let _g = locks.lock("jduke");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn distinct_names_do_not_block() {
        let locks = Arc::new(NameLocks::new());
        let _a = locks.lock("a");
        let barrier = Arc::new(Barrier::new(2));
        let t = {
            let (locks, barrier) = (Arc::clone(&locks), Arc::clone(&barrier));
            std::thread::spawn(move || {
                let _b = locks.lock("b");
                barrier.wait();
            })
        };
        // Would deadlock if "b" waited on "a".
        barrier.wait();
        t.join().unwrap();
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn hand_off_to_waiter_then_reclaim() {
        let locks = Arc::new(NameLocks::new());
        let held = locks.lock("x");
        let waiter = {
            let locks = Arc::clone(&locks);
            std::thread::spawn(move || {
                let _g = locks.lock("x");
                locks.len()
            })
        };
        drop(held);
        assert_eq!(waiter.join().unwrap(), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn locks_are_reclaimed() {
        let locks = NameLocks::new();
        {
            let _g = locks.lock("x");
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }
}
