//! In-memory page fragment store.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;

use super::PageCache;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone)]
struct Entry {
    fragment: String,
    expires_at: Instant,
}

/// Bounded LRU whose entries expire a fixed time after insertion.
///
/// Writes elsewhere in the application never touch it; stale fragments age
/// out on their own.
pub struct TtlPageCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl TtlPageCache {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let lookup = entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.fragment.clone()));
        let fresh = match lookup {
            Some((true, fragment)) => Some(fragment),
            Some((false, _)) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);

        match fresh {
            Some(fragment) => {
                counter!("folio_page_cache_hit_total").increment(1);
                Some(fragment)
            }
            None => {
                counter!("folio_page_cache_miss_total").increment(1);
                None
            }
        }
    }

    fn set_at(&self, key: String, fragment: String, now: Instant) {
        if self.ttl.is_zero() {
            return;
        }
        let entry = Entry {
            fragment,
            expires_at: now + self.ttl,
        };
        let displaced = mutex_lock(&self.entries, SOURCE, "set").push(key.clone(), entry);
        if displaced.is_some_and(|(old_key, _)| old_key != key) {
            counter!("folio_page_cache_evict_total").increment(1);
        }
    }
}

impl PageCache for TtlPageCache {
    fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    fn set(&self, key: String, fragment: String) {
        self.set_at(key, fragment, Instant::now());
    }

    fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }
}
