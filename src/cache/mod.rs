//! Rendered page fragment cache.
//!
//! The index handler stores its rendered post list here keyed by request
//! path and query string. Entries expire after `cache.index_ttl_seconds`;
//! nothing invalidates them early.

mod lock;
mod store;

pub use store::TtlPageCache;

/// Storage for rendered HTML fragments.
pub trait PageCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: String, fragment: String);

    fn clear(&self);
}
