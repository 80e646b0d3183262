//! The query result cache (spec §4.5/§6): `dashmap`-backed, keyed by
//! `hash(canonical(query))`, TTL default 300s, invalidated on any anchor
//! write that touches a cached result's anchor set.

use crate::result::ContextAssembly;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use stat7_anchor::AnchorId;
use stat7_core::canonical::canonical_bytes;
use stat7_core::ToCanonical;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Default TTL (spec §6 `cache_ttl_seconds`).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

struct Entry {
    assembly: ContextAssembly,
    anchor_set: HashSet<AnchorId>,
    inserted_at: Instant,
}

/// A query cache key: `SHA-256(canonical(query))` (spec §4.5).
pub fn cache_key<T: ToCanonical>(query: &T) -> [u8; 32] {
    let digest = Sha256::digest(canonical_bytes(query));
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Lock-free-ish query result cache (spec §5: "lock-free map with atomic
/// entry replacement; TTL check on read").
pub struct QueryCache {
    entries: DashMap<[u8; 32], Entry>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        QueryCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// `get(key) -> Option<ContextAssembly>`. Expired entries are evicted
    /// on read, as spec §5 requires ("TTL check on read").
    pub fn get(&self, key: &[u8; 32]) -> Option<ContextAssembly> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.assembly.clone())
    }

    pub fn put(&self, key: [u8; 32], assembly: ContextAssembly, anchor_set: HashSet<AnchorId>) {
        self.entries.insert(
            key,
            Entry {
                assembly,
                anchor_set,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Invalidate every cached entry whose anchor set includes `anchor_id`
    /// (spec §4.5: "Entries invalidated on any anchor insert/update that
    /// touches a cached result's anchor set").
    pub fn invalidate_touching(&self, anchor_id: AnchorId) {
        self.entries.retain(|_, entry| !entry.anchor_set.contains(&anchor_id));
    }

    /// `invalidate_cache(reason)` (spec §4.5): drop the entire cache.
    pub fn invalidate_all(&self, reason: &str) {
        tracing::debug!(reason, "invalidating entire query cache");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::AssemblyMetadata;
    use std::thread::sleep;

    fn assembly() -> ContextAssembly {
        ContextAssembly {
            results: vec![],
            aggregate: AssemblyMetadata::default(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = QueryCache::new(Duration::from_secs(60));
        let key = [1u8; 32];
        cache.put(key, assembly(), HashSet::new());
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = QueryCache::new(Duration::from_millis(10));
        let key = [2u8; 32];
        cache.put(key, assembly(), HashSet::new());
        sleep(Duration::from_millis(30));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_touching_removes_only_matching_entries() {
        use stat7_core::Realm;
        let cache = QueryCache::new(Duration::from_secs(60));
        let a = AnchorId { realm: Realm::Data, index: 0 };
        let b = AnchorId { realm: Realm::Data, index: 1 };

        cache.put([1u8; 32], assembly(), HashSet::from([a]));
        cache.put([2u8; 32], assembly(), HashSet::from([b]));

        cache.invalidate_touching(a);
        assert!(cache.get(&[1u8; 32]).is_none());
        assert!(cache.get(&[2u8; 32]).is_some());
    }
}
