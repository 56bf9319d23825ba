//! Process-wide TTL cache of lookup results
//!
//! Keyed by [`EntityKey`], shared by every buffer and every resolver kind.
//! Entries are immutable once written; a refresh inserts a new entry.
//!
//! Expired entries are never returned, but they are only deleted by
//! [`EntityCache::evict_expired`], which runs before an insert once the
//! store has grown past its ceiling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use trailcheck_core::{EntityKey, EntityKind};

/// How long tickets and changesets stay fresh
pub const TICKET_TTL: Duration = Duration::from_secs(300);
pub const CHANGESET_TTL: Duration = Duration::from_secs(300);
/// Profiles change less often
pub const PROFILE_TTL: Duration = Duration::from_secs(600);

pub const DEFAULT_CEILING: usize = 1000;

pub fn ttl(kind: EntityKind) -> Duration {
    match kind {
        EntityKind::Ticket => TICKET_TTL,
        EntityKind::Changeset => CHANGESET_TTL,
        EntityKind::Profile => PROFILE_TTL,
    }
}

/// A stored lookup result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub exists: bool,
    pub detail: Option<String>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, kind: EntityKind, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl(kind)
    }
}

#[derive(Debug)]
pub struct EntityCache {
    entries: Mutex<HashMap<EntityKey, Arc<CacheEntry>>>,
    ceiling: usize,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING)
    }
}

impl EntityCache {
    pub fn new(ceiling: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ceiling,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<EntityKey, Arc<CacheEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh entry for `key`, if any.
    pub fn get(&self, key: &EntityKey) -> Option<Arc<CacheEntry>> {
        let now = Instant::now();
        self.entries()
            .get(key)
            .filter(|entry| entry.is_fresh(key.kind, now))
            .cloned()
    }

    /// Store a result, replacing whatever was there.
    pub fn put(&self, key: EntityKey, exists: bool, detail: Option<String>) -> Arc<CacheEntry> {
        let now = Instant::now();
        let entry = Arc::new(CacheEntry {
            exists,
            detail,
            fetched_at: now,
        });

        let mut entries = self.entries();
        if entries.len() > self.ceiling {
            let evicted = sweep(&mut entries, now);
            debug!(evicted, remaining = entries.len(), "swept expired cache entries");
        }
        entries.insert(key, Arc::clone(&entry));
        entry
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        sweep(&mut self.entries(), Instant::now())
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

fn sweep(entries: &mut HashMap<EntityKey, Arc<CacheEntry>>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|key, entry| entry.is_fresh(key.kind, now));
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(id: &str) -> EntityKey {
        EntityKey::new(EntityKind::Ticket, id)
    }

    #[tokio::test(start_paused = true)]
    async fn round_trip() {
        let cache = EntityCache::default();
        assert!(cache.get(&ticket("1")).is_none());

        cache.put(ticket("1"), true, Some("Title".to_string()));
        let entry = cache.get(&ticket("1")).expect("fresh entry");
        assert!(entry.exists);
        assert_eq!(entry.detail.as_deref(), Some("Title"));

        // Kind is part of the identity
        assert!(cache.get(&EntityKey::new(EntityKind::Changeset, "1")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_not_returned() {
        let cache = EntityCache::default();
        cache.put(ticket("1"), false, None);
        cache.put(EntityKey::new(EntityKind::Profile, "alice"), true, None);

        tokio::time::advance(TICKET_TTL).await;
        assert!(cache.get(&ticket("1")).is_none());
        assert!(cache.get(&EntityKey::new(EntityKind::Profile, "alice")).is_some());

        // Still stored until a sweep
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);

        tokio::time::advance(PROFILE_TTL).await;
        assert!(cache.get(&EntityKey::new(EntityKind::Profile, "alice")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn put_sweeps_above_ceiling() {
        let cache = EntityCache::new(2);
        for id in ["1", "2", "3"] {
            cache.put(ticket(id), true, None);
        }
        assert_eq!(cache.len(), 3);

        tokio::time::advance(TICKET_TTL + Duration::from_secs(1)).await;
        cache.put(ticket("4"), true, None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_replaces_entry() {
        let cache = EntityCache::default();
        cache.put(ticket("1"), false, None);
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.put(ticket("1"), true, Some("Now exists".to_string()));

        tokio::time::advance(Duration::from_secs(200)).await;
        let entry = cache.get(&ticket("1")).expect("refreshed entry");
        assert!(entry.exists);
    }
}
