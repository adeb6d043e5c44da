/*
 * Responsibility
 * - 検証済み claim の in-memory cache (key = raw token 文字列そのもの)
 * - sliding TTL: 最終アクセスから ttl 経過したエントリは無効
 * - cache 全体のロックは持たない (DashMap の shard ロックのみ)
 */
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::services::clock::Clock;
use crate::services::token::Claims;

pub trait VerificationCache: Send + Sync + 'static {
    /// Returns the cached claims and refreshes the entry's last access time.
    fn get(&self, raw: &str) -> Option<Arc<Claims>>;
    fn insert(&self, raw: &str, claims: Arc<Claims>);
    fn invalidate(&self, raw: &str);
    /// Drops every entry idle for at least the TTL. Returns how many were removed.
    fn purge_idle(&self) -> usize;
    fn len(&self) -> usize;
}

#[derive(Debug)]
struct Entry {
    claims: Arc<Claims>,
    last_access: DateTime<Utc>,
}

pub struct SlidingTtlCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SlidingTtlCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    fn is_idle(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now - entry.last_access >= self.ttl
    }
}

impl VerificationCache for SlidingTtlCache {
    fn get(&self, raw: &str) -> Option<Arc<Claims>> {
        let now = self.clock.now();

        {
            let mut entry = self.entries.get_mut(raw)?;
            if !self.is_idle(&entry, now) {
                entry.last_access = now;
                return Some(entry.claims.clone());
            }
        }

        // shard の write guard を離してから消す
        self.entries
            .remove_if(raw, |_, entry| self.is_idle(entry, now));
        None
    }

    fn insert(&self, raw: &str, claims: Arc<Claims>) {
        let entry = Entry {
            claims,
            last_access: self.clock.now(),
        };
        self.entries.insert(raw.to_string(), entry);
    }

    fn invalidate(&self, raw: &str) {
        self.entries.remove(raw);
    }

    fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_idle(entry, now));
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::testutil;

    fn cache(clock: &ManualClock) -> SlidingTtlCache {
        SlidingTtlCache::new(Duration::minutes(15), Arc::new(clock.clone()))
    }

    #[test]
    fn hit_before_ttl_refreshes_last_access() {
        let clock = ManualClock::at(testutil::epoch());
        let cache = cache(&clock);
        cache.insert("a.b.c", testutil::claims("user-1"));

        clock.advance(Duration::minutes(10));
        assert!(cache.get("a.b.c").is_some());

        // 直前の get で延長されているので、挿入から 20 分後でも生きている
        clock.advance(Duration::minutes(10));
        assert!(cache.get("a.b.c").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entry_idle_for_ttl_is_evicted() {
        let clock = ManualClock::at(testutil::epoch());
        let cache = cache(&clock);
        cache.insert("a.b.c", testutil::claims("user-1"));

        clock.advance(Duration::minutes(15));
        assert!(cache.get("a.b.c").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn invalidate_removes_entry() {
        let clock = ManualClock::at(testutil::epoch());
        let cache = cache(&clock);
        cache.insert("a.b.c", testutil::claims("user-1"));
        cache.invalidate("a.b.c");
        assert!(cache.get("a.b.c").is_none());
    }

    #[test]
    fn purge_idle_only_drops_stale_entries() {
        let clock = ManualClock::at(testutil::epoch());
        let cache = cache(&clock);
        cache.insert("old.b.c", testutil::claims("user-1"));
        clock.advance(Duration::minutes(14));
        cache.insert("new.b.c", testutil::claims("user-2"));
        clock.advance(Duration::minutes(1));

        assert_eq!(cache.purge_idle(), 1);
        assert!(cache.get("new.b.c").is_some());
        assert!(cache.get("old.b.c").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_access_on_overlapping_keys() {
        let clock = ManualClock::at(testutil::epoch());
        let cache = Arc::new(cache(&clock));
        cache.insert("stable.b.c", testutil::claims("stable"));

        let tasks: Vec<_> = (0..8)
            .map(|task| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..2_000usize {
                        let key = format!("k{}.b.c", (task + i) % 4);
                        let subject = format!("user-{}", (task + i) % 4);
                        match i % 4 {
                            0 => cache.insert(&key, testutil::claims(&subject)),
                            1 | 2 => {
                                if let Some(claims) = cache.get(&key) {
                                    assert_eq!(claims.subject, subject);
                                }
                            }
                            _ => cache.invalidate(&key),
                        }
                        if i % 250 == 0 {
                            cache.purge_idle();
                        }
                        assert!(cache.get("stable.b.c").is_some());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let all = async {
            for task in tasks {
                task.await.unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(30), all)
            .await
            .expect("cache operations deadlocked");

        assert!(cache.len() <= 5);
        assert_eq!(cache.get("stable.b.c").unwrap().subject, "stable");
    }
}
