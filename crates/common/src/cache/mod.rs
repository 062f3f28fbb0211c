//! In-process TTL cache
//!
//! Holds generated summaries keyed by their document set. Backed by
//! `moka`: entries expire after a fixed TTL and the cache stays within
//! its capacity.

use crate::config::SummaryCacheConfig;
use crate::metrics::record_cache;
use moka::future::Cache;
use std::hash::Hash;
use std::time::Duration;

pub struct TtlCache<K, V> {
    name: &'static str,
    inner: Cache<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, capacity: usize, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .name(name)
            .max_capacity(capacity.max(1) as u64)
            .time_to_live(ttl)
            .build();

        Self { name, inner }
    }

    /// Value for `key` unless it is missing or expired
    pub async fn get(&self, key: &K) -> Option<V> {
        let value = self.inner.get(key).await;
        record_cache(value.is_some(), self.name);
        value
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.insert(key, value).await;
    }
}

/// Summaries keyed by the sorted set of document ids
pub type SummaryCache = TtlCache<String, String>;

impl SummaryCache {
    pub fn from_config(config: &SummaryCacheConfig) -> Self {
        Self::new("summary", config.capacity, Duration::from_secs(config.ttl_secs))
    }
}

/// Order-insensitive key for a set of document ids
pub fn summary_key(document_ids: &[String]) -> String {
    let mut ids: Vec<&str> = document_ids.iter().map(|s| s.trim()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_and_insert() {
        let cache: TtlCache<String, String> = TtlCache::new("test", 10, Duration::from_secs(60));
        assert!(cache.get(&"a".to_string()).await.is_none());

        cache.insert("a".into(), "alpha".into()).await;
        assert_eq!(cache.get(&"a".to_string()).await.as_deref(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_expired_entries_are_ignored() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", 10, Duration::from_millis(20));
        cache.insert(1, 10).await;
        assert_eq!(cache.get(&1).await, Some(10));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", 2, Duration::from_secs(60));
        for i in 0..10 {
            cache.insert(i, i * 10).await;
        }

        cache.inner.run_pending_tasks().await;
        assert!(cache.inner.entry_count() <= 2);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let cache: TtlCache<u32, u32> = TtlCache::new("test", 2, Duration::from_secs(60));
        cache.insert(2, 20).await;
        cache.insert(2, 21).await;
        assert_eq!(cache.get(&2).await, Some(21));
    }

    #[test]
    fn test_summary_key_is_order_insensitive() {
        let a = summary_key(&["3".into(), "1".into(), "2".into()]);
        let b = summary_key(&["2".into(), "3".into(), "1".into(), "1".into()]);
        assert_eq!(a, "1,2,3");
        assert_eq!(a, b);
    }
}
