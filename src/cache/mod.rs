//! Side-cache for resolved links.
//!
//! Keys are `"<domain>:<alias>"`. The persistent store stays authoritative:
//! the resolver populates entries on a miss and mutations delete the old key
//! explicitly. Entries additionally carry a TTL so a missed invalidation can
//! only serve a stale record for a bounded window.

use crate::models::Link;
use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

#[async_trait]
pub trait LinkCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Link>;
    async fn set(&self, key: String, link: Link);
    async fn delete(&self, key: &str);
}

/// In-process Moka-backed cache.
///
/// An in-process cache cannot become unavailable, so the degraded mode the
/// resolver has to handle collapses to "entry absent". The trait seam exists
/// so a remote cache (with real failure modes) can be swapped in behind the
/// same contract.
pub struct MokaLinkCache {
    inner: Cache<String, Link>,
}

impl MokaLinkCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl LinkCache for MokaLinkCache {
    async fn get(&self, key: &str) -> Option<Link> {
        self.inner.get(key).await
    }

    async fn set(&self, key: String, link: Link) {
        self.inner.insert(key, link).await;
    }

    async fn delete(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(alias: &str) -> Link {
        Link {
            id: 1,
            alias: alias.into(),
            domain: "ishortn.ink".into(),
            url: "https://example.com".into(),
            password_hash: None,
            disabled: false,
            archived: false,
            owner_id: "user_1".into(),
            folder_id: None,
            disable_after_clicks: None,
            disable_after_date: None,
            title: None,
            description: None,
            image: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MokaLinkCache::new(16, Duration::from_secs(60));
        let l = link("promo");

        assert!(cache.get("ishortn.ink:promo").await.is_none());
        cache.set(l.cache_key(), l.clone()).await;
        assert_eq!(
            cache.get("ishortn.ink:promo").await.map(|l| l.url),
            Some("https://example.com".to_string())
        );

        cache.delete("ishortn.ink:promo").await;
        assert!(cache.get("ishortn.ink:promo").await.is_none());
    }

    #[tokio::test]
    async fn keys_are_case_sensitive() {
        let cache = MokaLinkCache::new(16, Duration::from_secs(60));
        let l = link("promo");
        cache.set(l.cache_key(), l).await;

        // The store treats promo/PROMO as the same alias; the cache does not.
        assert!(cache.get("ishortn.ink:PROMO").await.is_none());
    }
}
