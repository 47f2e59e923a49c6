//! Resolution path integration tests: cache-aside behavior,
//! case-insensitive alias matching and invalidation on mutation.

use std::sync::Arc;
use std::time::Duration;

use ishortn::analytics::{UsageMeter, VisitRecorder};
use ishortn::cache::{LinkCache, MokaLinkCache};
use ishortn::links::LinkService;
use ishortn::models::{NewLink, Owner};
use ishortn::resolver::LinkResolver;
use ishortn::storage::{LinkStore, SqliteStore};

struct Fixture {
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn LinkCache>,
    resolver: LinkResolver,
    service: LinkService,
}

async fn fixture() -> Fixture {
    let store: Arc<dyn LinkStore> = {
        let store = SqliteStore::new("sqlite::memory:", 5).await.unwrap();
        store.init().await.unwrap();
        Arc::new(store)
    };
    store
        .upsert_owner(&Owner {
            id: "user_1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            plan: "pro".into(),
        })
        .await
        .unwrap();

    let cache: Arc<dyn LinkCache> =
        Arc::new(MokaLinkCache::new(1024, Duration::from_secs(300)));
    let recorder = Arc::new(VisitRecorder::new(
        Arc::clone(&store),
        UsageMeter::new(Arc::clone(&store)),
        None,
        true,
    ));
    let resolver = LinkResolver::new(Arc::clone(&store), Arc::clone(&cache), recorder);
    let service = LinkService::new(Arc::clone(&store), Arc::clone(&cache));

    Fixture {
        store,
        cache,
        resolver,
        service,
    }
}

async fn create_promo(fx: &Fixture) -> i64 {
    fx.store
        .create_link(&NewLink {
            alias: "promo".into(),
            domain: "ishortn.ink".into(),
            url: "https://example.com".into(),
            owner_id: "user_1".into(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn resolution_is_case_insensitive_on_alias() {
    let fx = fixture().await;
    create_promo(&fx).await;

    let lower = fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .unwrap();
    let upper = fx
        .resolver
        .resolve("ishortn.ink", "PROMO")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(lower.link.id, upper.link.id);
    assert_eq!(upper.link.url, "https://example.com");
}

#[tokio::test]
async fn store_sourced_resolution_populates_cache() {
    let fx = fixture().await;
    create_promo(&fx).await;

    let first = fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .unwrap();
    assert!(!first.cache_hit, "first lookup must come from the store");

    let second = fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .unwrap();
    assert!(second.cache_hit, "second lookup must be served from cache");
    assert_eq!(second.link.url, "https://example.com");
}

#[tokio::test]
async fn alias_update_invalidates_old_cache_key() {
    let fx = fixture().await;
    let id = create_promo(&fx).await;

    // Warm the cache under the old alias
    fx.resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .unwrap();
    assert!(fx.cache.get("ishortn.ink:promo").await.is_some());

    fx.service
        .update(id, ishortn::models::LinkUpdate {
            alias: Some("sale".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    // Old key no longer resolves to the pre-update record
    assert!(fx.cache.get("ishortn.ink:promo").await.is_none());
    assert!(fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .is_none());

    // New key resolves correctly (populated on read, not eagerly)
    let renamed = fx
        .resolver
        .resolve("ishortn.ink", "sale")
        .await
        .unwrap()
        .unwrap();
    assert!(!renamed.cache_hit);
    assert_eq!(renamed.link.url, "https://example.com");
}

#[tokio::test]
async fn variant_cased_lookup_does_not_survive_alias_update() {
    let fx = fixture().await;
    let id = create_promo(&fx).await;

    // Warm the cache through an odd-cased request
    fx.resolver
        .resolve("ishortn.ink", "PROMO")
        .await
        .unwrap()
        .unwrap();

    fx.service
        .update(id, ishortn::models::LinkUpdate {
            alias: Some("sale".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    // No casing of the old alias may keep serving the pre-update record
    assert!(fx
        .resolver
        .resolve("ishortn.ink", "PROMO")
        .await
        .unwrap()
        .is_none());
    assert!(fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn variant_cased_lookup_cannot_bypass_a_new_password() {
    let fx = fixture().await;
    let id = create_promo(&fx).await;

    fx.resolver
        .resolve("ishortn.ink", "PROMO")
        .await
        .unwrap()
        .unwrap();

    fx.service.set_password(id, Some("hunter2")).await.unwrap();

    let resolution = fx
        .resolver
        .resolve("ishortn.ink", "PROMO")
        .await
        .unwrap()
        .unwrap();
    assert!(
        resolution.link.is_protected(),
        "stale cache entry must not reveal a newly protected link"
    );
}

#[tokio::test]
async fn domain_is_matched_exactly() {
    let fx = fixture().await;
    create_promo(&fx).await;

    assert!(fx
        .resolver
        .resolve("other.ink", "promo")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn nonexistent_alias_resolves_to_none_without_writes() {
    let fx = fixture().await;
    let id = create_promo(&fx).await;

    assert!(fx
        .resolver
        .resolve("ishortn.ink", "missing")
        .await
        .unwrap()
        .is_none());

    // Nothing was recorded anywhere
    assert_eq!(fx.store.visit_count(id).await.unwrap(), 0);
    assert_eq!(fx.store.unique_visit_count(id).await.unwrap(), 0);
    assert!(fx.store.usage_counter("user_1").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_invalidates_cache_and_cascades() {
    let fx = fixture().await;
    let id = create_promo(&fx).await;

    fx.resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .unwrap();
    fx.store.record_unique_visit(id, "hash_a").await.unwrap();

    fx.service.delete(id).await.unwrap();

    assert!(fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .is_none());
    assert_eq!(fx.store.unique_visit_count(id).await.unwrap(), 0);
}
