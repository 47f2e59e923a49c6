//! Ingestion pipeline integration tests: bot suppression, plan caps,
//! unique-visitor dedup and the password gate's analytics side-effect.

use std::sync::Arc;
use std::time::Duration;

use ishortn::analytics::{RequestContext, UsageMeter, VisitOutcome, VisitRecorder};
use ishortn::cache::{LinkCache, MokaLinkCache};
use ishortn::models::{Link, LinkUpdate, NewLink, Owner, Plan};
use ishortn::resolver::{LinkResolver, Unlock};
use ishortn::storage::{LinkStore, SqliteStore};

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const GOOGLEBOT_UA: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

fn current_period() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}

fn browser_ctx(ip: &str) -> RequestContext {
    RequestContext {
        user_agent: Some(CHROME_UA.to_string()),
        referer: Some("https://news.ycombinator.com/".to_string()),
        client_ip: ip.to_string(),
        ..Default::default()
    }
}

struct Fixture {
    store: Arc<dyn LinkStore>,
    recorder: Arc<VisitRecorder>,
    resolver: LinkResolver,
}

async fn fixture(plan: &str) -> Fixture {
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
            plan: plan.into(),
        })
        .await
        .unwrap();

    let recorder = Arc::new(VisitRecorder::new(
        Arc::clone(&store),
        UsageMeter::new(Arc::clone(&store)),
        None,
        true,
    ));
    let cache: Arc<dyn LinkCache> =
        Arc::new(MokaLinkCache::new(1024, Duration::from_secs(300)));
    let resolver = LinkResolver::new(Arc::clone(&store), cache, Arc::clone(&recorder));

    Fixture {
        store,
        recorder,
        resolver,
    }
}

async fn create_link(fx: &Fixture, password_hash: Option<String>) -> Link {
    fx.store
        .create_link(&NewLink {
            alias: "promo".into(),
            domain: "ishortn.ink".into(),
            url: "https://example.com".into(),
            owner_id: "user_1".into(),
            password_hash,
            ..Default::default()
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn bot_visits_are_dropped_before_any_write() {
    let fx = fixture("pro").await;
    let link = create_link(&fx, None).await;

    let ctx = RequestContext {
        user_agent: Some(GOOGLEBOT_UA.to_string()),
        client_ip: "203.0.113.9".to_string(),
        ..Default::default()
    };
    let outcome = fx.recorder.record(&link, &ctx).await.unwrap();

    assert_eq!(outcome, VisitOutcome::Bot);
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 0);
    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 0);
    // Bots never reach the usage meter either
    assert!(fx.store.usage_counter("user_1").await.unwrap().is_none());
}

#[tokio::test]
async fn over_cap_owner_still_redirects_but_nothing_persists() {
    let fx = fixture("free").await;
    let link = create_link(&fx, None).await;

    let cap = Plan::Free.monthly_event_cap();
    fx.store
        .set_usage_counter("user_1", &current_period(), cap)
        .await
        .unwrap();

    // The redirect path is unaffected
    let resolution = fx
        .resolver
        .resolve("ishortn.ink", "promo")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolution.link.url, "https://example.com");

    let outcome = fx
        .recorder
        .record(&link, &browser_ctx("203.0.113.9"))
        .await
        .unwrap();
    assert_eq!(outcome, VisitOutcome::CapExceeded);
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 0);
    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 0);
}

#[tokio::test]
async fn unique_visits_dedup_by_hashed_ip() {
    let fx = fixture("pro").await;
    let link = create_link(&fx, None).await;

    let first = fx
        .recorder
        .record(&link, &browser_ctx("203.0.113.9"))
        .await
        .unwrap();
    assert_eq!(first, VisitOutcome::Recorded { unique: true });

    let repeat = fx
        .recorder
        .record(&link, &browser_ctx("203.0.113.9"))
        .await
        .unwrap();
    assert_eq!(repeat, VisitOutcome::Recorded { unique: false });
    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 1);

    let other = fx
        .recorder
        .record(&link, &browser_ctx("198.51.100.7"))
        .await
        .unwrap();
    assert_eq!(other, VisitOutcome::Recorded { unique: true });

    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 2);
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 3);
}

#[tokio::test]
async fn recorded_visit_carries_the_fingerprint() {
    let fx = fixture("pro").await;
    let link = create_link(&fx, None).await;

    fx.recorder
        .record(&link, &browser_ctx("203.0.113.9"))
        .await
        .unwrap();

    let visits = fx.store.recent_visits(link.id, 10).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].browser.as_deref(), Some("Chrome"));
    assert_eq!(visits[0].device.as_deref(), Some("pc"));
    assert_eq!(
        visits[0].referer.as_deref(),
        Some("https://news.ycombinator.com/")
    );
}

#[tokio::test]
async fn wrong_password_reveals_nothing_and_writes_nothing() {
    let fx = fixture("pro").await;
    let hash = ishortn::password::hash("hunter2").await.unwrap();
    let link = create_link(&fx, Some(hash)).await;

    let outcome = fx
        .resolver
        .verify_password(link.id, "letmein", browser_ctx("203.0.113.9"))
        .await
        .unwrap();
    assert!(matches!(outcome, Unlock::Denied));

    // Give any (erroneous) detached write a chance to land before asserting
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 0);
    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 0);
}

#[tokio::test]
async fn correct_password_reveals_link_and_records_the_click() {
    let fx = fixture("pro").await;
    let hash = ishortn::password::hash("hunter2").await.unwrap();
    let link = create_link(&fx, Some(hash)).await;

    let revealed = match fx
        .resolver
        .verify_password(link.id, "hunter2", browser_ctx("203.0.113.9"))
        .await
        .unwrap()
    {
        Unlock::Revealed(link) => link,
        other => panic!("correct password must reveal the link, got {other:?}"),
    };
    assert_eq!(revealed.url, "https://example.com");

    // The click is recorded on a detached task
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 1);
    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 1);
}

#[tokio::test]
async fn correct_password_on_a_disabled_link_stays_locked() {
    let fx = fixture("pro").await;
    let hash = ishortn::password::hash("hunter2").await.unwrap();
    let link = create_link(&fx, Some(hash)).await;
    fx.store
        .update_link(
            link.id,
            &LinkUpdate {
                disabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let outcome = fx
        .resolver
        .verify_password(link.id, "hunter2", browser_ctx("203.0.113.9"))
        .await
        .unwrap();
    assert!(matches!(outcome, Unlock::Inactive));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 0);
    assert_eq!(fx.store.unique_visit_count(link.id).await.unwrap(), 0);
}

#[tokio::test]
async fn protected_links_record_nothing_from_the_redirect_path() {
    let fx = fixture("pro").await;
    let hash = ishortn::password::hash("hunter2").await.unwrap();
    let link = create_link(&fx, Some(hash)).await;

    // A redirect-context click on a protected link is not a visit
    fx.resolver
        .record_click(&link, browser_ctx("203.0.113.9"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.store.visit_count(link.id).await.unwrap(), 0);
}
