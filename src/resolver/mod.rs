//! Link resolution: the redirect hot path.
//!
//! Resolution is cache-aside over the persistent store, with analytics as a
//! detached side-effect. Correctness of the redirect always wins over
//! completeness of analytics: lookup failures on the store surface, but
//! nothing on the analytics path ever propagates back to the caller.

use anyhow::Result;
use std::sync::Arc;

use crate::analytics::{RequestContext, VisitRecorder};
use crate::cache::LinkCache;
use crate::models::{cache_key, Link};
use crate::password;
use crate::storage::LinkStore;

/// A resolved link plus where it came from. `cache_hit` backs the cache
/// response headers and the cache-population tests.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub link: Link,
    pub cache_hit: bool,
}

/// Why a link would not redirect right now. The resolver still returns the
/// record for every variant; callers decide between redirecting and showing
/// an inactive-link page, since owners want to see why a link went dark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Active,
    Disabled,
    /// `disable_after_date` has passed.
    Expired,
    /// `disable_after_clicks` has been reached.
    ClickBudgetExhausted,
}

/// Outcome of a password unlock attempt.
#[derive(Debug, Clone)]
pub enum Unlock {
    /// Correct password on a live link; the click has been dispatched.
    Revealed(Link),
    /// Unknown link, unprotected link, or wrong password.
    Denied,
    /// The password matched but the link is no longer live.
    Inactive,
}

pub struct LinkResolver {
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn LinkCache>,
    recorder: Arc<VisitRecorder>,
}

impl LinkResolver {
    pub fn new(
        store: Arc<dyn LinkStore>,
        cache: Arc<dyn LinkCache>,
        recorder: Arc<VisitRecorder>,
    ) -> Self {
        Self {
            store,
            cache,
            recorder,
        }
    }

    /// Resolve `(domain, alias)` to a link.
    ///
    /// Cache get first (key keeps the request's casing); on a miss, a
    /// case-insensitive store lookup, and a store-sourced hit is written
    /// back into the cache before returning. `None` means no record exists
    /// and nothing was written anywhere.
    pub async fn resolve(&self, domain: &str, alias: &str) -> Result<Option<Resolution>> {
        let key = cache_key(domain, alias);
        if let Some(link) = self.cache.get(&key).await {
            return Ok(Some(Resolution {
                link,
                cache_hit: true,
            }));
        }

        match self.store.find_by_alias(domain, alias).await? {
            Some(link) => {
                // Only the canonical key is populated. Mutations invalidate
                // exactly that key, so no other entry may exist for a link;
                // variant-cased requests always go back to the store.
                self.cache.set(link.cache_key(), link.clone()).await;
                Ok(Some(Resolution {
                    link,
                    cache_hit: false,
                }))
            }
            None => Ok(None),
        }
    }

    /// Evaluate whether the link should redirect right now.
    pub async fn liveness(&self, link: &Link) -> Result<Liveness> {
        if link.disabled {
            return Ok(Liveness::Disabled);
        }

        if let Some(deadline) = link.disable_after_date {
            if chrono::Utc::now().timestamp() >= deadline {
                return Ok(Liveness::Expired);
            }
        }

        if let Some(budget) = link.disable_after_clicks {
            let clicks = self.store.visit_count(link.id).await?;
            if clicks >= budget {
                return Ok(Liveness::ClickBudgetExhausted);
            }
        }

        Ok(Liveness::Active)
    }

    /// Record a click from a redirect context as a detached side-effect.
    ///
    /// Protected links are skipped here: their click is recorded by
    /// [`verify_password`](Self::verify_password) on a successful unlock,
    /// and metadata-preview callers simply never call this.
    pub fn record_click(&self, link: &Link, ctx: RequestContext) {
        if link.is_protected() {
            return;
        }
        Arc::clone(&self.recorder).dispatch(link.clone(), ctx);
    }

    /// Password gate for protected links.
    ///
    /// On a match against a live link the destination is revealed and the
    /// password entry is recorded as the click (same detached pipeline as a
    /// normal visit). A mismatch is `Denied`, a correct password on a dead
    /// link is `Inactive`; neither writes any analytics row.
    pub async fn verify_password(
        &self,
        link_id: i64,
        candidate: &str,
        ctx: RequestContext,
    ) -> Result<Unlock> {
        let Some(link) = self.store.find_by_id(link_id).await? else {
            return Ok(Unlock::Denied);
        };
        let Some(stored) = link.password_hash.as_deref() else {
            // Not a protected link; nothing to unlock.
            return Ok(Unlock::Denied);
        };

        if !password::verify(candidate, stored).await? {
            return Ok(Unlock::Denied);
        }

        if self.liveness(&link).await? != Liveness::Active {
            return Ok(Unlock::Inactive);
        }

        Arc::clone(&self.recorder).dispatch(link.clone(), ctx);
        Ok(Unlock::Revealed(link))
    }
}
