use crate::models::{Link, LinkUpdate, LinkVisit, NewLink, NewVisit, Owner};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("alias already exists for this domain")]
    AliasTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-owner monthly event aggregate. `period` is `"YYYY-MM"`; a row whose
/// period differs from the current month reads as zero.
#[derive(Debug, Clone)]
pub struct UsageCounter {
    pub owner_id: String,
    pub period: String,
    pub events: i64,
}

/// Persistent store for links, visits and usage counters.
///
/// The store is the source of truth; the cache layer in front of it is a
/// disposable speed optimization.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Initialize the storage (create tables, indexes).
    async fn init(&self) -> Result<()>;

    async fn create_link(&self, new: &NewLink) -> StoreResult<Link>;

    /// Lookup by `(domain, alias)`. Domain matches exactly, alias
    /// case-insensitively.
    async fn find_by_alias(&self, domain: &str, alias: &str) -> Result<Option<Link>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Link>>;

    /// Replace the mutable columns of `id` with the merged update. Returns
    /// the new row, or `None` when the link does not exist.
    async fn update_link(&self, id: i64, changes: &LinkUpdate) -> StoreResult<Option<Link>>;

    /// Hard delete; visits, unique visits and tag bindings cascade.
    async fn delete_link(&self, id: i64) -> Result<bool>;

    async fn record_visit(&self, visit: &NewVisit) -> Result<()>;

    /// Insert-if-absent on `(link_id, ip_hash)`. Returns whether a row was
    /// actually inserted, i.e. whether this visitor was new for the link.
    async fn record_unique_visit(&self, link_id: i64, ip_hash: &str) -> Result<bool>;

    async fn visit_count(&self, link_id: i64) -> Result<i64>;

    /// Most recent visit rows for a link, newest first.
    async fn recent_visits(&self, link_id: i64, limit: i64) -> Result<Vec<LinkVisit>>;

    async fn unique_visit_count(&self, link_id: i64) -> Result<i64>;

    /// Grouped visit counts by raw referer value (unnormalized; presentation
    /// maps empty/"null" to "Direct").
    async fn referer_counts(&self, link_id: i64) -> Result<Vec<(Option<String>, i64)>>;

    /// Bulk-delete all visit rows for a link ("reset statistics").
    async fn reset_statistics(&self, link_id: i64) -> Result<()>;

    async fn owner(&self, owner_id: &str) -> Result<Option<Owner>>;

    async fn upsert_owner(&self, owner: &Owner) -> Result<()>;

    /// Links created by `owner_id` at or after `since` (unix seconds). Used
    /// for per-plan monthly link caps.
    async fn links_created_since(&self, owner_id: &str, since: i64) -> Result<i64>;

    async fn usage_counter(&self, owner_id: &str) -> Result<Option<UsageCounter>>;

    async fn set_usage_counter(&self, owner_id: &str, period: &str, events: i64) -> Result<()>;
}
