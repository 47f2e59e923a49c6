//! Link management: the write path behind the dashboard/API.
//!
//! Unlike the hot resolution path, errors here are surfaced to the caller so
//! the dashboard can show why an action failed. Every mutation that touches
//! a resolver-relevant field deletes the old cache key; the new key is
//! populated lazily on the next resolution.

use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::LinkCache;
use crate::models::{Link, LinkUpdate, NewLink, Plan};
use crate::password;
use crate::storage::{LinkStore, StoreError};

#[derive(Debug, Error)]
pub enum LinkServiceError {
    #[error("alias '{0}' is already taken on this domain")]
    AliasTaken(String),
    #[error("link not found")]
    NotFound,
    #[error("unknown owner '{0}'")]
    UnknownOwner(String),
    #[error("password protection requires a Pro or Ultra plan")]
    PasswordRequiresPaidPlan,
    #[error("monthly link limit reached for the {0} plan")]
    LinkLimitReached(Plan),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Request to create a link. `alias: None` asks for a random one.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CreateLink {
    pub owner_id: String,
    pub domain: String,
    pub url: String,
    pub alias: Option<String>,
    pub password: Option<String>,
    pub folder_id: Option<i64>,
    pub disable_after_clicks: Option<i64>,
    pub disable_after_date: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

pub struct LinkService {
    store: Arc<dyn LinkStore>,
    cache: Arc<dyn LinkCache>,
}

impl LinkService {
    pub fn new(store: Arc<dyn LinkStore>, cache: Arc<dyn LinkCache>) -> Self {
        Self { store, cache }
    }

    pub async fn create(&self, req: CreateLink) -> Result<Link, LinkServiceError> {
        let owner = self
            .store
            .owner(&req.owner_id)
            .await?
            .ok_or_else(|| LinkServiceError::UnknownOwner(req.owner_id.clone()))?;
        let plan = owner.plan();

        if let Some(cap) = plan.monthly_link_cap() {
            let created = self
                .store
                .links_created_since(&req.owner_id, month_start())
                .await?;
            if created >= cap {
                return Err(LinkServiceError::LinkLimitReached(plan));
            }
        }

        let password_hash = match req.password.as_deref() {
            Some(pw) => {
                if !plan.allows_password_protection() {
                    return Err(LinkServiceError::PasswordRequiresPaidPlan);
                }
                Some(password::hash(pw).await?)
            }
            None => None,
        };

        let alias = req.alias.clone().unwrap_or_else(random_alias);
        let new = NewLink {
            alias: alias.clone(),
            domain: req.domain,
            url: req.url,
            password_hash,
            owner_id: req.owner_id,
            folder_id: req.folder_id,
            disable_after_clicks: req.disable_after_clicks,
            disable_after_date: req.disable_after_date,
            title: req.title,
            description: req.description,
            image: req.image,
        };

        match self.store.create_link(&new).await {
            Ok(link) => Ok(link),
            Err(StoreError::AliasTaken) => Err(LinkServiceError::AliasTaken(alias)),
            Err(StoreError::Other(e)) => Err(LinkServiceError::Other(e)),
        }
    }

    /// Apply a partial update. The pre-update cache key is deleted whenever
    /// the update touches a resolver-relevant field; renamed links get their
    /// new key on the next read rather than eagerly.
    pub async fn update(&self, id: i64, changes: LinkUpdate) -> Result<Link, LinkServiceError> {
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(LinkServiceError::NotFound)?;

        let updated = match self.store.update_link(id, &changes).await {
            Ok(Some(link)) => link,
            Ok(None) => return Err(LinkServiceError::NotFound),
            Err(StoreError::AliasTaken) => {
                return Err(LinkServiceError::AliasTaken(
                    changes.alias.unwrap_or_default(),
                ))
            }
            Err(StoreError::Other(e)) => return Err(LinkServiceError::Other(e)),
        };

        if changes.invalidates_cache() {
            self.cache.delete(&current.cache_key()).await;
        }

        Ok(updated)
    }

    /// Set or clear a link's password. Setting one is a paid-plan feature;
    /// this is a management-path rejection, surfaced to the caller.
    pub async fn set_password(
        &self,
        id: i64,
        new_password: Option<&str>,
    ) -> Result<Link, LinkServiceError> {
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(LinkServiceError::NotFound)?;

        let password_hash = match new_password {
            Some(pw) => {
                let owner = self
                    .store
                    .owner(&current.owner_id)
                    .await?
                    .ok_or_else(|| LinkServiceError::UnknownOwner(current.owner_id.clone()))?;
                if !owner.plan().allows_password_protection() {
                    return Err(LinkServiceError::PasswordRequiresPaidPlan);
                }
                Some(password::hash(pw).await?)
            }
            None => None,
        };

        self.update(
            id,
            LinkUpdate {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await
    }

    /// Hard delete. Visit rows, unique-visit rows and tag bindings cascade
    /// in the store; the cache entry is deleted explicitly.
    pub async fn delete(&self, id: i64) -> Result<(), LinkServiceError> {
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(LinkServiceError::NotFound)?;

        if !self.store.delete_link(id).await? {
            return Err(LinkServiceError::NotFound);
        }
        self.cache.delete(&current.cache_key()).await;

        Ok(())
    }

    /// Bulk-delete all recorded visits for a link.
    pub async fn reset_statistics(&self, id: i64) -> Result<(), LinkServiceError> {
        if self.store.find_by_id(id).await?.is_none() {
            return Err(LinkServiceError::NotFound);
        }
        self.store.reset_statistics(id).await?;
        Ok(())
    }
}

/// Unix timestamp of the first instant of the current month (UTC).
fn month_start() -> i64 {
    use chrono::{Datelike, TimeZone, Utc};
    let now = Utc::now();
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

/// Random 7-character alphanumeric alias.
fn random_alias() -> String {
    use rand::RngExt;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..7)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_alias_shape() {
        let alias = random_alias();
        assert_eq!(alias.len(), 7);
        assert!(alias.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_alias(), random_alias());
    }
}
