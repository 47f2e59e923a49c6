//! Per-owner monthly usage metering with plan-based caps.
//!
//! The meter is a soft, fail-open gate for redirection and a hard,
//! fail-closed gate for analytics persistence: an over-cap owner still gets
//! their links resolved, only the visit rows stop being written.
//!
//! The counter update is read-then-write; concurrent visits can overshoot
//! the cap by a small margin, which is an accepted tolerance of the soft
//! cap.

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use std::sync::Arc;

use crate::models::Plan;
use crate::storage::LinkStore;

/// Alert thresholds, in percent of the monthly cap.
const APPROACHING_THRESHOLD_PCT: i64 = 80;

/// Outcome of metering one event.
#[derive(Debug, Clone)]
pub struct EventUsage {
    /// Whether the visit may be persisted.
    pub allowed: bool,
    pub current: i64,
    pub limit: i64,
    /// Set only on the request that crossed a threshold, so the notification
    /// dispatcher fires once per level per period.
    pub alert: Option<UsageAlert>,
    pub plan: Plan,
    pub user_email: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAlert {
    /// Crossed the 80% threshold.
    Approaching,
    /// Reached the monthly cap.
    Exhausted,
}

pub struct UsageMeter {
    store: Arc<dyn LinkStore>,
    /// Latch of already-dispatched alerts keyed by (owner, period, level).
    /// Concurrent requests racing across a threshold would otherwise signal
    /// the same alert more than once.
    alerted: DashMap<(String, String, u8), ()>,
}

/// Current usage period, `"YYYY-MM"`.
pub fn current_period() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}

impl UsageMeter {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self {
            store,
            alerted: DashMap::new(),
        }
    }

    /// Meter one analytics event for `owner_id`.
    ///
    /// Reads the counter (rows from an earlier period count as zero),
    /// increments it, and compares against the owner's plan cap.
    pub async fn register_event_usage(&self, owner_id: &str) -> Result<EventUsage> {
        let owner = self
            .store
            .owner(owner_id)
            .await?
            .ok_or_else(|| anyhow!("unknown owner '{owner_id}'"))?;
        let plan = owner.plan();
        let limit = plan.monthly_event_cap();

        let period = current_period();
        let prior = match self.store.usage_counter(owner_id).await? {
            Some(counter) if counter.period == period => counter.events,
            // Missing row or month rollover both read as zero.
            _ => 0,
        };

        let current = prior + 1;
        self.store
            .set_usage_counter(owner_id, &period, current)
            .await?;

        let allowed = current <= limit;
        let alert = self.crossed_threshold(owner_id, &period, prior, current, limit);

        Ok(EventUsage {
            allowed,
            current,
            limit,
            alert,
            plan,
            user_email: owner.email,
            user_name: owner.name,
        })
    }

    fn crossed_threshold(
        &self,
        owner_id: &str,
        period: &str,
        prior: i64,
        current: i64,
        limit: i64,
    ) -> Option<UsageAlert> {
        let approaching = limit * APPROACHING_THRESHOLD_PCT / 100;

        let (alert, level) = if prior < limit && current >= limit {
            (UsageAlert::Exhausted, 100u8)
        } else if prior < approaching && current >= approaching {
            (UsageAlert::Approaching, 80u8)
        } else {
            return None;
        };

        let key = (owner_id.to_string(), period.to_string(), level);
        if self.alerted.insert(key, ()).is_some() {
            return None;
        }
        Some(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Owner;
    use crate::storage::SqliteStore;

    async fn meter_with_owner(plan: &str) -> (UsageMeter, Arc<dyn LinkStore>) {
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
        (UsageMeter::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn first_event_is_allowed_and_counted() {
        let (meter, store) = meter_with_owner("free").await;

        let usage = meter.register_event_usage("user_1").await.unwrap();
        assert!(usage.allowed);
        assert_eq!(usage.current, 1);
        assert_eq!(usage.limit, Plan::Free.monthly_event_cap());
        assert_eq!(usage.plan, Plan::Free);
        assert_eq!(usage.user_email, "ada@example.com");

        let counter = store.usage_counter("user_1").await.unwrap().unwrap();
        assert_eq!(counter.events, 1);
    }

    #[tokio::test]
    async fn event_over_cap_is_rejected_but_still_counted() {
        let (meter, store) = meter_with_owner("free").await;
        let limit = Plan::Free.monthly_event_cap();
        store
            .set_usage_counter("user_1", &current_period(), limit)
            .await
            .unwrap();

        let usage = meter.register_event_usage("user_1").await.unwrap();
        assert!(!usage.allowed);
        assert_eq!(usage.current, limit + 1);
    }

    #[tokio::test]
    async fn stale_period_counter_resets_on_read() {
        let (meter, store) = meter_with_owner("pro").await;
        store
            .set_usage_counter("user_1", "1999-01", 24_000)
            .await
            .unwrap();

        let usage = meter.register_event_usage("user_1").await.unwrap();
        assert!(usage.allowed);
        assert_eq!(usage.current, 1);

        let counter = store.usage_counter("user_1").await.unwrap().unwrap();
        assert_eq!(counter.period, current_period());
    }

    #[tokio::test]
    async fn alerts_fire_once_per_threshold() {
        let (meter, store) = meter_with_owner("free").await;
        let limit = Plan::Free.monthly_event_cap();
        let approaching = limit * 80 / 100;

        store
            .set_usage_counter("user_1", &current_period(), approaching - 1)
            .await
            .unwrap();
        let usage = meter.register_event_usage("user_1").await.unwrap();
        assert_eq!(usage.alert, Some(UsageAlert::Approaching));

        // Next event is past the threshold, no repeat alert
        let usage = meter.register_event_usage("user_1").await.unwrap();
        assert_eq!(usage.alert, None);

        store
            .set_usage_counter("user_1", &current_period(), limit - 1)
            .await
            .unwrap();
        let usage = meter.register_event_usage("user_1").await.unwrap();
        assert_eq!(usage.alert, Some(UsageAlert::Exhausted));
        assert!(usage.allowed, "reaching the cap exactly is still within it");
    }

    #[tokio::test]
    async fn unknown_owner_is_an_error() {
        let (meter, _store) = meter_with_owner("free").await;
        assert!(meter.register_event_usage("nobody").await.is_err());
    }
}
