//! Ordered ingestion pipeline for qualifying visits.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analytics::bot;
use crate::analytics::device::{RequestContext, VisitFingerprint};
use crate::analytics::geoip::GeoIpService;
use crate::analytics::usage::UsageMeter;
use crate::models::{Link, NewVisit};
use crate::storage::LinkStore;

/// What happened to a visit that entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Classified as crawler traffic; dropped before any write.
    Bot,
    /// Owner is over their monthly event cap; persistence skipped.
    CapExceeded,
    Recorded {
        /// Whether this was the first visit from this hashed IP.
        unique: bool,
    },
}

/// Hex-encoded sha256 of the client IP, used as the unique-visitor key.
pub fn hash_ip(ip: &str) -> String {
    format!("{:x}", Sha256::digest(ip.as_bytes()))
}

/// Runs bot filter → usage meter → fingerprint → visit insert → unique
/// dedup, in that order, short-circuiting at the first rejection.
pub struct VisitRecorder {
    store: Arc<dyn LinkStore>,
    meter: UsageMeter,
    geoip: Option<Arc<GeoIpService>>,
    enabled: bool,
}

impl VisitRecorder {
    pub fn new(
        store: Arc<dyn LinkStore>,
        meter: UsageMeter,
        geoip: Option<Arc<GeoIpService>>,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            meter,
            geoip,
            enabled,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// The visit insert and the unique-visit insert are each best-effort:
    /// losing one of them degrades the statistics, not the redirect, so a
    /// failure in one does not abort the other.
    pub async fn record(&self, link: &Link, ctx: &RequestContext) -> Result<VisitOutcome> {
        if bot::is_bot(ctx.user_agent.as_deref().unwrap_or("")) {
            debug!(link_id = link.id, "bot visit dropped");
            return Ok(VisitOutcome::Bot);
        }

        let usage = self.meter.register_event_usage(&link.owner_id).await?;
        if let Some(alert) = usage.alert {
            // The mailer is an external collaborator; the hot path only
            // surfaces that a threshold was crossed.
            tracing::info!(
                owner = %link.owner_id,
                plan = %usage.plan,
                current = usage.current,
                limit = usage.limit,
                email = %usage.user_email,
                ?alert,
                "usage alert threshold crossed"
            );
        }
        if !usage.allowed {
            debug!(
                owner = %link.owner_id,
                current = usage.current,
                limit = usage.limit,
                "monthly event cap exceeded, visit not persisted"
            );
            return Ok(VisitOutcome::CapExceeded);
        }

        let fp = VisitFingerprint::from_context(ctx, self.geoip.as_deref());
        if let Err(err) = self.store.record_visit(&new_visit(link.id, &fp)).await {
            warn!(link_id = link.id, error = %err, "failed to persist visit row");
        }

        let ip_hash = hash_ip(&ctx.client_ip);
        let unique = match self.store.record_unique_visit(link.id, &ip_hash).await {
            Ok(inserted) => inserted,
            Err(err) => {
                warn!(link_id = link.id, error = %err, "failed to persist unique-visit row");
                false
            }
        };

        Ok(VisitOutcome::Recorded { unique })
    }

    /// Fire-and-forget dispatch used by the redirect path: the pipeline runs
    /// on a detached task with its own error logging, so the redirect never
    /// waits on (or fails because of) analytics writes.
    pub fn dispatch(self: Arc<Self>, link: Link, ctx: RequestContext) {
        if !self.enabled {
            return;
        }

        tokio::spawn(async move {
            if let Err(err) = self.record(&link, &ctx).await {
                warn!(link_id = link.id, error = %err, "analytics pipeline failed; redirect unaffected");
            }
        });
    }
}

fn new_visit(link_id: i64, fp: &VisitFingerprint) -> NewVisit {
    NewVisit {
        link_id,
        device: fp.device.clone(),
        os: fp.os.clone(),
        browser: fp.browser.clone(),
        model: fp.model.clone(),
        country: fp.country.clone(),
        city: fp.city.clone(),
        continent: fp.continent.clone(),
        referer: fp.referer.clone(),
    }
}
