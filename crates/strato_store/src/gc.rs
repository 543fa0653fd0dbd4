//! Background removal of expired records.
//!
//! Each record is collected in its own transaction so one failure never
//! blocks the rest of the batch. Collection does not notify subscribers.

use std::sync::Arc;

use serde::Serialize;

use crate::orchestrator::release_implicit_subscription;
use crate::repo::{Repo, SUBSCRIPTION_RECORD_KIND};
use crate::txn::with_retrying_transaction;
use crate::StratoStore;
use strato_core::{Clock, DssResult, EntityId, SubscriptionId, Timestamp};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub entities_deleted: u64,
    pub subscriptions_deleted: u64,
    pub tombstones_purged: u64,
    pub failures: u64,
}

#[derive(Clone)]
pub struct GarbageCollector {
    store: StratoStore,
    clock: Arc<dyn Clock>,
}

impl GarbageCollector {
    pub fn new(store: StratoStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// One sweep: expired entities, then expired unreferenced subscriptions,
    /// then tombstones past their retention.
    pub async fn run_once(&self) -> DssResult<GcReport> {
        let settings = self.store.settings();
        let now = self.clock.now();
        let repo = Repo::new(self.store.connection(), &settings.writer);
        let mut report = GcReport::default();

        for id in repo.expired_entities(now, settings.gc_batch_limit).await? {
            match self.collect_entity(id, now).await {
                Ok(true) => report.entities_deleted += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failures += 1;
                    log::warn!("failed to collect expired entity {id}: {err}");
                }
            }
        }

        for id in repo
            .expired_subscriptions(now, settings.gc_batch_limit)
            .await?
        {
            match self.collect_subscription(id, now).await {
                Ok(true) => report.subscriptions_deleted += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failures += 1;
                    log::warn!("failed to collect expired subscription {id}: {err}");
                }
            }
        }

        report.tombstones_purged = repo
            .purge_tombstones(now.minus(settings.tombstone_retention))
            .await?;

        log::info!(
            "gc sweep: entities={} subscriptions={} tombstones={} failures={}",
            report.entities_deleted,
            report.subscriptions_deleted,
            report.tombstones_purged,
            report.failures
        );
        Ok(report)
    }

    async fn collect_entity(&self, id: EntityId, now: Timestamp) -> DssResult<bool> {
        let settings = self.store.settings();
        let writer = settings.writer.clone();
        with_retrying_transaction(self.store.connection(), &settings.retry, move |txn| {
            let writer = writer.clone();
            Box::pin(async move {
                let repo = Repo::new(txn, &writer);
                let expired = repo
                    .get_entity(id)
                    .await?
                    .filter(|entity| entity.extent.end <= now);
                let Some(entity) = expired else {
                    return Ok(false);
                };
                repo.delete_entity(id).await?;
                repo.put_tombstone(
                    id.0,
                    entity.family().code(),
                    entity.written_at,
                    now,
                )
                .await?;
                if let Some(subscription) = entity.body.subscription_id() {
                    release_implicit_subscription(&repo, subscription).await?;
                }
                log::debug!("collected expired {} {id}", entity.family());
                Ok(true)
            })
        })
        .await
    }

    async fn collect_subscription(&self, id: SubscriptionId, now: Timestamp) -> DssResult<bool> {
        let settings = self.store.settings();
        let writer = settings.writer.clone();
        with_retrying_transaction(self.store.connection(), &settings.retry, move |txn| {
            let writer = writer.clone();
            Box::pin(async move {
                let repo = Repo::new(txn, &writer);
                let expired = repo
                    .get_subscription(id)
                    .await?
                    .filter(|subscription| subscription.extent.end <= now);
                let Some(subscription) = expired else {
                    return Ok(false);
                };
                if !repo.dependent_entities(id).await?.is_empty() {
                    return Ok(false);
                }
                repo.delete_subscription(id).await?;
                repo.put_tombstone(
                    id.0,
                    SUBSCRIPTION_RECORD_KIND,
                    subscription.written_at,
                    now,
                )
                .await?;
                log::debug!("collected expired subscription {id}");
                Ok(true)
            })
        })
        .await
    }
}
