//! The single write path for entities and subscriptions.
//!
//! Every operation validates request shape up front, then runs its reads and
//! writes in one retrying transaction: version check, subscription
//! resolution, key proof, write, implicit subscription cleanup and
//! notification either all commit or none do.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseTransaction};

use crate::family;
use crate::notify::notify_subscribers;
use crate::proof::{ProofScope, check_key};
use crate::repo::{Repo, SUBSCRIPTION_RECORD_KIND};
use crate::txn::{TxnFuture, with_retrying_transaction};
use crate::{StoreSettings, StratoStore};
use strato_core::{
    Caller, Clock, DssError, DssResult, Entity, EntityApi, EntityFamily, EntityId,
    EntityMutation, EntityParams, Extent, PutEntityInput, PutSubscriptionInput, Subscription,
    SubscriptionApi, SubscriptionBinding, SubscriptionId, SubscriptionMutation, Timestamp,
    Version, Volume4d,
};

#[derive(Clone)]
pub struct Orchestrator {
    store: StratoStore,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(store: StratoStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn settings(&self) -> &StoreSettings {
        self.store.settings()
    }

    async fn in_transaction<T, F>(&self, operation: &str, body: F) -> DssResult<T>
    where
        T: Send,
        F: for<'c> Fn(&'c DatabaseTransaction) -> TxnFuture<'c, T> + Send + Sync,
    {
        let result =
            with_retrying_transaction(self.store.connection(), &self.settings().retry, body).await;
        if let Err(err @ DssError::Internal { .. }) = &result {
            log::error!("{operation} failed: {err}");
        }
        result
    }

    async fn put_entity_txn(
        &self,
        txn: &DatabaseTransaction,
        caller: &Caller,
        id: EntityId,
        extent: Extent,
        old_version: Option<Version>,
        params: &EntityParams,
    ) -> DssResult<EntityMutation> {
        let repo = Repo::new(txn, &self.settings().writer);
        let now = self.clock.now();
        let family = params.family();

        let tombstone = repo
            .tombstone(id.0)
            .await?
            .filter(|tombstone| tombstone.kind == family.code());
        let existing = match (repo.get_entity(id).await?, &old_version) {
            (Some(current), None) => {
                return Err(DssError::already_exists(format!(
                    "{} {id} already exists",
                    current.family()
                )));
            }
            (Some(current), Some(_)) if current.family() != family => {
                return Err(DssError::not_found(format!("{family} {id} not found")));
            }
            (Some(current), Some(version)) => {
                caller.require_manager(&current.manager, family.as_str())?;
                if &current.version != version {
                    return Err(stale_version(family, id));
                }
                Some(current)
            }
            (None, Some(_)) => {
                return Err(missing_record(family, id, tombstone.is_some()));
            }
            (None, None) => None,
        };
        let previous_write = existing
            .as_ref()
            .map(|current| current.written_at)
            .max(tombstone.map(|tombstone| tombstone.version));
        let affected = match &existing {
            Some(current) => current.extent.union(&extent),
            None => extent.clone(),
        };

        repo.lock_cells(&affected.cells).await?;
        let subscription = self
            .resolve_subscription(&repo, caller, family, params.subscription(), &extent, now)
            .await?;

        if let EntityParams::OperationalIntent { key, .. } = params {
            if family::requires_key(params) {
                let scope = ProofScope {
                    include_constraints: subscription
                        .as_ref()
                        .is_some_and(|subscription| subscription.notify.constraints),
                };
                check_key(&repo, &caller.manager, id, &extent, key, scope, now).await?;
            }
        }

        let written_at = Version::next_write_time(previous_write, now);
        let entity = Entity {
            id,
            manager: caller.manager.clone(),
            version: Version::mint(id.0, written_at),
            written_at,
            extent,
            body: family::build_body(params, subscription.as_ref().map(|sub| sub.id)),
        };
        repo.upsert_entity(&entity).await?;
        if tombstone.is_some() {
            repo.clear_tombstone(id.0).await?;
        }

        let previous_subscription = existing
            .as_ref()
            .and_then(|current| current.body.subscription_id());
        if let Some(previous) = previous_subscription {
            if Some(previous) != entity.body.subscription_id() {
                release_implicit_subscription(&repo, previous).await?;
            }
        }

        let subscribers = notify_subscribers(&repo, family, &affected, now).await?;
        Ok(EntityMutation {
            entity,
            subscribers,
        })
    }

    /// Creates, reuses or widens the subscription an entity is bound to.
    async fn resolve_subscription<C: ConnectionTrait>(
        &self,
        repo: &Repo<'_, C>,
        caller: &Caller,
        family: EntityFamily,
        binding: &SubscriptionBinding,
        extent: &Extent,
        now: Timestamp,
    ) -> DssResult<Option<Subscription>> {
        match binding {
            SubscriptionBinding::None => Ok(None),
            SubscriptionBinding::Existing { id } => {
                let mut subscription = repo
                    .get_subscription(*id)
                    .await?
                    .ok_or_else(|| DssError::not_found(format!("subscription {id} not found")))?;
                caller.require_manager(&subscription.manager, "subscription")?;
                if !subscription.notify.for_family(family) {
                    return Err(DssError::bad_request(format!(
                        "subscription {id} does not notify for {family} changes"
                    )));
                }
                if !subscription.extent.covers(extent) {
                    if !subscription.implicit {
                        return Err(DssError::bad_request(format!(
                            "subscription {id} does not cover the {family}"
                        )));
                    }
                    subscription.extent = subscription.extent.union(extent);
                    subscription.written_at =
                        Version::next_write_time(Some(subscription.written_at), now);
                    subscription.version =
                        Version::mint(subscription.id.0, subscription.written_at);
                    repo.upsert_subscription(&subscription).await?;
                    log::debug!("widened implicit subscription {id}");
                }
                Ok(Some(subscription))
            }
            SubscriptionBinding::Implicit {
                base_url,
                notify_for_constraints,
            } => {
                let id = SubscriptionId::new();
                let subscription = Subscription {
                    id,
                    manager: caller.manager.clone(),
                    version: Version::mint(id.0, now),
                    written_at: now,
                    extent: extent.clone(),
                    callback_url: base_url.clone(),
                    notification_index: 0,
                    notify: family::implicit_flags(family, *notify_for_constraints),
                    implicit: true,
                };
                repo.upsert_subscription(&subscription).await?;
                Ok(Some(subscription))
            }
        }
    }

    async fn delete_entity_txn(
        &self,
        txn: &DatabaseTransaction,
        caller: &Caller,
        family: EntityFamily,
        id: EntityId,
        version: &Version,
    ) -> DssResult<EntityMutation> {
        let repo = Repo::new(txn, &self.settings().writer);
        let now = self.clock.now();
        let existing = repo
            .get_entity(id)
            .await?
            .filter(|entity| entity.family() == family);
        let Some(existing) = existing else {
            let deleted = repo
                .tombstone(id.0)
                .await?
                .is_some_and(|tombstone| tombstone.kind == family.code());
            return Err(missing_record(family, id, deleted));
        };
        caller.require_manager(&existing.manager, family.as_str())?;
        if &existing.version != version {
            return Err(stale_version(family, id));
        }

        repo.lock_cells(&existing.extent.cells).await?;
        repo.delete_entity(id).await?;
        repo.put_tombstone(
            id.0,
            family.code(),
            existing.written_at,
            now,
        )
        .await?;
        if let Some(subscription) = existing.body.subscription_id() {
            release_implicit_subscription(&repo, subscription).await?;
        }
        let subscribers = notify_subscribers(&repo, family, &existing.extent, now).await?;
        Ok(EntityMutation {
            entity: existing,
            subscribers,
        })
    }

    async fn put_subscription_txn(
        &self,
        txn: &DatabaseTransaction,
        caller: &Caller,
        input: &PutSubscriptionInput,
        extent: Extent,
        old_version: Option<Version>,
    ) -> DssResult<SubscriptionMutation> {
        let settings = self.settings();
        let repo = Repo::new(txn, &settings.writer);
        let now = self.clock.now();
        let id = input.id;

        let tombstone = repo
            .tombstone(id.0)
            .await?
            .filter(|tombstone| tombstone.kind == SUBSCRIPTION_RECORD_KIND);
        let existing = match (repo.get_subscription(id).await?, &old_version) {
            (Some(_), None) => {
                return Err(DssError::already_exists(format!(
                    "subscription {id} already exists"
                )));
            }
            (Some(current), Some(version)) => {
                caller.require_manager(&current.manager, "subscription")?;
                if &current.version != version {
                    return Err(DssError::version_mismatch(format!(
                        "subscription {id} version does not match"
                    )));
                }
                Some(current)
            }
            (None, Some(_)) => {
                return Err(missing_record("subscription", id, tombstone.is_some()));
            }
            (None, None) => None,
        };

        if existing.is_some() {
            for dependent in repo.dependent_entities(id).await? {
                if !extent.covers(&dependent.extent) {
                    return Err(DssError::bad_request(format!(
                        "subscription {id} would no longer cover {} {}",
                        dependent.family(),
                        dependent.id
                    )));
                }
            }
        }
        let implicit = existing.as_ref().is_some_and(|current| current.implicit);
        if !implicit {
            let in_area = repo
                .max_subscriptions_per_cell(&caller.manager, &extent.cells, now, id)
                .await?;
            if in_area >= settings.max_subscriptions_per_area as usize {
                return Err(DssError::exhausted(format!(
                    "too many subscriptions in this area (limit {})",
                    settings.max_subscriptions_per_area
                )));
            }
        }

        repo.lock_cells(&extent.cells).await?;
        let previous_write = existing
            .as_ref()
            .map(|current| current.written_at)
            .max(tombstone.map(|tombstone| tombstone.version));
        let written_at = Version::next_write_time(previous_write, now);
        let subscription = Subscription {
            id,
            manager: caller.manager.clone(),
            version: Version::mint(id.0, written_at),
            written_at,
            extent,
            callback_url: input.callback_url.clone(),
            notification_index: existing
                .as_ref()
                .map_or(0, |current| current.notification_index),
            notify: input.notify,
            implicit,
        };
        repo.upsert_subscription(&subscription).await?;
        if tombstone.is_some() {
            repo.clear_tombstone(id.0).await?;
        }

        let mut relevant_entities = Vec::new();
        for family in subscription.notify.families() {
            relevant_entities.extend(
                search_overlapping(&repo, family, &subscription.extent, now)
                    .await?
                    .into_iter()
                    .map(|entity| entity.redacted_for(&caller.manager)),
            );
        }
        Ok(SubscriptionMutation {
            subscription,
            relevant_entities,
        })
    }

    async fn delete_subscription_txn(
        &self,
        txn: &DatabaseTransaction,
        caller: &Caller,
        id: SubscriptionId,
        version: &Version,
    ) -> DssResult<Subscription> {
        let repo = Repo::new(txn, &self.settings().writer);
        let now = self.clock.now();
        let Some(existing) = repo.get_subscription(id).await? else {
            let deleted = repo
                .tombstone(id.0)
                .await?
                .is_some_and(|tombstone| tombstone.kind == SUBSCRIPTION_RECORD_KIND);
            return Err(missing_record("subscription", id, deleted));
        };
        caller.require_manager(&existing.manager, "subscription")?;
        if &existing.version != version {
            return Err(DssError::version_mismatch(format!(
                "subscription {id} version does not match"
            )));
        }
        let dependents = repo.dependent_entities(id).await?;
        if !dependents.is_empty() {
            return Err(DssError::bad_request(format!(
                "subscription {id} is still referenced by {} entit{}",
                dependents.len(),
                if dependents.len() == 1 { "y" } else { "ies" }
            )));
        }
        repo.delete_subscription(id).await?;
        repo.put_tombstone(
            id.0,
            SUBSCRIPTION_RECORD_KIND,
            existing.written_at,
            now,
        )
        .await?;
        Ok(existing)
    }
}

#[async_trait]
impl EntityApi for Orchestrator {
    async fn put_entity(
        &self,
        caller: &Caller,
        input: PutEntityInput,
    ) -> DssResult<EntityMutation> {
        caller.require(family::write_capability(&input.params))?;
        family::validate_params(&input.params)?;
        let settings = self.settings();
        let extent = input.extent.resolve(
            &settings.coverer(),
            self.clock.now(),
            &settings.entity_time_policy(),
        )?;
        let old_version = normalize_version(input.old_version);
        let (this, caller, id, params) = (self.clone(), caller.clone(), input.id, input.params);
        self.in_transaction("put entity", move |txn| {
            let (this, caller, extent, old_version, params) = (
                this.clone(),
                caller.clone(),
                extent.clone(),
                old_version.clone(),
                params.clone(),
            );
            Box::pin(async move {
                this.put_entity_txn(txn, &caller, id, extent, old_version, &params)
                    .await
            })
        })
        .await
    }

    async fn delete_entity(
        &self,
        caller: &Caller,
        family: EntityFamily,
        id: EntityId,
        version: Version,
    ) -> DssResult<EntityMutation> {
        caller.require(family::delete_capability(family))?;
        let version = normalize_version(Some(version))
            .ok_or_else(|| DssError::bad_request("version is required to delete"))?;
        let (this, caller) = (self.clone(), caller.clone());
        self.in_transaction("delete entity", move |txn| {
            let (this, caller, version) = (this.clone(), caller.clone(), version.clone());
            Box::pin(async move {
                this.delete_entity_txn(txn, &caller, family, id, &version)
                    .await
            })
        })
        .await
    }

    async fn get_entity(
        &self,
        caller: &Caller,
        family: EntityFamily,
        id: EntityId,
    ) -> DssResult<Entity> {
        caller.require_any(family::read_capabilities(family))?;
        let (writer, viewer) = (self.settings().writer.clone(), caller.manager.clone());
        self.in_transaction("get entity", move |txn| {
            let (writer, viewer) = (writer.clone(), viewer.clone());
            Box::pin(async move {
                let repo = Repo::new(txn, &writer);
                repo.get_entity(id)
                    .await?
                    .filter(|entity| entity.family() == family)
                    .map(|entity| entity.redacted_for(&viewer))
                    .ok_or_else(|| DssError::not_found(format!("{family} {id} not found")))
            })
        })
        .await
    }

    async fn search_entities(
        &self,
        caller: &Caller,
        family: EntityFamily,
        area: Volume4d,
    ) -> DssResult<Vec<Entity>> {
        caller.require_any(family::read_capabilities(family))?;
        let now = self.clock.now();
        let window = area.resolve_search(&self.settings().coverer(), now)?;
        let (writer, viewer) = (self.settings().writer.clone(), caller.manager.clone());
        self.in_transaction("search entities", move |txn| {
            let (writer, viewer, window) = (writer.clone(), viewer.clone(), window.clone());
            Box::pin(async move {
                let repo = Repo::new(txn, &writer);
                Ok(search_overlapping(&repo, family, &window, now)
                    .await?
                    .into_iter()
                    .map(|entity| entity.redacted_for(&viewer))
                    .collect())
            })
        })
        .await
    }
}

#[async_trait]
impl SubscriptionApi for Orchestrator {
    async fn put_subscription(
        &self,
        caller: &Caller,
        input: PutSubscriptionInput,
    ) -> DssResult<SubscriptionMutation> {
        family::require_subscription_capabilities(caller, &input.notify)?;
        family::validate_url(&input.callback_url, "callback url")?;
        let settings = self.settings();
        let extent = input.extent.resolve(
            &settings.coverer(),
            self.clock.now(),
            &settings.subscription_time_policy(),
        )?;
        let old_version = normalize_version(input.old_version.clone());
        let (this, caller) = (self.clone(), caller.clone());
        self.in_transaction("put subscription", move |txn| {
            let (this, caller, input, extent, old_version) = (
                this.clone(),
                caller.clone(),
                input.clone(),
                extent.clone(),
                old_version.clone(),
            );
            Box::pin(async move {
                this.put_subscription_txn(txn, &caller, &input, extent, old_version)
                    .await
            })
        })
        .await
    }

    async fn delete_subscription(
        &self,
        caller: &Caller,
        id: SubscriptionId,
        version: Version,
    ) -> DssResult<Subscription> {
        let version = normalize_version(Some(version))
            .ok_or_else(|| DssError::bad_request("version is required to delete"))?;
        let (this, caller) = (self.clone(), caller.clone());
        self.in_transaction("delete subscription", move |txn| {
            let (this, caller, version) = (this.clone(), caller.clone(), version.clone());
            Box::pin(async move {
                this.delete_subscription_txn(txn, &caller, id, &version)
                    .await
            })
        })
        .await
    }

    async fn get_subscription(
        &self,
        caller: &Caller,
        id: SubscriptionId,
    ) -> DssResult<Subscription> {
        let (writer, caller) = (self.settings().writer.clone(), caller.clone());
        self.in_transaction("get subscription", move |txn| {
            let (writer, caller) = (writer.clone(), caller.clone());
            Box::pin(async move {
                let repo = Repo::new(txn, &writer);
                let subscription = repo
                    .get_subscription(id)
                    .await?
                    .ok_or_else(|| DssError::not_found(format!("subscription {id} not found")))?;
                caller.require_manager(&subscription.manager, "subscription")?;
                Ok(subscription)
            })
        })
        .await
    }

    async fn search_subscriptions(
        &self,
        caller: &Caller,
        area: Volume4d,
    ) -> DssResult<Vec<Subscription>> {
        let now = self.clock.now();
        let window = area.resolve_search(&self.settings().coverer(), now)?;
        let (writer, owner) = (self.settings().writer.clone(), caller.manager.clone());
        self.in_transaction("search subscriptions", move |txn| {
            let (writer, owner, window) = (writer.clone(), owner.clone(), window.clone());
            Box::pin(async move {
                let repo = Repo::new(txn, &writer);
                Ok(repo
                    .search_subscriptions(&window.cells, now)
                    .await?
                    .into_iter()
                    .filter(|subscription| subscription.manager == owner)
                    .filter(|subscription| {
                        subscription.extent.overlaps_in_time(window.start, window.end)
                    })
                    .collect())
            })
        })
        .await
    }
}

/// Deletes `id` if it is an implicit subscription no entity references any
/// more. Returns whether it was removed.
pub(crate) async fn release_implicit_subscription<C: ConnectionTrait>(
    repo: &Repo<'_, C>,
    id: SubscriptionId,
) -> DssResult<bool> {
    let Some(subscription) = repo.get_subscription(id).await? else {
        return Ok(false);
    };
    if !subscription.implicit || !repo.dependent_entities(id).await?.is_empty() {
        return Ok(false);
    }
    repo.delete_subscription(id).await?;
    log::debug!("removed implicit subscription {id}");
    Ok(true)
}

async fn search_overlapping<C: ConnectionTrait>(
    repo: &Repo<'_, C>,
    family: EntityFamily,
    window: &Extent,
    now: Timestamp,
) -> DssResult<Vec<Entity>> {
    Ok(repo
        .search_entities(family, &window.cells, window.start.max(now), window.end)
        .await?
        .into_iter()
        .filter(|entity| {
            entity
                .extent
                .overlaps_in_altitude(window.altitude_lower, window.altitude_upper)
        })
        .collect())
}

fn normalize_version(version: Option<Version>) -> Option<Version> {
    version.filter(|version| !version.as_str().trim().is_empty())
}

fn stale_version(family: EntityFamily, id: EntityId) -> DssError {
    DssError::version_mismatch(format!("{family} {id} version does not match"))
}

/// Update of an absent record: a deleted record is a stale version, one that
/// never existed is not found.
fn missing_record(what: impl fmt::Display, id: impl fmt::Display, deleted: bool) -> DssError {
    if deleted {
        DssError::version_mismatch(format!("{what} {id} has been deleted"))
    } else {
        DssError::not_found(format!("{what} {id} not found"))
    }
}
