use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Caller, DssResult, Entity, EntityFamily, EntityId, NotifyFlags, OperationalIntentState,
    OvnKey, SubscriberNotice, Subscription, SubscriptionId, Version, Volume4d,
};

/// How an operational intent or constraint is tied to a subscription.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionBinding {
    #[default]
    None,
    Existing { id: SubscriptionId },
    /// Create (or reuse and widen) a subscription owned by the entity.
    Implicit {
        base_url: String,
        notify_for_constraints: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EntityParams {
    OperationalIntent {
        uss_base_url: String,
        state: OperationalIntentState,
        key: OvnKey,
        subscription: SubscriptionBinding,
    },
    Constraint {
        uss_base_url: String,
        subscription: SubscriptionBinding,
    },
    ServiceArea {
        flights_url: String,
    },
}

impl EntityParams {
    pub fn family(&self) -> EntityFamily {
        match self {
            EntityParams::OperationalIntent { .. } => EntityFamily::OperationalIntent,
            EntityParams::Constraint { .. } => EntityFamily::Constraint,
            EntityParams::ServiceArea { .. } => EntityFamily::ServiceArea,
        }
    }

    pub fn subscription(&self) -> &SubscriptionBinding {
        const NONE: &SubscriptionBinding = &SubscriptionBinding::None;
        match self {
            EntityParams::OperationalIntent { subscription, .. }
            | EntityParams::Constraint { subscription, .. } => subscription,
            EntityParams::ServiceArea { .. } => NONE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PutEntityInput {
    pub id: EntityId,
    pub extent: Volume4d,
    /// Token last observed by the caller; absent when creating.
    pub old_version: Option<Version>,
    pub params: EntityParams,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityMutation {
    pub entity: Entity,
    pub subscribers: Vec<SubscriberNotice>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PutSubscriptionInput {
    pub id: SubscriptionId,
    pub extent: Volume4d,
    pub old_version: Option<Version>,
    pub callback_url: String,
    pub notify: NotifyFlags,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMutation {
    pub subscription: Subscription,
    /// Entities the subscriber should already know about, tokens redacted
    /// unless the caller manages them.
    pub relevant_entities: Vec<Entity>,
}

#[async_trait]
pub trait EntityApi {
    async fn put_entity(&self, caller: &Caller, input: PutEntityInput)
    -> DssResult<EntityMutation>;

    async fn delete_entity(
        &self,
        caller: &Caller,
        family: EntityFamily,
        id: EntityId,
        version: Version,
    ) -> DssResult<EntityMutation>;

    async fn get_entity(
        &self,
        caller: &Caller,
        family: EntityFamily,
        id: EntityId,
    ) -> DssResult<Entity>;

    async fn search_entities(
        &self,
        caller: &Caller,
        family: EntityFamily,
        area: Volume4d,
    ) -> DssResult<Vec<Entity>>;
}

#[async_trait]
pub trait SubscriptionApi {
    async fn put_subscription(
        &self,
        caller: &Caller,
        input: PutSubscriptionInput,
    ) -> DssResult<SubscriptionMutation>;

    async fn delete_subscription(
        &self,
        caller: &Caller,
        id: SubscriptionId,
        version: Version,
    ) -> DssResult<Subscription>;

    async fn get_subscription(&self, caller: &Caller, id: SubscriptionId)
    -> DssResult<Subscription>;

    /// Only the caller's own subscriptions are returned.
    async fn search_subscriptions(
        &self,
        caller: &Caller,
        area: Volume4d,
    ) -> DssResult<Vec<Subscription>>;
}
