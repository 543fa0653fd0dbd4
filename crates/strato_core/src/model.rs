use std::fmt;

use serde::{Deserialize, Serialize};

use crate::volume::Extent;
use crate::{DssError, DssResult, EntityId, ManagerId, SubscriptionId, Timestamp, Version};

/// The entity families that share one storage and notification path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFamily {
    OperationalIntent,
    Constraint,
    ServiceArea,
}

impl EntityFamily {
    pub const ALL: [EntityFamily; 3] = [
        EntityFamily::OperationalIntent,
        EntityFamily::Constraint,
        EntityFamily::ServiceArea,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityFamily::OperationalIntent => "operational intent",
            EntityFamily::Constraint => "constraint",
            EntityFamily::ServiceArea => "service area",
        }
    }

    pub fn code(self) -> i16 {
        match self {
            EntityFamily::OperationalIntent => 1,
            EntityFamily::Constraint => 2,
            EntityFamily::ServiceArea => 3,
        }
    }

    pub fn from_code(code: i16) -> DssResult<Self> {
        match code {
            1 => Ok(EntityFamily::OperationalIntent),
            2 => Ok(EntityFamily::Constraint),
            3 => Ok(EntityFamily::ServiceArea),
            other => Err(DssError::internal(format!("unknown entity family {other}"))),
        }
    }
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum OperationalIntentState {
    Accepted,
    Activated,
    Nonconforming,
    Contingent,
}

impl OperationalIntentState {
    /// States whose writers must prove awareness of every overlapping intent.
    pub fn requires_key(self) -> bool {
        matches!(
            self,
            OperationalIntentState::Accepted | OperationalIntentState::Activated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationalIntentState::Accepted => "Accepted",
            OperationalIntentState::Activated => "Activated",
            OperationalIntentState::Nonconforming => "Nonconforming",
            OperationalIntentState::Contingent => "Contingent",
        }
    }

    pub fn code(self) -> i16 {
        match self {
            OperationalIntentState::Accepted => 1,
            OperationalIntentState::Activated => 2,
            OperationalIntentState::Nonconforming => 3,
            OperationalIntentState::Contingent => 4,
        }
    }

    pub fn from_code(code: i16) -> DssResult<Self> {
        match code {
            1 => Ok(OperationalIntentState::Accepted),
            2 => Ok(OperationalIntentState::Activated),
            3 => Ok(OperationalIntentState::Nonconforming),
            4 => Ok(OperationalIntentState::Contingent),
            other => Err(DssError::internal(format!(
                "unknown operational intent state {other}"
            ))),
        }
    }
}

/// Family-specific payload of an [`Entity`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum EntityBody {
    OperationalIntent {
        uss_base_url: String,
        state: OperationalIntentState,
        subscription_id: Option<SubscriptionId>,
    },
    Constraint {
        uss_base_url: String,
        subscription_id: Option<SubscriptionId>,
    },
    ServiceArea {
        flights_url: String,
    },
}

impl EntityBody {
    pub fn family(&self) -> EntityFamily {
        match self {
            EntityBody::OperationalIntent { .. } => EntityFamily::OperationalIntent,
            EntityBody::Constraint { .. } => EntityFamily::Constraint,
            EntityBody::ServiceArea { .. } => EntityFamily::ServiceArea,
        }
    }

    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match self {
            EntityBody::OperationalIntent {
                subscription_id, ..
            }
            | EntityBody::Constraint {
                subscription_id, ..
            } => *subscription_id,
            EntityBody::ServiceArea { .. } => None,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            EntityBody::OperationalIntent { uss_base_url, .. }
            | EntityBody::Constraint { uss_base_url, .. } => uss_base_url,
            EntityBody::ServiceArea { flights_url } => flights_url,
        }
    }

    pub fn state(&self) -> Option<OperationalIntentState> {
        match self {
            EntityBody::OperationalIntent { state, .. } => Some(*state),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub manager: ManagerId,
    pub version: Version,
    /// Commit time of the write that minted `version`.
    pub written_at: Timestamp,
    pub extent: Extent,
    pub body: EntityBody,
}

impl Entity {
    pub fn family(&self) -> EntityFamily {
        self.body.family()
    }

    pub fn requires_key(&self) -> bool {
        self.body.state().is_some_and(OperationalIntentState::requires_key)
    }

    /// Copy safe to show `viewer`: the version token is withheld from anyone
    /// other than the manager.
    pub fn redacted_for(&self, viewer: &ManagerId) -> Entity {
        let mut entity = self.clone();
        if &entity.manager != viewer {
            entity.version = Version::redacted();
        }
        entity
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyFlags {
    pub operational_intents: bool,
    pub constraints: bool,
    pub service_areas: bool,
}

impl NotifyFlags {
    pub fn for_family(&self, family: EntityFamily) -> bool {
        match family {
            EntityFamily::OperationalIntent => self.operational_intents,
            EntityFamily::Constraint => self.constraints,
            EntityFamily::ServiceArea => self.service_areas,
        }
    }

    pub fn any(&self) -> bool {
        self.operational_intents || self.constraints || self.service_areas
    }

    pub fn families(&self) -> Vec<EntityFamily> {
        EntityFamily::ALL
            .into_iter()
            .filter(|family| self.for_family(*family))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub manager: ManagerId,
    pub version: Version,
    pub written_at: Timestamp,
    pub extent: Extent,
    pub callback_url: String,
    pub notification_index: i64,
    pub notify: NotifyFlags,
    pub implicit: bool,
}

/// One subscriber the caller must contact after a committed mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberNotice {
    pub subscription_id: SubscriptionId,
    pub callback_url: String,
    pub notification_index: i64,
}

#[cfg(test)]
mod tests {
    use super::{EntityFamily, NotifyFlags, OperationalIntentState};

    #[test]
    fn key_required_only_for_planned_states() {
        assert!(OperationalIntentState::Accepted.requires_key());
        assert!(OperationalIntentState::Activated.requires_key());
        assert!(!OperationalIntentState::Nonconforming.requires_key());
        assert!(!OperationalIntentState::Contingent.requires_key());
    }

    #[test]
    fn codes_roundtrip() {
        for family in EntityFamily::ALL {
            assert_eq!(EntityFamily::from_code(family.code()).expect("family"), family);
        }
        assert!(EntityFamily::from_code(9).is_err());
        assert!(OperationalIntentState::from_code(0).is_err());
    }

    #[test]
    fn notify_flags_select_families() {
        let flags = NotifyFlags {
            operational_intents: true,
            constraints: false,
            service_areas: true,
        };
        assert_eq!(
            flags.families(),
            vec![EntityFamily::OperationalIntent, EntityFamily::ServiceArea]
        );
        assert!(!NotifyFlags::default().any());
    }
}
