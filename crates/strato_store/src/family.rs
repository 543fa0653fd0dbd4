//! Per-family rules plugged into the shared upsert path.

use strato_core::{
    Capability, Caller, DssError, DssResult, EntityBody, EntityFamily, EntityParams, NotifyFlags,
    OperationalIntentState, SubscriptionId,
};

pub(crate) fn read_capabilities(family: EntityFamily) -> &'static [Capability] {
    match family {
        EntityFamily::OperationalIntent => &[
            Capability::StrategicCoordination,
            Capability::ConformanceMonitoringForSituationalAwareness,
        ],
        EntityFamily::Constraint => &[
            Capability::ConstraintManagement,
            Capability::ConstraintProcessing,
        ],
        EntityFamily::ServiceArea => &[Capability::ServiceProvider, Capability::DisplayProvider],
    }
}

pub(crate) fn delete_capability(family: EntityFamily) -> Capability {
    match family {
        EntityFamily::OperationalIntent => Capability::StrategicCoordination,
        EntityFamily::Constraint => Capability::ConstraintManagement,
        EntityFamily::ServiceArea => Capability::ServiceProvider,
    }
}

/// Off-nominal intent states are reserved for conformance monitoring.
pub(crate) fn write_capability(params: &EntityParams) -> Capability {
    match params {
        EntityParams::OperationalIntent { state, .. } => match state {
            OperationalIntentState::Accepted | OperationalIntentState::Activated => {
                Capability::StrategicCoordination
            }
            OperationalIntentState::Nonconforming | OperationalIntentState::Contingent => {
                Capability::ConformanceMonitoringForSituationalAwareness
            }
        },
        EntityParams::Constraint { .. } => Capability::ConstraintManagement,
        EntityParams::ServiceArea { .. } => Capability::ServiceProvider,
    }
}

pub(crate) fn requires_key(params: &EntityParams) -> bool {
    matches!(params, EntityParams::OperationalIntent { state, .. } if state.requires_key())
}

/// Flags of a subscription created on behalf of an entity.
pub(crate) fn implicit_flags(family: EntityFamily, notify_for_constraints: bool) -> NotifyFlags {
    match family {
        EntityFamily::OperationalIntent => NotifyFlags {
            operational_intents: true,
            constraints: notify_for_constraints,
            service_areas: false,
        },
        EntityFamily::Constraint => NotifyFlags {
            operational_intents: false,
            constraints: true,
            service_areas: false,
        },
        EntityFamily::ServiceArea => NotifyFlags {
            operational_intents: false,
            constraints: false,
            service_areas: true,
        },
    }
}

pub(crate) fn require_subscription_capabilities(
    caller: &Caller,
    notify: &NotifyFlags,
) -> DssResult<()> {
    if !notify.any() {
        return Err(DssError::bad_request(
            "subscription must notify for at least one entity family",
        ));
    }
    for family in notify.families() {
        caller.require_any(read_capabilities(family))?;
    }
    Ok(())
}

pub(crate) fn validate_params(params: &EntityParams) -> DssResult<()> {
    let url = match params {
        EntityParams::OperationalIntent { uss_base_url, .. }
        | EntityParams::Constraint { uss_base_url, .. } => uss_base_url,
        EntityParams::ServiceArea { flights_url } => flights_url,
    };
    validate_url(url, "base url")?;
    if let strato_core::SubscriptionBinding::Implicit { base_url, .. } = params.subscription() {
        validate_url(base_url, "subscription base url")?;
    }
    Ok(())
}

pub(crate) fn validate_url(url: &str, what: &str) -> DssResult<()> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DssError::bad_request(format!("{what} is required")));
    }
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(DssError::bad_request(format!(
            "{what} must be an http(s) url"
        )));
    }
    Ok(())
}

/// Stored payload for the written entity.
pub(crate) fn build_body(params: &EntityParams, subscription_id: Option<SubscriptionId>) -> EntityBody {
    match params {
        EntityParams::OperationalIntent {
            uss_base_url,
            state,
            ..
        } => EntityBody::OperationalIntent {
            uss_base_url: uss_base_url.clone(),
            state: *state,
            subscription_id,
        },
        EntityParams::Constraint { uss_base_url, .. } => EntityBody::Constraint {
            uss_base_url: uss_base_url.clone(),
            subscription_id,
        },
        EntityParams::ServiceArea { flights_url } => EntityBody::ServiceArea {
            flights_url: flights_url.clone(),
        },
    }
}
