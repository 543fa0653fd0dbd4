use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{DssError, DssResult, ManagerId};

/// Scopes granted to a caller by the external auth layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    StrategicCoordination,
    ConformanceMonitoringForSituationalAwareness,
    ConstraintManagement,
    ConstraintProcessing,
    ServiceProvider,
    DisplayProvider,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::StrategicCoordination => "strategic_coordination",
            Capability::ConformanceMonitoringForSituationalAwareness => {
                "conformance_monitoring_sa"
            }
            Capability::ConstraintManagement => "constraint_management",
            Capability::ConstraintProcessing => "constraint_processing",
            Capability::ServiceProvider => "service_provider",
            Capability::DisplayProvider => "display_provider",
        }
    }
}

/// An authenticated caller: the owning identity plus its granted capabilities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub manager: ManagerId,
    pub capabilities: BTreeSet<Capability>,
}

impl Caller {
    pub fn new(manager: impl Into<String>, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            manager: ManagerId::new(manager),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn require(&self, capability: Capability) -> DssResult<()> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(DssError::permission_denied(format!(
                "missing capability {}",
                capability.as_str()
            )))
        }
    }

    pub fn require_any(&self, capabilities: &[Capability]) -> DssResult<()> {
        if capabilities.iter().any(|capability| self.has(*capability)) {
            return Ok(());
        }
        let names = capabilities
            .iter()
            .map(|capability| capability.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(DssError::permission_denied(format!(
            "missing capability {names}"
        )))
    }

    pub fn require_manager(&self, owner: &ManagerId, what: &str) -> DssResult<()> {
        if &self.manager == owner {
            Ok(())
        } else {
            Err(DssError::permission_denied(format!(
                "{what} is owned by a different manager"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Caller, Capability};
    use crate::{ErrorKind, ManagerId};

    #[test]
    fn require_any_accepts_one_match() {
        let caller = Caller::new("uss1", [Capability::DisplayProvider]);
        assert!(
            caller
                .require_any(&[Capability::ServiceProvider, Capability::DisplayProvider])
                .is_ok()
        );
        let err = caller
            .require(Capability::StrategicCoordination)
            .expect_err("denied");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn manager_mismatch_is_denied() {
        let caller = Caller::new("uss1", []);
        assert!(caller.require_manager(&ManagerId::new("uss1"), "x").is_ok());
        assert!(caller.require_manager(&ManagerId::new("uss2"), "x").is_err());
    }
}
