//! Proof that a writer has seen every entity its change could conflict with.

use sea_orm::ConnectionTrait;

use crate::repo::Repo;
use strato_core::{
    ConflictResponse, DssError, DssResult, Entity, EntityFamily, EntityId, Extent, ManagerId,
    OvnKey, Timestamp,
};

/// What the key must account for.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProofScope {
    pub include_constraints: bool,
}

/// Fails with `MissingProof` unless `key` names the current version of every
/// other relevant entity overlapping `extent`. The entity being written is
/// exempt. Versions of entities `caller` does not manage are redacted in the
/// response.
pub(crate) async fn check_key<C: ConnectionTrait>(
    repo: &Repo<'_, C>,
    caller: &ManagerId,
    target: EntityId,
    extent: &Extent,
    key: &OvnKey,
    scope: ProofScope,
    now: Timestamp,
) -> DssResult<()> {
    let relevant_intents = relevant(repo, EntityFamily::OperationalIntent, target, extent, now)
        .await?
        .into_iter()
        .filter(Entity::requires_key);
    let missing_operational_intents = missing(relevant_intents, key, caller);

    let missing_constraints = if scope.include_constraints {
        let constraints =
            relevant(repo, EntityFamily::Constraint, target, extent, now).await?;
        missing(constraints.into_iter(), key, caller)
    } else {
        Vec::new()
    };

    if missing_operational_intents.is_empty() && missing_constraints.is_empty() {
        return Ok(());
    }
    Err(DssError::missing_proof(ConflictResponse {
        message: format!(
            "key is missing {} operational intent(s) and {} constraint(s)",
            missing_operational_intents.len(),
            missing_constraints.len()
        ),
        missing_operational_intents,
        missing_constraints,
    }))
}

async fn relevant<C: ConnectionTrait>(
    repo: &Repo<'_, C>,
    family: EntityFamily,
    target: EntityId,
    extent: &Extent,
    now: Timestamp,
) -> DssResult<Vec<Entity>> {
    Ok(repo
        .search_entities(family, &extent.cells, extent.start.max(now), extent.end)
        .await?
        .into_iter()
        .filter(|entity| entity.id != target)
        .filter(|entity| {
            entity
                .extent
                .overlaps_in_altitude(extent.altitude_lower, extent.altitude_upper)
        })
        .collect())
}

fn missing(
    entities: impl Iterator<Item = Entity>,
    key: &OvnKey,
    caller: &ManagerId,
) -> Vec<Entity> {
    entities
        .filter(|entity| !key.contains(&entity.version))
        .map(|entity| entity.redacted_for(caller))
        .collect()
}
