//! Row-level access to entities, subscriptions and tombstones.
//!
//! A [`Repo`] is bound to one connection or transaction and never decides
//! anything on its own: version checks, proofs and notification live in the
//! orchestrator, which is the only caller.

use std::collections::HashMap;

use sea_orm::sea_query;
use sea_orm::sea_query::{
    Expr, LockType, MysqlQueryBuilder, Order, PostgresQueryBuilder, Query, QueryStatementWriter,
    SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, QueryResult, Statement};
use uuid::Uuid;

use crate::db::*;
use strato_core::{
    CellId, CellUnion, DssError, DssResult, Entity, EntityBody, EntityFamily, EntityId, Extent,
    Id, ManagerId, NotifyFlags, OperationalIntentState, Subscription, SubscriptionId, Timestamp,
    Version,
};

/// Tombstone kind used for subscriptions; entity families use their own code.
pub(crate) const SUBSCRIPTION_RECORD_KIND: i16 = 0;

const CELL_INSERT_CHUNK: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Tombstone {
    pub kind: i16,
    pub version: Timestamp,
}

pub(crate) struct Repo<'a, C> {
    conn: &'a C,
    backend: DatabaseBackend,
    writer: &'a str,
}

impl<'a, C: ConnectionTrait> Repo<'a, C> {
    pub(crate) fn new(conn: &'a C, writer: &'a str) -> Self {
        Self {
            conn,
            backend: conn.get_database_backend(),
            writer,
        }
    }

    pub(crate) async fn get_entity(&self, id: EntityId) -> DssResult<Option<Entity>> {
        let select = entity_select()
            .and_where(Expr::col(StratoEntities::EntityId).eq(id_value(self.backend, id.0)))
            .limit(1)
            .to_owned();
        let Some(row) = query_one(self.conn, &select).await? else {
            return Ok(None);
        };
        let mut cells = self.entity_cells(&[id.0]).await?;
        let entity = read_entity(&row, cells.remove(&id.0).unwrap_or_default())?;
        Ok(Some(entity))
    }

    /// Entities of `family` whose cells intersect `cells` and whose time range
    /// overlaps `[start, end)`.
    pub(crate) async fn search_entities(
        &self,
        family: EntityFamily,
        cells: &CellUnion,
        start: Timestamp,
        end: Timestamp,
    ) -> DssResult<Vec<Entity>> {
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let select_ids = Query::select()
            .distinct()
            .column(StratoEntityCells::EntityId)
            .from(StratoEntityCells::Table)
            .and_where(Expr::col(StratoEntityCells::CellId).is_in(cells.as_i64s()))
            .to_owned();
        let ids = query_all(self.conn, &select_ids)
            .await?
            .iter()
            .map(|row| read_id(row, StratoEntityCells::EntityId))
            .collect::<DssResult<Vec<_>>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let select = entity_select()
            .and_where(
                Expr::col(StratoEntities::EntityId)
                    .is_in(ids.iter().map(|id| id_value(self.backend, *id))),
            )
            .and_where(Expr::col(StratoEntities::Family).eq(family.code()))
            .and_where(Expr::col(StratoEntities::StartsAt).lt(end.0))
            .and_where(Expr::col(StratoEntities::EndsAt).gt(start.0))
            .order_by(StratoEntities::EntityId, Order::Asc)
            .to_owned();
        let rows = query_all(self.conn, &select).await?;
        let row_ids = rows
            .iter()
            .map(|row| read_id(row, StratoEntities::EntityId))
            .collect::<DssResult<Vec<_>>>()?;
        let mut cells_by_id = self.entity_cells(&row_ids).await?;
        rows.iter()
            .zip(row_ids)
            .map(|(row, id)| read_entity(row, cells_by_id.remove(&id).unwrap_or_default()))
            .collect()
    }

    /// Entities bound to the subscription.
    pub(crate) async fn dependent_entities(
        &self,
        subscription: SubscriptionId,
    ) -> DssResult<Vec<Entity>> {
        let select = entity_select()
            .and_where(
                Expr::col(StratoEntities::SubscriptionId)
                    .eq(id_value(self.backend, subscription.0)),
            )
            .order_by(StratoEntities::EntityId, Order::Asc)
            .to_owned();
        let rows = query_all(self.conn, &select).await?;
        let ids = rows
            .iter()
            .map(|row| read_id(row, StratoEntities::EntityId))
            .collect::<DssResult<Vec<_>>>()?;
        let mut cells_by_id = self.entity_cells(&ids).await?;
        rows.iter()
            .zip(ids)
            .map(|(row, id)| read_entity(row, cells_by_id.remove(&id).unwrap_or_default()))
            .collect()
    }

    pub(crate) async fn upsert_entity(&self, entity: &Entity) -> DssResult<()> {
        self.delete_entity(entity.id).await?;
        let insert = Query::insert()
            .into_table(StratoEntities::Table)
            .columns([
                StratoEntities::EntityId,
                StratoEntities::Family,
                StratoEntities::Manager,
                StratoEntities::Ovn,
                StratoEntities::VersionMicros,
                StratoEntities::StartsAt,
                StratoEntities::EndsAt,
                StratoEntities::AltitudeLower,
                StratoEntities::AltitudeUpper,
                StratoEntities::BaseUrl,
                StratoEntities::State,
                StratoEntities::SubscriptionId,
                StratoEntities::Writer,
            ])
            .values_panic([
                id_value(self.backend, entity.id.0).into(),
                entity.family().code().into(),
                entity.manager.as_str().to_string().into(),
                entity.version.as_str().to_string().into(),
                entity.written_at.0.into(),
                entity.extent.start.0.into(),
                entity.extent.end.0.into(),
                entity.extent.altitude_lower.into(),
                entity.extent.altitude_upper.into(),
                entity.body.base_url().to_string().into(),
                entity.body.state().map(|state| state.code()).into(),
                opt_id_value(self.backend, entity.body.subscription_id().map(|id| id.0)).into(),
                self.writer.to_string().into(),
            ])
            .to_owned();
        exec(self.conn, &insert).await?;

        for chunk in entity.extent.cells.cells().chunks(CELL_INSERT_CHUNK) {
            let mut insert = Query::insert()
                .into_table(StratoEntityCells::Table)
                .columns([StratoEntityCells::EntityId, StratoEntityCells::CellId])
                .to_owned();
            for cell in chunk {
                insert.values_panic([
                    id_value(self.backend, entity.id.0).into(),
                    cell.as_i64().into(),
                ]);
            }
            exec(self.conn, &insert).await?;
        }
        Ok(())
    }

    /// Returns whether a row was removed.
    pub(crate) async fn delete_entity(&self, id: EntityId) -> DssResult<bool> {
        let delete_cells = Query::delete()
            .from_table(StratoEntityCells::Table)
            .and_where(Expr::col(StratoEntityCells::EntityId).eq(id_value(self.backend, id.0)))
            .to_owned();
        exec(self.conn, &delete_cells).await?;
        let delete = Query::delete()
            .from_table(StratoEntities::Table)
            .and_where(Expr::col(StratoEntities::EntityId).eq(id_value(self.backend, id.0)))
            .to_owned();
        Ok(exec(self.conn, &delete).await? > 0)
    }

    pub(crate) async fn expired_entities(
        &self,
        now: Timestamp,
        limit: u64,
    ) -> DssResult<Vec<EntityId>> {
        let select = Query::select()
            .column(StratoEntities::EntityId)
            .from(StratoEntities::Table)
            .and_where(Expr::col(StratoEntities::Writer).eq(self.writer.to_string()))
            .and_where(Expr::col(StratoEntities::EndsAt).lte(now.0))
            .order_by(StratoEntities::EndsAt, Order::Asc)
            .limit(limit)
            .to_owned();
        query_all(self.conn, &select)
            .await?
            .iter()
            .map(|row| read_id(row, StratoEntities::EntityId).map(EntityId))
            .collect()
    }

    async fn entity_cells(&self, ids: &[Id]) -> DssResult<HashMap<Id, Vec<CellId>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let select = Query::select()
            .columns([StratoEntityCells::EntityId, StratoEntityCells::CellId])
            .from(StratoEntityCells::Table)
            .and_where(
                Expr::col(StratoEntityCells::EntityId)
                    .is_in(ids.iter().map(|id| id_value(self.backend, *id))),
            )
            .to_owned();
        let mut cells: HashMap<Id, Vec<CellId>> = HashMap::new();
        for row in query_all(self.conn, &select).await? {
            let id = read_id(&row, StratoEntityCells::EntityId)?;
            let cell: i64 = row.try_get("", &col_name(StratoEntityCells::CellId))?;
            cells.entry(id).or_default().push(CellId::from_i64(cell));
        }
        Ok(cells)
    }

    pub(crate) async fn get_subscription(
        &self,
        id: SubscriptionId,
    ) -> DssResult<Option<Subscription>> {
        let select = subscription_select()
            .and_where(
                Expr::col(StratoSubscriptions::SubscriptionId).eq(id_value(self.backend, id.0)),
            )
            .limit(1)
            .to_owned();
        let Some(row) = query_one(self.conn, &select).await? else {
            return Ok(None);
        };
        let mut cells = self.subscription_cells(&[id.0]).await?;
        let subscription = read_subscription(&row, cells.remove(&id.0).unwrap_or_default())?;
        Ok(Some(subscription))
    }

    /// Subscriptions with a cell in `cells` that are still active at `now`.
    pub(crate) async fn search_subscriptions(
        &self,
        cells: &CellUnion,
        now: Timestamp,
    ) -> DssResult<Vec<Subscription>> {
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let select_ids = Query::select()
            .distinct()
            .column(StratoSubscriptionCells::SubscriptionId)
            .from(StratoSubscriptionCells::Table)
            .and_where(Expr::col(StratoSubscriptionCells::CellId).is_in(cells.as_i64s()))
            .to_owned();
        let ids = query_all(self.conn, &select_ids)
            .await?
            .iter()
            .map(|row| read_id(row, StratoSubscriptionCells::SubscriptionId))
            .collect::<DssResult<Vec<_>>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let select = subscription_select()
            .and_where(
                Expr::col(StratoSubscriptions::SubscriptionId)
                    .is_in(ids.iter().map(|id| id_value(self.backend, *id))),
            )
            .and_where(Expr::col(StratoSubscriptions::EndsAt).gt(now.0))
            .order_by(StratoSubscriptions::SubscriptionId, Order::Asc)
            .to_owned();
        let rows = query_all(self.conn, &select).await?;
        let row_ids = rows
            .iter()
            .map(|row| read_id(row, StratoSubscriptions::SubscriptionId))
            .collect::<DssResult<Vec<_>>>()?;
        let mut cells_by_id = self.subscription_cells(&row_ids).await?;
        rows.iter()
            .zip(row_ids)
            .map(|(row, id)| read_subscription(row, cells_by_id.remove(&id).unwrap_or_default()))
            .collect()
    }

    /// Highest number of active explicit subscriptions `manager` holds in any
    /// one of `cells`, not counting `exclude`.
    pub(crate) async fn max_subscriptions_per_cell(
        &self,
        manager: &ManagerId,
        cells: &CellUnion,
        now: Timestamp,
        exclude: SubscriptionId,
    ) -> DssResult<usize> {
        if cells.is_empty() {
            return Ok(0);
        }
        let select = Query::select()
            .column((StratoSubscriptionCells::Table, StratoSubscriptionCells::CellId))
            .from(StratoSubscriptionCells::Table)
            .inner_join(
                StratoSubscriptions::Table,
                Expr::col((
                    StratoSubscriptions::Table,
                    StratoSubscriptions::SubscriptionId,
                ))
                .equals((
                    StratoSubscriptionCells::Table,
                    StratoSubscriptionCells::SubscriptionId,
                )),
            )
            .and_where(
                Expr::col((StratoSubscriptionCells::Table, StratoSubscriptionCells::CellId))
                    .is_in(cells.as_i64s()),
            )
            .and_where(
                Expr::col((StratoSubscriptions::Table, StratoSubscriptions::Manager))
                    .eq(manager.as_str().to_string()),
            )
            .and_where(Expr::col((StratoSubscriptions::Table, StratoSubscriptions::EndsAt)).gt(now.0))
            .and_where(
                Expr::col((StratoSubscriptions::Table, StratoSubscriptions::IsImplicit)).eq(false),
            )
            .and_where(
                Expr::col((
                    StratoSubscriptions::Table,
                    StratoSubscriptions::SubscriptionId,
                ))
                .ne(id_value(self.backend, exclude.0)),
            )
            .to_owned();
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for row in query_all(self.conn, &select).await? {
            let cell: i64 = row.try_get("", &col_name(StratoSubscriptionCells::CellId))?;
            *counts.entry(cell).or_default() += 1;
        }
        Ok(counts.into_values().max().unwrap_or(0))
    }

    pub(crate) async fn upsert_subscription(&self, subscription: &Subscription) -> DssResult<()> {
        self.delete_subscription(subscription.id).await?;
        let insert = Query::insert()
            .into_table(StratoSubscriptions::Table)
            .columns([
                StratoSubscriptions::SubscriptionId,
                StratoSubscriptions::Manager,
                StratoSubscriptions::Ovn,
                StratoSubscriptions::VersionMicros,
                StratoSubscriptions::StartsAt,
                StratoSubscriptions::EndsAt,
                StratoSubscriptions::AltitudeLower,
                StratoSubscriptions::AltitudeUpper,
                StratoSubscriptions::CallbackUrl,
                StratoSubscriptions::NotificationIndex,
                StratoSubscriptions::NotifyOperationalIntents,
                StratoSubscriptions::NotifyConstraints,
                StratoSubscriptions::NotifyServiceAreas,
                StratoSubscriptions::IsImplicit,
                StratoSubscriptions::Writer,
            ])
            .values_panic([
                id_value(self.backend, subscription.id.0).into(),
                subscription.manager.as_str().to_string().into(),
                subscription.version.as_str().to_string().into(),
                subscription.written_at.0.into(),
                subscription.extent.start.0.into(),
                subscription.extent.end.0.into(),
                subscription.extent.altitude_lower.into(),
                subscription.extent.altitude_upper.into(),
                subscription.callback_url.clone().into(),
                subscription.notification_index.into(),
                subscription.notify.operational_intents.into(),
                subscription.notify.constraints.into(),
                subscription.notify.service_areas.into(),
                subscription.implicit.into(),
                self.writer.to_string().into(),
            ])
            .to_owned();
        exec(self.conn, &insert).await?;

        for chunk in subscription.extent.cells.cells().chunks(CELL_INSERT_CHUNK) {
            let mut insert = Query::insert()
                .into_table(StratoSubscriptionCells::Table)
                .columns([
                    StratoSubscriptionCells::SubscriptionId,
                    StratoSubscriptionCells::CellId,
                ])
                .to_owned();
            for cell in chunk {
                insert.values_panic([
                    id_value(self.backend, subscription.id.0).into(),
                    cell.as_i64().into(),
                ]);
            }
            exec(self.conn, &insert).await?;
        }
        Ok(())
    }

    pub(crate) async fn delete_subscription(&self, id: SubscriptionId) -> DssResult<bool> {
        let delete_cells = Query::delete()
            .from_table(StratoSubscriptionCells::Table)
            .and_where(
                Expr::col(StratoSubscriptionCells::SubscriptionId)
                    .eq(id_value(self.backend, id.0)),
            )
            .to_owned();
        exec(self.conn, &delete_cells).await?;
        let delete = Query::delete()
            .from_table(StratoSubscriptions::Table)
            .and_where(
                Expr::col(StratoSubscriptions::SubscriptionId).eq(id_value(self.backend, id.0)),
            )
            .to_owned();
        Ok(exec(self.conn, &delete).await? > 0)
    }

    /// Bumps each counter by one and returns the new values.
    pub(crate) async fn increment_notification_indices(
        &self,
        ids: &[SubscriptionId],
    ) -> DssResult<HashMap<SubscriptionId, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let id_values = || ids.iter().map(|id| id_value(self.backend, id.0));
        let update = Query::update()
            .table(StratoSubscriptions::Table)
            .value(
                StratoSubscriptions::NotificationIndex,
                Expr::col(StratoSubscriptions::NotificationIndex).add(1),
            )
            .and_where(Expr::col(StratoSubscriptions::SubscriptionId).is_in(id_values()))
            .to_owned();
        exec(self.conn, &update).await?;

        let select = Query::select()
            .columns([
                StratoSubscriptions::SubscriptionId,
                StratoSubscriptions::NotificationIndex,
            ])
            .from(StratoSubscriptions::Table)
            .and_where(Expr::col(StratoSubscriptions::SubscriptionId).is_in(id_values()))
            .to_owned();
        let mut indices = HashMap::new();
        for row in query_all(self.conn, &select).await? {
            let id = SubscriptionId(read_id(&row, StratoSubscriptions::SubscriptionId)?);
            let index: i64 = row.try_get("", &col_name(StratoSubscriptions::NotificationIndex))?;
            indices.insert(id, index);
        }
        Ok(indices)
    }

    pub(crate) async fn expired_subscriptions(
        &self,
        now: Timestamp,
        limit: u64,
    ) -> DssResult<Vec<SubscriptionId>> {
        let select = Query::select()
            .column(StratoSubscriptions::SubscriptionId)
            .from(StratoSubscriptions::Table)
            .and_where(Expr::col(StratoSubscriptions::Writer).eq(self.writer.to_string()))
            .and_where(Expr::col(StratoSubscriptions::EndsAt).lte(now.0))
            .order_by(StratoSubscriptions::EndsAt, Order::Asc)
            .limit(limit)
            .to_owned();
        query_all(self.conn, &select)
            .await?
            .iter()
            .map(|row| read_id(row, StratoSubscriptions::SubscriptionId).map(SubscriptionId))
            .collect()
    }

    async fn subscription_cells(&self, ids: &[Id]) -> DssResult<HashMap<Id, Vec<CellId>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let select = Query::select()
            .columns([
                StratoSubscriptionCells::SubscriptionId,
                StratoSubscriptionCells::CellId,
            ])
            .from(StratoSubscriptionCells::Table)
            .and_where(
                Expr::col(StratoSubscriptionCells::SubscriptionId)
                    .is_in(ids.iter().map(|id| id_value(self.backend, *id))),
            )
            .to_owned();
        let mut cells: HashMap<Id, Vec<CellId>> = HashMap::new();
        for row in query_all(self.conn, &select).await? {
            let id = read_id(&row, StratoSubscriptionCells::SubscriptionId)?;
            let cell: i64 = row.try_get("", &col_name(StratoSubscriptionCells::CellId))?;
            cells.entry(id).or_default().push(CellId::from_i64(cell));
        }
        Ok(cells)
    }

    /// Row locks on the subscriptions indexed under `cells`. Serializes
    /// writers working in the same area; a no-op where the backend has no
    /// row locking.
    pub(crate) async fn lock_cells(&self, cells: &CellUnion) -> DssResult<()> {
        if cells.is_empty() || self.backend == DatabaseBackend::Sqlite {
            return Ok(());
        }
        let select = Query::select()
            .column(StratoSubscriptionCells::SubscriptionId)
            .from(StratoSubscriptionCells::Table)
            .and_where(Expr::col(StratoSubscriptionCells::CellId).is_in(cells.as_i64s()))
            .lock(LockType::Update)
            .to_owned();
        query_all(self.conn, &select).await?;
        Ok(())
    }

    pub(crate) async fn tombstone(&self, id: Id) -> DssResult<Option<Tombstone>> {
        let select = Query::select()
            .columns([StratoTombstones::RecordKind, StratoTombstones::VersionMicros])
            .from(StratoTombstones::Table)
            .and_where(Expr::col(StratoTombstones::RecordId).eq(id_value(self.backend, id)))
            .limit(1)
            .to_owned();
        let Some(row) = query_one(self.conn, &select).await? else {
            return Ok(None);
        };
        Ok(Some(Tombstone {
            kind: row.try_get("", &col_name(StratoTombstones::RecordKind))?,
            version: Timestamp(row.try_get("", &col_name(StratoTombstones::VersionMicros))?),
        }))
    }

    pub(crate) async fn put_tombstone(
        &self,
        id: Id,
        kind: i16,
        version: Timestamp,
        deleted_at: Timestamp,
    ) -> DssResult<()> {
        self.clear_tombstone(id).await?;
        let insert = Query::insert()
            .into_table(StratoTombstones::Table)
            .columns([
                StratoTombstones::RecordId,
                StratoTombstones::RecordKind,
                StratoTombstones::VersionMicros,
                StratoTombstones::DeletedAt,
            ])
            .values_panic([
                id_value(self.backend, id).into(),
                kind.into(),
                version.0.into(),
                deleted_at.0.into(),
            ])
            .to_owned();
        exec(self.conn, &insert).await?;
        Ok(())
    }

    pub(crate) async fn clear_tombstone(&self, id: Id) -> DssResult<()> {
        let delete = Query::delete()
            .from_table(StratoTombstones::Table)
            .and_where(Expr::col(StratoTombstones::RecordId).eq(id_value(self.backend, id)))
            .to_owned();
        exec(self.conn, &delete).await?;
        Ok(())
    }

    pub(crate) async fn purge_tombstones(&self, before: Timestamp) -> DssResult<u64> {
        let delete = Query::delete()
            .from_table(StratoTombstones::Table)
            .and_where(Expr::col(StratoTombstones::DeletedAt).lt(before.0))
            .to_owned();
        exec(self.conn, &delete).await
    }
}

fn entity_select() -> SelectStatement {
    Query::select()
        .columns([
            StratoEntities::EntityId,
            StratoEntities::Family,
            StratoEntities::Manager,
            StratoEntities::Ovn,
            StratoEntities::VersionMicros,
            StratoEntities::StartsAt,
            StratoEntities::EndsAt,
            StratoEntities::AltitudeLower,
            StratoEntities::AltitudeUpper,
            StratoEntities::BaseUrl,
            StratoEntities::State,
            StratoEntities::SubscriptionId,
        ])
        .from(StratoEntities::Table)
        .to_owned()
}

fn subscription_select() -> SelectStatement {
    Query::select()
        .columns([
            StratoSubscriptions::SubscriptionId,
            StratoSubscriptions::Manager,
            StratoSubscriptions::Ovn,
            StratoSubscriptions::VersionMicros,
            StratoSubscriptions::StartsAt,
            StratoSubscriptions::EndsAt,
            StratoSubscriptions::AltitudeLower,
            StratoSubscriptions::AltitudeUpper,
            StratoSubscriptions::CallbackUrl,
            StratoSubscriptions::NotificationIndex,
            StratoSubscriptions::NotifyOperationalIntents,
            StratoSubscriptions::NotifyConstraints,
            StratoSubscriptions::NotifyServiceAreas,
            StratoSubscriptions::IsImplicit,
        ])
        .from(StratoSubscriptions::Table)
        .to_owned()
}

fn read_entity(row: &QueryResult, cells: Vec<CellId>) -> DssResult<Entity> {
    let family = EntityFamily::from_code(row.try_get("", &col_name(StratoEntities::Family))?)?;
    let base_url: String = row.try_get("", &col_name(StratoEntities::BaseUrl))?;
    let subscription_id = read_opt_id(row, StratoEntities::SubscriptionId)?.map(SubscriptionId);
    let body = match family {
        EntityFamily::OperationalIntent => {
            let code: Option<i16> = row.try_get("", &col_name(StratoEntities::State))?;
            let code = code
                .ok_or_else(|| DssError::internal("operational intent row without state"))?;
            EntityBody::OperationalIntent {
                uss_base_url: base_url,
                state: OperationalIntentState::from_code(code)?,
                subscription_id,
            }
        }
        EntityFamily::Constraint => EntityBody::Constraint {
            uss_base_url: base_url,
            subscription_id,
        },
        EntityFamily::ServiceArea => EntityBody::ServiceArea {
            flights_url: base_url,
        },
    };
    Ok(Entity {
        id: EntityId(read_id(row, StratoEntities::EntityId)?),
        manager: ManagerId::new(row.try_get::<String>("", &col_name(StratoEntities::Manager))?),
        version: Version::new(row.try_get::<String>("", &col_name(StratoEntities::Ovn))?),
        written_at: Timestamp(row.try_get("", &col_name(StratoEntities::VersionMicros))?),
        extent: Extent {
            cells: CellUnion::from_cells(cells),
            start: Timestamp(row.try_get("", &col_name(StratoEntities::StartsAt))?),
            end: Timestamp(row.try_get("", &col_name(StratoEntities::EndsAt))?),
            altitude_lower: row.try_get("", &col_name(StratoEntities::AltitudeLower))?,
            altitude_upper: row.try_get("", &col_name(StratoEntities::AltitudeUpper))?,
        },
        body,
    })
}

fn read_subscription(row: &QueryResult, cells: Vec<CellId>) -> DssResult<Subscription> {
    Ok(Subscription {
        id: SubscriptionId(read_id(row, StratoSubscriptions::SubscriptionId)?),
        manager: ManagerId::new(
            row.try_get::<String>("", &col_name(StratoSubscriptions::Manager))?,
        ),
        version: Version::new(
            row.try_get::<String>("", &col_name(StratoSubscriptions::Ovn))?,
        ),
        written_at: Timestamp(row.try_get("", &col_name(StratoSubscriptions::VersionMicros))?),
        extent: Extent {
            cells: CellUnion::from_cells(cells),
            start: Timestamp(row.try_get("", &col_name(StratoSubscriptions::StartsAt))?),
            end: Timestamp(row.try_get("", &col_name(StratoSubscriptions::EndsAt))?),
            altitude_lower: row.try_get("", &col_name(StratoSubscriptions::AltitudeLower))?,
            altitude_upper: row.try_get("", &col_name(StratoSubscriptions::AltitudeUpper))?,
        },
        callback_url: row.try_get("", &col_name(StratoSubscriptions::CallbackUrl))?,
        notification_index: row.try_get("", &col_name(StratoSubscriptions::NotificationIndex))?,
        notify: NotifyFlags {
            operational_intents: row
                .try_get("", &col_name(StratoSubscriptions::NotifyOperationalIntents))?,
            constraints: row.try_get("", &col_name(StratoSubscriptions::NotifyConstraints))?,
            service_areas: row.try_get("", &col_name(StratoSubscriptions::NotifyServiceAreas))?,
        },
        implicit: row.try_get("", &col_name(StratoSubscriptions::IsImplicit))?,
    })
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => id.as_uuid().into(),
        DatabaseBackend::MySql => id.as_vec().into(),
        _ => id.to_uuid_string().into(),
    }
}

fn none_id_value(backend: DatabaseBackend) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => Option::<Uuid>::None.into(),
        DatabaseBackend::MySql => Option::<Vec<u8>>::None.into(),
        _ => SeaValue::String(None),
    }
}

fn opt_id_value(backend: DatabaseBackend, id: Option<Id>) -> SeaValue {
    match id {
        Some(id) => id_value(backend, id),
        None => none_id_value(backend),
    }
}

fn bytes_to_id(bytes: Vec<u8>) -> Option<Id> {
    let bytes: [u8; 16] = bytes.try_into().ok()?;
    Some(Id::from_bytes(bytes))
}

fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> DssResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&value).map_err(|err| DssError::internal(err.to_string()));
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", &name) {
        return bytes_to_id(value).ok_or_else(|| DssError::internal("invalid id length"));
    }
    Err(DssError::internal("unsupported id format"))
}

fn read_opt_id(row: &QueryResult, column: impl sea_query::Iden) -> DssResult<Option<Id>> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<Option<String>>("", &name) {
        return value
            .map(|value| Id::from_uuid_str(&value).map_err(|err| DssError::internal(err.to_string())))
            .transpose();
    }
    if let Ok(value) = row.try_get::<Option<Uuid>>("", &name) {
        return Ok(value.map(|value| Id::from_bytes(*value.as_bytes())));
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>>("", &name) {
        return Ok(value.and_then(bytes_to_id));
    }
    Ok(None)
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

/// Returns the number of affected rows.
pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> DssResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> DssResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> DssResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}
