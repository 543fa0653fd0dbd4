use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(StratoSubscriptions::Table)
                    .if_not_exists()
                    .col(id_col(backend, StratoSubscriptions::SubscriptionId, false))
                    .col(ColumnDef::new(StratoSubscriptions::Manager).string().not_null())
                    .col(ColumnDef::new(StratoSubscriptions::Ovn).string_len(64).not_null())
                    .col(
                        ColumnDef::new(StratoSubscriptions::VersionMicros)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::StartsAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::EndsAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StratoSubscriptions::AltitudeLower).double())
                    .col(ColumnDef::new(StratoSubscriptions::AltitudeUpper).double())
                    .col(
                        ColumnDef::new(StratoSubscriptions::CallbackUrl)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::NotificationIndex)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::NotifyOperationalIntents)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::NotifyConstraints)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::NotifyServiceAreas)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoSubscriptions::IsImplicit)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StratoSubscriptions::Writer).string().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_strato_subscriptions")
                            .col(StratoSubscriptions::SubscriptionId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StratoSubscriptionCells::Table)
                    .if_not_exists()
                    .col(id_col(
                        backend,
                        StratoSubscriptionCells::SubscriptionId,
                        false,
                    ))
                    .col(
                        ColumnDef::new(StratoSubscriptionCells::CellId)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_strato_subscription_cells")
                            .col(StratoSubscriptionCells::SubscriptionId)
                            .col(StratoSubscriptionCells::CellId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StratoEntities::Table)
                    .if_not_exists()
                    .col(id_col(backend, StratoEntities::EntityId, false))
                    .col(
                        ColumnDef::new(StratoEntities::Family)
                            .small_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StratoEntities::Manager).string().not_null())
                    .col(ColumnDef::new(StratoEntities::Ovn).string_len(64).not_null())
                    .col(
                        ColumnDef::new(StratoEntities::VersionMicros)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StratoEntities::StartsAt).big_integer().not_null())
                    .col(ColumnDef::new(StratoEntities::EndsAt).big_integer().not_null())
                    .col(ColumnDef::new(StratoEntities::AltitudeLower).double())
                    .col(ColumnDef::new(StratoEntities::AltitudeUpper).double())
                    .col(ColumnDef::new(StratoEntities::BaseUrl).string().not_null())
                    .col(ColumnDef::new(StratoEntities::State).small_integer())
                    .col(id_col(backend, StratoEntities::SubscriptionId, true))
                    .col(ColumnDef::new(StratoEntities::Writer).string().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk_strato_entities")
                            .col(StratoEntities::EntityId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StratoEntityCells::Table)
                    .if_not_exists()
                    .col(id_col(backend, StratoEntityCells::EntityId, false))
                    .col(
                        ColumnDef::new(StratoEntityCells::CellId)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_strato_entity_cells")
                            .col(StratoEntityCells::EntityId)
                            .col(StratoEntityCells::CellId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StratoTombstones::Table)
                    .if_not_exists()
                    .col(id_col(backend, StratoTombstones::RecordId, false))
                    .col(
                        ColumnDef::new(StratoTombstones::RecordKind)
                            .small_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoTombstones::VersionMicros)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StratoTombstones::DeletedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_strato_tombstones")
                            .col(StratoTombstones::RecordId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("strato_subscription_cells_cell_idx")
                    .table(StratoSubscriptionCells::Table)
                    .col(StratoSubscriptionCells::CellId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("strato_entity_cells_cell_idx")
                    .table(StratoEntityCells::Table)
                    .col(StratoEntityCells::CellId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("strato_entities_writer_ends_idx")
                    .table(StratoEntities::Table)
                    .col(StratoEntities::Writer)
                    .col(StratoEntities::EndsAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("strato_entities_subscription_idx")
                    .table(StratoEntities::Table)
                    .col(StratoEntities::SubscriptionId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("strato_subscriptions_writer_ends_idx")
                    .table(StratoSubscriptions::Table)
                    .col(StratoSubscriptions::Writer)
                    .col(StratoSubscriptions::EndsAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("strato_tombstones_deleted_idx")
                    .table(StratoTombstones::Table)
                    .col(StratoTombstones::DeletedAt)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StratoTombstones::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StratoEntityCells::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StratoEntities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StratoSubscriptionCells::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StratoSubscriptions::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn id_col(backend: DatabaseBackend, col: impl Iden + 'static, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}
