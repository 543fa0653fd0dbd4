use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum StratoSubscriptions {
    Table,
    SubscriptionId,
    Manager,
    Ovn,
    VersionMicros,
    StartsAt,
    EndsAt,
    AltitudeLower,
    AltitudeUpper,
    CallbackUrl,
    NotificationIndex,
    NotifyOperationalIntents,
    NotifyConstraints,
    NotifyServiceAreas,
    IsImplicit,
    Writer,
}

#[derive(Iden, Clone, Copy)]
pub enum StratoSubscriptionCells {
    Table,
    SubscriptionId,
    CellId,
}

#[derive(Iden, Clone, Copy)]
pub enum StratoEntities {
    Table,
    EntityId,
    Family,
    Manager,
    Ovn,
    VersionMicros,
    StartsAt,
    EndsAt,
    AltitudeLower,
    AltitudeUpper,
    BaseUrl,
    State,
    SubscriptionId,
    Writer,
}

#[derive(Iden, Clone, Copy)]
pub enum StratoEntityCells {
    Table,
    EntityId,
    CellId,
}

#[derive(Iden, Clone, Copy)]
pub enum StratoTombstones {
    Table,
    RecordId,
    RecordKind,
    VersionMicros,
    DeletedAt,
}
