mod support;

use std::sync::Arc;

use strato_store::{
    EntityApi, EntityFamily, EntityId, ErrorKind, FixedClock, GcReport, OperationalIntentState,
    OvnKey, StoreConfig, StratoStore, SubscriptionApi, SubscriptionBinding, SubscriptionId,
};
use support::{
    HOUR, T0, harness, implicit, intent, intents_only, operator, sion, subscription, zermatt,
};
use tempfile::tempdir;

#[tokio::test]
async fn collects_expired_records_then_tombstones() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
    let id = EntityId::new();
    let created = h
        .dss
        .put_entity(
            &uss1,
            intent(
                id,
                h.volume(sion(), 1),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                implicit(false),
            ),
        )
        .await?;
    let implicit_sub = created
        .entity
        .body
        .subscription_id()
        .expect("implicit subscription");
    let explicit_sub = SubscriptionId::new();
    h.dss
        .put_subscription(
            &uss1,
            subscription(explicit_sub, h.volume(zermatt(), 1), None, intents_only()),
        )
        .await?;
    let survivor = SubscriptionId::new();
    h.dss
        .put_subscription(&uss1, subscription(survivor, h.volume(zermatt(), 6), None, intents_only()))
        .await?;

    let gc = h.store.garbage_collector(h.clock.clone());
    assert_eq!(gc.run_once().await?, GcReport::default());

    h.clock.advance(HOUR * 2);
    let report = gc.run_once().await?;
    assert_eq!(
        report,
        GcReport {
            entities_deleted: 1,
            subscriptions_deleted: 1,
            tombstones_purged: 0,
            failures: 0,
        }
    );

    let err = h
        .dss
        .get_entity(&uss1, EntityFamily::OperationalIntent, id)
        .await
        .expect_err("collected");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    for sub in [implicit_sub, explicit_sub] {
        let err = h
            .dss
            .get_subscription(&uss1, sub)
            .await
            .expect_err("collected subscription");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
    h.dss.get_subscription(&uss1, survivor).await?;

    let update = |h: &support::Harness| {
        intent(
            id,
            h.volume(sion(), 1),
            Some(created.entity.version.clone()),
            OperationalIntentState::Accepted,
            OvnKey::new(),
            SubscriptionBinding::None,
        )
    };
    let err = h
        .dss
        .put_entity(&uss1, update(&h))
        .await
        .expect_err("tombstoned");
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);

    h.clock.advance(HOUR * 25);
    let report = gc.run_once().await?;
    assert_eq!(report.tombstones_purged, 2);
    assert_eq!(report.subscriptions_deleted, 1);

    let err = h
        .dss
        .put_entity(&uss1, update(&h))
        .await
        .expect_err("tombstone purged");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn collector_only_touches_its_own_rows() -> strato_store::DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("shared.sqlite");
    let primary = StratoStore::connect(
        &StoreConfig::default_sqlite(path.to_string_lossy()),
        dir.path(),
    )
    .await?;
    let mut replica_config = StoreConfig::default_sqlite(path.to_string_lossy());
    replica_config.writer = Some("replica".to_string());
    let replica = StratoStore::connect(&replica_config, dir.path()).await?;
    assert_eq!(replica.settings().writer, "replica");

    let clock = Arc::new(FixedClock::new(T0));
    replica
        .orchestrator(clock.clone())
        .put_entity(
            &operator("uss1"),
            intent(
                EntityId::new(),
                strato_store::Volume4d::new(sion(), Some(T0), Some(T0.plus(HOUR))),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await?;

    clock.advance(HOUR * 2);
    let report = primary.garbage_collector(clock.clone()).run_once().await?;
    assert_eq!(report.entities_deleted, 0);
    let report = replica.garbage_collector(clock.clone()).run_once().await?;
    assert_eq!(report.entities_deleted, 1);
    Ok(())
}

#[test]
fn report_encodes_as_flat_json() {
    let report = GcReport {
        entities_deleted: 3,
        subscriptions_deleted: 1,
        tombstones_purged: 0,
        failures: 2,
    };
    let encoded = serde_json::to_value(report).expect("encode report");
    assert_eq!(
        encoded,
        serde_json::json!({
            "entities_deleted": 3,
            "subscriptions_deleted": 1,
            "tombstones_purged": 0,
            "failures": 2,
        })
    );
}
