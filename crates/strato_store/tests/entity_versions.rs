mod support;

use strato_store::{
    EntityApi, EntityFamily, EntityId, ErrorKind, OperationalIntentState, OvnKey,
    SubscriptionApi, SubscriptionBinding, SubscriptionId, Version, Volume4d,
};
use support::{
    HOUR, harness, implicit, intent, intents_only, operator, sion, square, subscription,
    zermatt,
};

#[tokio::test]
async fn create_update_delete_follow_the_version_protocol() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
    let id = EntityId::new();
    let accepted = |old: Option<Version>| {
        intent(
            id,
            h.volume(sion(), 2),
            old,
            OperationalIntentState::Accepted,
            OvnKey::new(),
            SubscriptionBinding::None,
        )
    };

    let created = h.dss.put_entity(&uss1, accepted(None)).await?;
    let v1 = created.entity.version.clone();
    assert!(created.subscribers.is_empty());
    assert_eq!(created.entity.written_at, h.now());

    let duplicate = h
        .dss
        .put_entity(&uss1, accepted(None))
        .await
        .expect_err("create over an existing id");
    assert_eq!(duplicate.kind(), ErrorKind::AlreadyExists);

    let stale = h
        .dss
        .put_entity(&uss1, accepted(Some(Version::new("0000000000000001"))))
        .await
        .expect_err("stale version");
    assert_eq!(stale.kind(), ErrorKind::VersionMismatch);

    let updated = h.dss.put_entity(&uss1, accepted(Some(v1.clone()))).await?;
    let v2 = updated.entity.version.clone();
    assert!(v2 > v1, "tokens must increase even within one clock tick");
    assert!(updated.entity.written_at > created.entity.written_at);

    let replayed = h
        .dss
        .put_entity(&uss1, accepted(Some(v1)))
        .await
        .expect_err("lost update");
    assert_eq!(replayed.kind(), ErrorKind::VersionMismatch);

    let deleted = h
        .dss
        .delete_entity(&uss1, EntityFamily::OperationalIntent, id, v2.clone())
        .await?;
    assert_eq!(deleted.entity.version, v2);

    let after_delete = h
        .dss
        .put_entity(&uss1, accepted(Some(v2.clone())))
        .await
        .expect_err("update of a deleted entity");
    assert_eq!(after_delete.kind(), ErrorKind::VersionMismatch);

    let delete_again = h
        .dss
        .delete_entity(&uss1, EntityFamily::OperationalIntent, id, v2.clone())
        .await
        .expect_err("double delete");
    assert_eq!(delete_again.kind(), ErrorKind::VersionMismatch);

    let recreated = h.dss.put_entity(&uss1, accepted(None)).await?;
    assert!(recreated.entity.version > v2);
    Ok(())
}

#[tokio::test]
async fn stale_update_changes_nothing() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
    let uss3 = operator("uss3");
    let id = EntityId::new();

    let created = h
        .dss
        .put_entity(
            &uss1,
            intent(
                id,
                h.volume(sion(), 2),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await?;
    let updated = h
        .dss
        .put_entity(
            &uss1,
            intent(
                id,
                h.volume(sion(), 2),
                Some(created.entity.version.clone()),
                OperationalIntentState::Activated,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await?;

    let s = SubscriptionId::new();
    h.dss
        .put_subscription(&uss3, subscription(s, h.volume(sion(), 3), None, intents_only()))
        .await?;

    let err = h
        .dss
        .put_entity(
            &uss1,
            intent(
                id,
                h.volume(sion(), 3),
                Some(created.entity.version),
                OperationalIntentState::Activated,
                OvnKey::new(),
                implicit(false),
            ),
        )
        .await
        .expect_err("superseded version");
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);

    assert_eq!(h.dss.get_subscription(&uss3, s).await?.notification_index, 0);
    assert!(
        h.dss
            .search_subscriptions(&uss1, h.volume(sion(), 3))
            .await?
            .is_empty()
    );
    let stored = h
        .dss
        .get_entity(&uss1, EntityFamily::OperationalIntent, id)
        .await?;
    assert_eq!(stored.version, updated.entity.version);
    assert_eq!(stored.written_at, updated.entity.written_at);
    assert_eq!(stored.extent.end, updated.entity.extent.end);
    assert_eq!(stored.body.subscription_id(), None);
    Ok(())
}

#[tokio::test]
async fn updating_an_unknown_id_is_not_found() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let err = h
        .dss
        .put_entity(
            &operator("uss1"),
            intent(
                EntityId::new(),
                h.volume(sion(), 1),
                Some(Version::new("00063f0000000000")),
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await
        .expect_err("unknown id");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn empty_old_version_creates() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let created = h
        .dss
        .put_entity(
            &operator("uss1"),
            intent(
                EntityId::new(),
                h.volume(sion(), 1),
                Some(Version::new("")),
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await?;
    assert!(!created.entity.version.is_redacted());
    Ok(())
}

#[tokio::test]
async fn only_the_manager_may_mutate() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let id = EntityId::new();
    let created = h
        .dss
        .put_entity(
            &operator("uss1"),
            intent(
                id,
                h.volume(sion(), 1),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await?;
    let version = created.entity.version;

    let intruder = operator("uss2");
    let update = h
        .dss
        .put_entity(
            &intruder,
            intent(
                id,
                h.volume(sion(), 1),
                Some(version.clone()),
                OperationalIntentState::Activated,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await
        .expect_err("foreign update");
    assert_eq!(update.kind(), ErrorKind::PermissionDenied);

    let delete = h
        .dss
        .delete_entity(&intruder, EntityFamily::OperationalIntent, id, version)
        .await
        .expect_err("foreign delete");
    assert_eq!(delete.kind(), ErrorKind::PermissionDenied);
    Ok(())
}

#[tokio::test]
async fn reads_redact_foreign_versions() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let id = EntityId::new();
    let created = h
        .dss
        .put_entity(
            &operator("uss1"),
            intent(
                id,
                h.volume(sion(), 1),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::None,
            ),
        )
        .await?;

    let own = h
        .dss
        .get_entity(&operator("uss1"), EntityFamily::OperationalIntent, id)
        .await?;
    assert_eq!(own.version, created.entity.version);

    let foreign = h
        .dss
        .get_entity(&operator("uss2"), EntityFamily::OperationalIntent, id)
        .await?;
    assert!(foreign.version.is_redacted());

    let wrong_family = h
        .dss
        .get_entity(&operator("uss1"), EntityFamily::Constraint, id)
        .await
        .expect_err("family mismatch");
    assert_eq!(wrong_family.kind(), ErrorKind::NotFound);

    let found = h
        .dss
        .search_entities(
            &operator("uss2"),
            EntityFamily::OperationalIntent,
            h.volume(square(46.205, 7.405, 0.005), 1),
        )
        .await?;
    assert_eq!(found.len(), 1);
    assert!(found[0].version.is_redacted());

    let elsewhere = h
        .dss
        .search_entities(
            &operator("uss2"),
            EntityFamily::OperationalIntent,
            h.volume(zermatt(), 1),
        )
        .await?;
    assert!(elsewhere.is_empty());
    Ok(())
}

#[tokio::test]
async fn rejects_bad_volumes() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
    let now = h.now();
    let put = |extent: Volume4d| {
        intent(
            EntityId::new(),
            extent,
            None,
            OperationalIntentState::Accepted,
            OvnKey::new(),
            SubscriptionBinding::None,
        )
    };

    let ended = Volume4d::new(sion(), Some(now.minus(HOUR * 2)), Some(now.minus(HOUR)));
    let err = h.dss.put_entity(&uss1, put(ended)).await.expect_err("past");
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let open_ended = Volume4d::new(sion(), Some(now), None);
    let err = h
        .dss
        .put_entity(&uss1, put(open_ended))
        .await
        .expect_err("missing end");
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let huge = h.volume(square(40.0, 0.0, 5.0), 1);
    let err = h.dss.put_entity(&uss1, put(huge)).await.expect_err("area");
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let inverted = h
        .volume(sion(), 1)
        .with_altitudes(Some(300.0), Some(100.0));
    let err = h
        .dss
        .put_entity(&uss1, put(inverted))
        .await
        .expect_err("altitudes");
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    Ok(())
}
