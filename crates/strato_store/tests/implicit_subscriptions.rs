mod support;

use strato_store::{
    EntityApi, EntityFamily, EntityId, ErrorKind, OperationalIntentState, OvnKey,
    SubscriptionApi, SubscriptionBinding, SubscriptionId,
};
use support::{
    constraint, harness, implicit, intent, intents_only, operator, sion, sion_east, square,
    subscription,
};

#[tokio::test]
async fn implicit_subscription_lives_and_dies_with_its_entity() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
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
                implicit(false),
            ),
        )
        .await?;
    let sub_id = created
        .entity
        .body
        .subscription_id()
        .expect("implicit subscription");

    let sub = h.dss.get_subscription(&uss1, sub_id).await?;
    assert!(sub.implicit);
    assert!(sub.notify.operational_intents);
    assert!(!sub.notify.constraints);
    assert!(sub.extent.covers(&created.entity.extent));

    h.dss
        .delete_entity(
            &uss1,
            EntityFamily::OperationalIntent,
            id,
            created.entity.version,
        )
        .await?;
    let err = h
        .dss
        .get_subscription(&uss1, sub_id)
        .await
        .expect_err("released with its entity");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn reused_implicit_subscription_is_widened() -> strato_store::DssResult<()> {
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
    let sub_id = created
        .entity
        .body
        .subscription_id()
        .expect("implicit subscription");
    let before = h.dss.get_subscription(&uss1, sub_id).await?;

    let widened = h
        .dss
        .put_entity(
            &uss1,
            intent(
                id,
                h.volume(square(46.20, 7.40, 0.04), 3),
                Some(created.entity.version),
                OperationalIntentState::Accepted,
                OvnKey::new(),
                SubscriptionBinding::Existing { id: sub_id },
            ),
        )
        .await?;
    assert_eq!(widened.entity.body.subscription_id(), Some(sub_id));

    let after = h.dss.get_subscription(&uss1, sub_id).await?;
    assert!(after.extent.covers(&widened.entity.extent));
    assert!(after.version > before.version);
    Ok(())
}

#[tokio::test]
async fn replacing_an_implicit_subscription_drops_the_old_one() -> strato_store::DssResult<()> {
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
    let old_sub = created
        .entity
        .body
        .subscription_id()
        .expect("implicit subscription");

    let updated = h
        .dss
        .put_entity(
            &uss1,
            intent(
                id,
                h.volume(sion(), 1),
                Some(created.entity.version),
                OperationalIntentState::Accepted,
                OvnKey::new(),
                implicit(true),
            ),
        )
        .await?;
    let new_sub = updated
        .entity
        .body
        .subscription_id()
        .expect("implicit subscription");
    assert_ne!(new_sub, old_sub);
    assert!(h.dss.get_subscription(&uss1, new_sub).await?.notify.constraints);
    let err = h
        .dss
        .get_subscription(&uss1, old_sub)
        .await
        .expect_err("old implicit subscription removed");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn shared_implicit_subscription_outlives_one_entity() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
    let first = h
        .dss
        .put_entity(
            &uss1,
            intent(
                EntityId::new(),
                h.volume(sion(), 2),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                implicit(false),
            ),
        )
        .await?;
    let sub_id = first
        .entity
        .body
        .subscription_id()
        .expect("implicit subscription");

    let key = [first.entity.version.clone()]
        .into_iter()
        .collect::<OvnKey>();
    let second = h
        .dss
        .put_entity(
            &uss1,
            intent(
                EntityId::new(),
                h.volume(sion(), 1),
                None,
                OperationalIntentState::Accepted,
                key,
                SubscriptionBinding::Existing { id: sub_id },
            ),
        )
        .await?;

    h.dss
        .delete_entity(
            &uss1,
            EntityFamily::OperationalIntent,
            first.entity.id,
            first.entity.version,
        )
        .await?;
    assert!(h.dss.get_subscription(&uss1, sub_id).await?.implicit);

    h.dss
        .delete_entity(
            &uss1,
            EntityFamily::OperationalIntent,
            second.entity.id,
            second.entity.version,
        )
        .await?;
    let err = h
        .dss
        .get_subscription(&uss1, sub_id)
        .await
        .expect_err("last reference gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn explicit_bindings_are_checked() -> strato_store::DssResult<()> {
    let h = harness().await?;
    let uss1 = operator("uss1");
    let sub_id = SubscriptionId::new();
    let sub = h
        .dss
        .put_subscription(&uss1, subscription(sub_id, h.volume(sion(), 2), None, intents_only()))
        .await?;
    let binding = SubscriptionBinding::Existing { id: sub_id };

    let outside = h
        .dss
        .put_entity(
            &uss1,
            intent(
                EntityId::new(),
                h.volume(sion_east(), 1),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                binding.clone(),
            ),
        )
        .await
        .expect_err("not covered");
    assert_eq!(outside.kind(), ErrorKind::BadRequest);

    let foreign = h
        .dss
        .put_entity(
            &operator("uss2"),
            intent(
                EntityId::new(),
                h.volume(sion(), 1),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                binding.clone(),
            ),
        )
        .await
        .expect_err("someone else's subscription");
    assert_eq!(foreign.kind(), ErrorKind::PermissionDenied);

    let wrong_family = h
        .dss
        .put_entity(
            &uss1,
            constraint(EntityId::new(), h.volume(sion(), 1), None, binding.clone()),
        )
        .await
        .expect_err("subscription ignores constraints");
    assert_eq!(wrong_family.kind(), ErrorKind::BadRequest);

    let bound = h
        .dss
        .put_entity(
            &uss1,
            intent(
                EntityId::new(),
                h.volume(sion(), 1),
                None,
                OperationalIntentState::Accepted,
                OvnKey::new(),
                binding,
            ),
        )
        .await?;
    assert_eq!(bound.entity.body.subscription_id(), Some(sub_id));

    let delete = h
        .dss
        .delete_subscription(&uss1, sub_id, sub.subscription.version.clone())
        .await
        .expect_err("still referenced");
    assert_eq!(delete.kind(), ErrorKind::BadRequest);

    let narrowed = h
        .dss
        .put_subscription(
            &uss1,
            subscription(
                sub_id,
                h.volume(sion_east(), 2),
                Some(sub.subscription.version),
                intents_only(),
            ),
        )
        .await
        .expect_err("dependent no longer covered");
    assert_eq!(narrowed.kind(), ErrorKind::BadRequest);
    Ok(())
}
