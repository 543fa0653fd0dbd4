use sea_orm::ConnectionTrait;

use crate::repo::Repo;
use strato_core::{DssResult, EntityFamily, Extent, SubscriberNotice, Timestamp};

/// Bumps the notification index of every active subscription interested in
/// `family` whose cells intersect `affected`, inside the caller's
/// transaction. Delivery is left to the caller.
pub(crate) async fn notify_subscribers<C: ConnectionTrait>(
    repo: &Repo<'_, C>,
    family: EntityFamily,
    affected: &Extent,
    now: Timestamp,
) -> DssResult<Vec<SubscriberNotice>> {
    let interested = repo
        .search_subscriptions(&affected.cells, now)
        .await?
        .into_iter()
        .filter(|subscription| subscription.notify.for_family(family))
        .collect::<Vec<_>>();
    let ids = interested
        .iter()
        .map(|subscription| subscription.id)
        .collect::<Vec<_>>();
    let indices = repo.increment_notification_indices(&ids).await?;
    let notices = interested
        .into_iter()
        .map(|subscription| SubscriberNotice {
            subscription_id: subscription.id,
            notification_index: indices
                .get(&subscription.id)
                .copied()
                .unwrap_or(subscription.notification_index + 1),
            callback_url: subscription.callback_url,
        })
        .collect::<Vec<_>>();
    log::debug!(
        "{} change reached {} subscriber(s) over {} cell(s)",
        family,
        notices.len(),
        affected.cells.len()
    );
    Ok(notices)
}
