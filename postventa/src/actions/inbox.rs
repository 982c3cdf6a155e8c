//! Reading one's own notifications.

use super::{ActionError, Actor};
use crate::core::types::{NotificationId, Recipient};
use crate::model::{Notification, Store};
use crate::notifications;

fn recipient_of(actor: &Actor) -> Result<Recipient, ActionError> {
    match *actor {
        Actor::Owner { owner, .. } => Ok(Recipient::Owner(owner)),
        Actor::Technician { technician, .. } => Ok(Recipient::Technician(technician)),
        _ => Err(ActionError::Forbidden(
            "staff accounts have no inbox".to_string(),
        )),
    }
}

pub fn list_notifications<'s>(
    store: &'s Store,
    actor: &Actor,
) -> Result<Vec<&'s Notification>, ActionError> {
    Ok(notifications::inbox(store, recipient_of(actor)?))
}

pub fn mark_read(store: &mut Store, actor: &Actor, id: NotificationId) -> Result<(), ActionError> {
    let recipient = recipient_of(actor)?;
    let entry = store
        .notification_mut(id)
        .ok_or_else(|| ActionError::not_found("notification", id))?;
    if entry.recipient != recipient {
        return Err(ActionError::not_found("notification", id));
    }
    entry.read = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AccountId, OwnerId};
    use crate::notifications::{MessageContext, NotificationKind, queue};
    use crate::test_support::{fixed_now, sample_store};

    #[test]
    fn owner_marks_own_notification_read() {
        let mut store = sample_store();
        let recipient = Recipient::Owner(OwnerId(1));
        let ctx = MessageContext {
            recipient: "Ana".to_string(),
            folio: "PV-2025-0002".to_string(),
            ..MessageContext::default()
        };
        let id = queue(
            &mut store,
            recipient,
            None,
            NotificationKind::TechnicianAssigned,
            &ctx,
            fixed_now(),
        )
        .expect("queue");

        let stranger = Actor::Owner {
            account: AccountId(8),
            owner: OwnerId(2),
        };
        assert!(matches!(
            mark_read(&mut store, &stranger, id),
            Err(ActionError::NotFound { .. })
        ));
        let ana = Actor::Owner {
            account: AccountId(2),
            owner: OwnerId(1),
        };
        mark_read(&mut store, &ana, id).expect("mark");
        let inbox = list_notifications(&store, &ana).expect("inbox");
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].read);
    }
}
