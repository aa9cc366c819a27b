//! Message-level fan-out over the [`Registry`].
//!
//! The registry moves opaque frames. The broadcaster serializes a
//! [`Message`] once, stamps the role hint each audience expects, and maps
//! role/staff fan-out onto explicit role filters.

use std::sync::Arc;

use tableside_core::{ConnectionId, Role, RoleSet};
use tracing::{debug, info};

use crate::errors::HubError;
use crate::protocol::{DirectMessage, Message, kind};
use crate::registry::{Delivery, OutboundFrame, Registry};

/// Cloneable fan-out front end.
#[derive(Clone, Debug)]
pub struct Broadcaster {
    registry: Registry,
}

impl Broadcaster {
    /// Wrap a registry handle.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn encode(message: &Message) -> Result<OutboundFrame, HubError> {
        Ok(Arc::new(serde_json::to_string(message)?))
    }

    /// Deliver `message` verbatim to every live session.
    pub async fn broadcast(&self, message: &Message) -> Result<Delivery, HubError> {
        let delivery = self.registry.broadcast(Self::encode(message)?).await?;
        debug!(
            msg_type = %message.kind,
            action = %message.action,
            recipients = delivery.delivered,
            evicted = delivery.evicted,
            "broadcast"
        );
        Ok(delivery)
    }

    /// Deliver `message` to the members of a room.
    pub async fn to_room(&self, room_id: &str, message: &Message) -> Result<Delivery, HubError> {
        let delivery = self
            .registry
            .broadcast_to_room(room_id, Self::encode(message)?)
            .await?;
        debug!(
            room_id,
            msg_type = %message.kind,
            recipients = delivery.delivered,
            "room broadcast"
        );
        Ok(delivery)
    }

    /// Deliver `message` to every session of one role, with the role as hint.
    pub async fn to_role(&self, role: Role, message: Message) -> Result<Delivery, HubError> {
        let message = message.with_role(role);
        self.registry
            .broadcast_to_roles(RoleSet::of(role), Self::encode(&message)?)
            .await
    }

    /// Deliver `message` to all staff on behalf of `from`.
    ///
    /// The role hint is `Employee`; staff clients decide what to do based on
    /// their own role.
    pub async fn to_staff(&self, from: &str, message: Message) -> Result<Delivery, HubError> {
        let message = message.with_role(Role::Employee);
        let delivery = self
            .registry
            .broadcast_to_roles(RoleSet::STAFF, Self::encode(&message)?)
            .await?;
        info!(
            from,
            msg_type = %message.kind,
            action = %message.action,
            recipients = delivery.delivered,
            "staff notified"
        );
        Ok(delivery)
    }

    /// Deliver a direct message to its addressee, wrapped as a `direct`
    /// message whose payload is the [`DirectMessage`] itself.
    pub async fn direct(&self, direct: &DirectMessage) -> Result<Delivery, HubError> {
        let message = Message::new(
            kind::DIRECT,
            direct.action.clone(),
            serde_json::to_value(direct)?,
        )
        .with_role(direct.to_role.unwrap_or(Role::User));
        let delivery = self
            .registry
            .send_direct(&direct.to_user_id, direct.to_role, Self::encode(&message)?)
            .await?;
        debug!(
            from = %direct.from_user_id,
            to = %direct.to_user_id,
            action = %direct.action,
            "direct message delivered"
        );
        Ok(delivery)
    }

    /// Deliver `message` to exactly one connection.
    pub async fn reply(&self, to: &ConnectionId, message: &Message) -> Result<(), HubError> {
        self.registry.send_to(to, Self::encode(message)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionHandle;
    use crate::session::SessionInfo;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        broadcaster: Broadcaster,
        _cancel: tokio_util::sync::DropGuard,
    }

    fn harness() -> Harness {
        let cancel = CancellationToken::new();
        let (registry, _task) = Registry::spawn(cancel.clone());
        Harness {
            broadcaster: Broadcaster::new(registry),
            _cancel: cancel.drop_guard(),
        }
    }

    fn join(
        h: &Harness,
        id: &str,
        role: Role,
        room: Option<&str>,
    ) -> (ConnectionId, mpsc::Receiver<OutboundFrame>) {
        let info = Arc::new(SessionInfo::new(id, role, room.map(str::to_string)));
        let conn_id = info.connection_id.clone();
        let (handle, rx) = SessionHandle::new(info, 8);
        h.broadcaster.registry().register(handle);
        (conn_id, rx)
    }

    fn next(rx: &mut mpsc::Receiver<OutboundFrame>) -> Option<Message> {
        rx.try_recv().ok().map(|f| Message::decode(&f).unwrap())
    }

    #[tokio::test]
    async fn broadcast_is_verbatim() {
        let h = harness();
        let (_, mut a) = join(&h, "a", Role::Guest, None);
        let (_, mut b) = join(&h, "b", Role::Admin, Some("t1"));

        let msg = Message::new(kind::STATUS_UPDATE, "closing", json!({"in": 15}));
        let delivery = h.broadcaster.broadcast(&msg).await.unwrap();
        assert_eq!(delivery.delivered, 2);
        assert_eq!(next(&mut a), Some(msg.clone()));
        assert_eq!(next(&mut b), Some(msg));
    }

    #[tokio::test]
    async fn to_role_stamps_hint_and_filters() {
        let h = harness();
        let (_, mut kitchen) = join(&h, "k", Role::Kitchen, None);
        let (_, mut employee) = join(&h, "e", Role::Employee, None);

        let msg = Message::new(kind::NOTIFICATION, "new_order", json!({}));
        let _ = h.broadcaster.to_role(Role::Kitchen, msg).await.unwrap();

        let got = next(&mut kitchen).unwrap();
        assert_eq!(got.role, Some(Role::Kitchen));
        assert!(next(&mut employee).is_none());
    }

    #[tokio::test]
    async fn to_staff_reaches_every_staff_role_only() {
        let h = harness();
        let (_, mut kitchen) = join(&h, "k", Role::Kitchen, None);
        let (_, mut employee) = join(&h, "e", Role::Employee, None);
        let (_, mut admin) = join(&h, "a", Role::Admin, None);
        let (_, mut user) = join(&h, "u", Role::User, None);
        let (_, mut guest) = join(&h, "g", Role::Guest, None);

        let msg = Message::new(kind::ORDER, "new_order", json!({"tableNumber": 4}));
        let delivery = h.broadcaster.to_staff("u", msg).await.unwrap();
        assert_eq!(delivery.delivered, 3);

        for rx in [&mut kitchen, &mut employee, &mut admin] {
            let got = next(rx).unwrap();
            assert_eq!(got.role, Some(Role::Employee));
            assert_eq!(got.payload["tableNumber"], 4);
        }
        assert!(next(&mut user).is_none());
        assert!(next(&mut guest).is_none());
    }

    #[tokio::test]
    async fn to_staff_without_staff_is_surfaced() {
        let h = harness();
        let (_, _user) = join(&h, "u", Role::User, None);
        let err = h
            .broadcaster
            .to_staff("u", Message::new(kind::ORDER, "new_order", json!({})))
            .await
            .unwrap_err();
        assert_matches!(err, HubError::NoRecipients { .. });
    }

    #[tokio::test]
    async fn direct_wraps_the_direct_message() {
        let h = harness();
        let (_, mut bob) = join(&h, "bob", Role::User, None);
        let (_, mut eve) = join(&h, "eve", Role::User, None);

        let direct = DirectMessage {
            from_user_id: "alice".into(),
            to_user_id: "bob".into(),
            kind: "chat".into(),
            action: "hello".into(),
            payload: json!({"text": "hi bob"}),
            ..DirectMessage::default()
        };
        let _ = h.broadcaster.direct(&direct).await.unwrap();

        let got = next(&mut bob).unwrap();
        assert_eq!(got.kind, kind::DIRECT);
        assert_eq!(got.action, "hello");
        assert_eq!(got.role, Some(Role::User));
        assert_eq!(got.payload["fromUserId"], "alice");
        assert_eq!(got.payload["payload"]["text"], "hi bob");
        assert!(next(&mut eve).is_none());
    }

    #[tokio::test]
    async fn room_fan_out() {
        let h = harness();
        let (_, mut in_room) = join(&h, "a", Role::Guest, Some("table-2"));
        let (_, mut elsewhere) = join(&h, "b", Role::Guest, Some("table-3"));

        let msg = Message::new(kind::NOTIFICATION, "order_status", json!({"status": "cooking"}))
            .with_room("table-2");
        let delivery = h.broadcaster.to_room("table-2", &msg).await.unwrap();
        assert_eq!(delivery.delivered, 1);
        assert_eq!(next(&mut in_room), Some(msg));
        assert!(next(&mut elsewhere).is_none());
    }

    #[tokio::test]
    async fn reply_targets_one_connection() {
        let h = harness();
        let (a_id, mut a) = join(&h, "same", Role::User, None);
        let (_, mut b) = join(&h, "same", Role::User, None);

        let msg = Message::error("order", "MISSING_IDENTITY", "user order requires user_id");
        h.broadcaster.reply(&a_id, &msg).await.unwrap();
        assert_eq!(next(&mut a), Some(msg));
        assert!(next(&mut b).is_none());
    }
}
