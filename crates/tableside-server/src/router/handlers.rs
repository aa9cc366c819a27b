//! The hub's standard routes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tableside_core::Role;
use tracing::{debug, info, warn};

use super::MessageHandler;
use crate::broadcast::Broadcaster;
use crate::errors::{DispatchError, HubError};
use crate::order::OrderBridge;
use crate::protocol::{DirectMessage, Message, OrderNotice, action, kind};
use crate::session::SessionInfo;

/// Decode the payload for this route. A missing payload decodes like `{}`.
fn payload<T: DeserializeOwned>(message: &Message) -> Result<T, DispatchError> {
    let decoded = if message.payload.is_null() {
        T::deserialize(Value::Object(Map::new()))
    } else {
        message.payload_as()
    };
    decoded.map_err(|source| DispatchError::Payload {
        route: message.route(),
        source,
    })
}

/// Routing miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

#[async_trait]
impl MessageHandler for NoOp {
    async fn handle(&self, _sender: &SessionInfo, _message: Message) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// `order/*`: relay the notice to the kitchen as `notification/new_order`.
#[derive(Debug, Clone)]
pub struct KitchenOrderRoute {
    broadcaster: Broadcaster,
}

impl KitchenOrderRoute {
    /// Route fanning out through `broadcaster`.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MessageHandler for KitchenOrderRoute {
    async fn handle(&self, sender: &SessionInfo, message: Message) -> Result<(), DispatchError> {
        let notice: OrderNotice = payload(&message)?;
        let notification = Message::new(
            kind::NOTIFICATION,
            action::NEW_ORDER,
            serde_json::to_value(&notice).map_err(HubError::from)?,
        );
        let delivery = self.broadcaster.to_role(Role::Kitchen, notification).await?;
        info!(
            order_id = notice.order_id,
            table = notice.table_number,
            from = %sender.session_id,
            recipients = delivery.delivered,
            "order relayed to kitchen"
        );
        Ok(())
    }
}

/// `notification/order_status`: fan out to the message's room.
#[derive(Debug, Clone)]
pub struct OrderStatusRoute {
    broadcaster: Broadcaster,
}

impl OrderStatusRoute {
    /// Route fanning out through `broadcaster`.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MessageHandler for OrderStatusRoute {
    async fn handle(&self, _sender: &SessionInfo, message: Message) -> Result<(), DispatchError> {
        let Some(room_id) = message.room_id.clone() else {
            debug!("order status without roomId, ignoring");
            return Ok(());
        };
        let _ = self.broadcaster.to_room(&room_id, &message).await?;
        Ok(())
    }
}

/// `status_update/*`: relay verbatim to everyone.
#[derive(Debug, Clone)]
pub struct StatusUpdateRoute {
    broadcaster: Broadcaster,
}

impl StatusUpdateRoute {
    /// Route fanning out through `broadcaster`.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MessageHandler for StatusUpdateRoute {
    async fn handle(&self, _sender: &SessionInfo, message: Message) -> Result<(), DispatchError> {
        let _ = self.broadcaster.broadcast(&message).await?;
        Ok(())
    }
}

/// `direct/order`: create the order, then notify staff and acknowledge.
///
/// Nothing is broadcast unless the order service created the order. When no
/// staff member is online the order still stands; the acknowledgement then
/// reports zero recipients.
#[derive(Debug, Clone)]
pub struct DirectOrderRoute {
    broadcaster: Broadcaster,
    bridge: Arc<OrderBridge>,
}

impl DirectOrderRoute {
    /// Route creating orders through `bridge`.
    pub fn new(broadcaster: Broadcaster, bridge: Arc<OrderBridge>) -> Self {
        Self {
            broadcaster,
            bridge,
        }
    }
}

#[async_trait]
impl MessageHandler for DirectOrderRoute {
    async fn handle(&self, sender: &SessionInfo, message: Message) -> Result<(), DispatchError> {
        let direct: DirectMessage = payload(&message)?;
        let record = self.bridge.create_order_from_payload(&direct.payload).await?;

        // The registered identity, not the client-supplied `fromUserId`.
        let from = sender.session_id.as_str();
        if !direct.from_user_id.is_empty() && direct.from_user_id != from {
            debug!(claimed = %direct.from_user_id, from, "ignoring fromUserId on direct order");
        }
        let staff_message = Message::new(kind::ORDER, action::NEW_ORDER, direct.payload.clone());
        let recipients = match self.broadcaster.to_staff(from, staff_message).await {
            Ok(delivery) => delivery.delivered,
            Err(HubError::NoRecipients { .. }) => {
                warn!(order_id = record.id, "order created but no staff online");
                0
            }
            Err(e) => return Err(e.into()),
        };

        let ack = Message::new(
            kind::DIRECT,
            action::ORDER_CREATED,
            json!({ "orderId": record.id, "recipients": recipients }),
        );
        self.broadcaster.reply(&sender.connection_id, &ack).await?;
        Ok(())
    }
}

/// `direct/*`: point-to-point delivery to `toUserId`.
#[derive(Debug, Clone)]
pub struct DirectSendRoute {
    broadcaster: Broadcaster,
}

impl DirectSendRoute {
    /// Route delivering through `broadcaster`.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MessageHandler for DirectSendRoute {
    async fn handle(&self, sender: &SessionInfo, message: Message) -> Result<(), DispatchError> {
        let mut direct: DirectMessage = payload(&message)?;
        if direct.from_user_id.is_empty() {
            direct.from_user_id.clone_from(&sender.session_id);
        }
        if direct.action.is_empty() {
            direct.action.clone_from(&message.action);
        }
        let _ = self.broadcaster.direct(&direct).await?;
        Ok(())
    }
}
