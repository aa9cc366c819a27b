//! Wire types exchanged with clients.
//!
//! Every frame is a JSON object `{type, action, payload, role, roomId}`. The
//! payload shape depends on `(type, action)`; route handlers decode it into
//! the typed structs below at their own boundary.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tableside_core::Role;

use crate::errors::ProtocolError;

/// Known values of [`Message::kind`].
pub mod kind {
    /// A customer order notice, relayed to the kitchen.
    pub const ORDER: &str = "order";
    /// Notifications; `order_status` is room-scoped.
    pub const NOTIFICATION: &str = "notification";
    /// Relayed verbatim to every session.
    pub const STATUS_UPDATE: &str = "status_update";
    /// Point-to-point messages and direct orders.
    pub const DIRECT: &str = "direct";
    /// Delivery tracking updates.
    pub const DELIVERY: &str = "delivery";
    /// Error notices sent back to a sender.
    pub const ERROR: &str = "error";
}

/// Known values of [`Message::action`].
pub mod action {
    /// Kitchen and staff notification of a new order.
    pub const NEW_ORDER: &str = "new_order";
    /// Order status change for one table.
    pub const ORDER_STATUS: &str = "order_status";
    /// Direct message carrying an order to create.
    pub const ORDER: &str = "order";
    /// Acknowledgement sent to the author of a direct order.
    pub const ORDER_CREATED: &str = "order_created";
}

/// One frame of the hub protocol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message family (`order`, `notification`, `direct`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Sub-kind within the family.
    #[serde(default)]
    pub action: String,
    /// Schema depends on `(kind, action)`.
    #[serde(default)]
    pub payload: Value,
    /// Target-role hint. Informational only; routes pick their audience.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_role"
    )]
    pub role: Option<Role>,
    /// Room the message concerns.
    #[serde(
        rename = "roomId",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub room_id: Option<String>,
}

impl Message {
    /// Build a message with no role hint and no room.
    pub fn new(kind: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            payload,
            role: None,
            room_id: None,
        }
    }

    /// Set the role hint.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the room.
    #[must_use]
    pub fn with_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Error notice answering a failed request.
    pub fn error(action: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self::new(
            kind::ERROR,
            action,
            serde_json::json!({ "code": code, "message": message.into() }),
        )
    }

    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode one binary frame, which must hold UTF-8 JSON.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NonUtf8)?;
        Self::decode(text)
    }

    /// `type/action`, for logs and error reports.
    pub fn route(&self) -> String {
        format!("{}/{}", self.kind, self.action)
    }

    /// Decode the payload into a route-specific type.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Point-to-point message, carried as the payload of a `direct` message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    /// Session id of the author.
    #[serde(
        default,
        alias = "fromSessionId",
        alias = "from_user_id",
        deserialize_with = "id_string"
    )]
    pub from_user_id: String,
    /// Session id of the recipient.
    #[serde(
        default,
        alias = "toSessionId",
        alias = "to_user_id",
        deserialize_with = "id_string"
    )]
    pub to_user_id: String,
    /// Optional constraint on the recipient's role.
    #[serde(
        default,
        alias = "to_role",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_role"
    )]
    pub to_role: Option<Role>,
    /// Inner message type.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Inner action.
    #[serde(default)]
    pub action: String,
    /// Inner payload.
    #[serde(default)]
    pub payload: Value,
}

/// Order notice broadcast to the kitchen for `type = "order"` messages.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderNotice {
    /// Order identifier.
    pub order_id: i64,
    /// Guest author, for guest orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<i64>,
    /// User author, for user orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    /// Table the order is for.
    pub table_number: i64,
    /// Whether a guest placed the order.
    pub is_guest: bool,
    /// Table access token.
    pub table_token: String,
    /// Order total.
    pub total_price: i64,
    /// Bowls with chili.
    pub bow_chili: i64,
    /// Bowls without chili.
    pub bow_no_chili: i64,
    /// Take-away order.
    pub take_away: bool,
    /// Chili portions.
    pub chili_number: i64,
    /// Display name of the order.
    pub order_name: String,
}

/// Delivery tracking update, published through the delivery feed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdate {
    /// Update kind (`assigned`, `picked_up`, ...).
    pub action: String,
    /// Delivery identifier.
    pub delivery_id: String,
    /// Free-form detail.
    #[serde(default)]
    pub payload: Value,
}

/// Unknown or empty roles decode as `None` rather than failing the frame.
fn lenient_role<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Role>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok()))
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

/// Session ids arrive as strings or bare numbers.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_full_message() {
        let msg = Message::decode(
            r#"{"type":"notification","action":"order_status","payload":{"id":1},"role":"Kitchen","roomId":"table-5"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, "notification");
        assert_eq!(msg.action, "order_status");
        assert_eq!(msg.payload, json!({"id": 1}));
        assert_eq!(msg.role, Some(Role::Kitchen));
        assert_eq!(msg.room_id.as_deref(), Some("table-5"));
    }

    #[test]
    fn empty_role_and_room_are_absent() {
        let msg = Message::decode(r#"{"type":"status_update","role":"","roomId":""}"#).unwrap();
        assert_eq!(msg.role, None);
        assert_eq!(msg.room_id, None);
        assert_eq!(msg.payload, Value::Null);
        assert_eq!(msg.action, "");
    }

    #[test]
    fn unknown_role_does_not_fail_the_frame() {
        let msg = Message::decode(r#"{"type":"order","role":"Chef"}"#).unwrap();
        assert_eq!(msg.role, None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert_matches!(Message::decode("{not json"), Err(ProtocolError::Json(_)));
        assert_matches!(Message::decode("[1,2]"), Err(ProtocolError::Json(_)));
    }

    #[test]
    fn non_utf8_binary_is_an_error() {
        assert_matches!(
            Message::decode_bytes(&[0xff, 0xfe]),
            Err(ProtocolError::NonUtf8)
        );
    }

    #[test]
    fn serialization_omits_absent_fields() {
        let msg = Message::new(kind::STATUS_UPDATE, "busy", json!(null));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "status_update", "action": "busy", "payload": null}));
    }

    #[test]
    fn serialization_uses_wire_names() {
        let msg = Message::new(kind::NOTIFICATION, action::NEW_ORDER, json!({}))
            .with_role(Role::Kitchen)
            .with_room("table-1");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "Kitchen");
        assert_eq!(value["roomId"], "table-1");
    }

    #[test]
    fn error_notice_shape() {
        let msg = Message::error("order", "MISSING_IDENTITY", "guest order requires guest_id");
        assert_eq!(msg.kind, kind::ERROR);
        assert_eq!(msg.action, "order");
        assert_eq!(msg.payload["code"], "MISSING_IDENTITY");
    }

    #[test]
    fn direct_message_accepts_numeric_and_aliased_ids() {
        let direct: DirectMessage = serde_json::from_value(json!({
            "fromSessionId": 12,
            "to_user_id": "34",
            "type": "chat",
            "action": "hello",
            "payload": {"text": "hi"}
        }))
        .unwrap();
        assert_eq!(direct.from_user_id, "12");
        assert_eq!(direct.to_user_id, "34");
        assert_eq!(direct.to_role, None);
        assert_eq!(direct.payload["text"], "hi");
    }

    #[test]
    fn direct_message_serializes_camel_case() {
        let direct = DirectMessage {
            from_user_id: "1".into(),
            to_user_id: "2".into(),
            kind: "chat".into(),
            action: "ping".into(),
            ..DirectMessage::default()
        };
        let value = serde_json::to_value(&direct).unwrap();
        assert_eq!(value["fromUserId"], "1");
        assert_eq!(value["toUserId"], "2");
        assert!(value.get("toRole").is_none());
    }

    #[test]
    fn order_notice_tolerates_missing_fields() {
        let notice: OrderNotice =
            serde_json::from_value(json!({"orderId": 5, "tableNumber": 3})).unwrap();
        assert_eq!(notice.order_id, 5);
        assert_eq!(notice.table_number, 3);
        assert!(!notice.is_guest);
        assert_eq!(notice.guest_id, None);
    }

    #[test]
    fn payload_as_decodes_typed() {
        let msg = Message::new(kind::DIRECT, "chat", json!({"toUserId": "9"}));
        let direct: DirectMessage = msg.payload_as().unwrap();
        assert_eq!(direct.to_user_id, "9");
    }
}
