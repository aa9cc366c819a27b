//! Typed order-creation request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payload::Fields;
use crate::errors::{BridgeError, IdentityKind};

/// Status every new order starts in.
pub const INITIAL_STATUS: &str = "pending";

/// One dish line item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDish {
    /// Dish identifier.
    pub dish_id: i64,
    /// Portions ordered.
    pub quantity: i64,
}

/// One set-menu line item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSet {
    /// Set identifier.
    pub set_id: i64,
    /// Sets ordered.
    pub quantity: i64,
}

/// Order-creation request as the order service expects it (snake_case JSON).
///
/// Exactly one of `guest_id` / `user_id` is non-zero, selected by `is_guest`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreateRequest {
    /// Guest author; zero for user orders.
    pub guest_id: i64,
    /// User author; zero for guest orders.
    pub user_id: i64,
    /// Selects which identifier is required.
    pub is_guest: bool,
    /// Table the order is for.
    pub table_number: i64,
    /// Staff member handling the order.
    pub order_handler_id: i64,
    /// Always [`INITIAL_STATUS`] on creation.
    pub status: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time; equal to `created_at` on creation.
    pub updated_at: DateTime<Utc>,
    /// Order total.
    pub total_price: i64,
    /// Dish line items.
    pub dish_items: Vec<OrderDish>,
    /// Set-menu line items.
    pub set_items: Vec<OrderSet>,
    /// Take-away order.
    pub take_away: bool,
    /// Chili portions.
    pub chili_number: i64,
    /// Bowls with chili.
    pub bow_chili: i64,
    /// Bowls without chili.
    pub bow_no_chili: i64,
    /// Table access token.
    pub table_token: String,
    /// Display name of the order.
    pub order_name: String,
}

impl OrderCreateRequest {
    /// Decode a client order payload.
    ///
    /// Every field accepts its snake_case and camelCase spelling. `now`
    /// stamps both timestamps.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidPayload`] if `payload` is not an object, and
    /// [`BridgeError::MissingIdentity`] if the identifier required by
    /// `is_guest` is zero or absent.
    pub fn from_payload(payload: &Value, now: DateTime<Utc>) -> Result<Self, BridgeError> {
        let map = payload.as_object().ok_or_else(|| {
            BridgeError::InvalidPayload(format!("expected an object, got {}", json_kind(payload)))
        })?;
        let f = Fields::new(map);

        let is_guest = f.flag(&["is_guest", "isGuest"]);
        let (guest_id, user_id) = if is_guest {
            (f.int(&["guest_id", "guestId"]), 0)
        } else {
            (0, f.int(&["user_id", "userId"]))
        };
        if is_guest && guest_id == 0 {
            return Err(BridgeError::MissingIdentity(IdentityKind::Guest));
        }
        if !is_guest && user_id == 0 {
            return Err(BridgeError::MissingIdentity(IdentityKind::User));
        }

        let dish_items = f
            .objects(&["dish_items", "dishItems"])
            .map(|item| OrderDish {
                dish_id: item.int(&["dish_id", "dishId"]),
                quantity: item.int(&["quantity"]),
            })
            .collect();
        let set_items = f
            .objects(&["set_items", "setItems"])
            .map(|item| OrderSet {
                set_id: item.int(&["set_id", "setId"]),
                quantity: item.int(&["quantity"]),
            })
            .collect();

        Ok(Self {
            guest_id,
            user_id,
            is_guest,
            table_number: f.int(&["table_number", "tableNumber"]),
            order_handler_id: f.int(&["order_handler_id", "orderHandlerId"]),
            status: INITIAL_STATUS.to_string(),
            created_at: now,
            updated_at: now,
            total_price: f.int(&["total_price", "totalPrice"]),
            dish_items,
            set_items,
            take_away: f.flag(&["take_away", "takeAway"]),
            chili_number: f.int(&["chili_number", "chiliNumber"]),
            bow_chili: f.int(&["bow_chili", "bowChili"]),
            bow_no_chili: f.int(&["bow_no_chili", "bowNoChili"]),
            table_token: f.text(&["table_token", "tableToken", "Table_token"]),
            order_name: f.text(&["order_name", "orderName"]),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
