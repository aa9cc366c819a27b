//! Route table from `(type, action)` to a [`MessageHandler`].
//!
//! Lookup tries the exact pair, then the `(type, "*")` wildcard, then falls
//! back to a no-op. Unknown traffic is never an error. A failing handler has
//! its error turned into an `error` notice for the sender.

mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, instrument, warn};

pub use handlers::{DirectOrderRoute, DirectSendRoute, KitchenOrderRoute, NoOp, OrderStatusRoute, StatusUpdateRoute};

use crate::broadcast::Broadcaster;
use crate::errors::DispatchError;
use crate::metrics::WS_MESSAGES_DISPATCHED_TOTAL;
use crate::order::OrderBridge;
use crate::protocol::{Message, action, kind};
use crate::session::SessionInfo;

/// Action pattern matching any action of a type.
pub const WILDCARD: &str = "*";

/// Handles one routed message on behalf of its sender.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process `message`, sent by `sender`.
    async fn handle(&self, sender: &SessionInfo, message: Message) -> Result<(), DispatchError>;
}

/// Routes decoded messages to their handlers.
pub struct Dispatcher {
    routes: HashMap<String, HashMap<String, Arc<dyn MessageHandler>>>,
    fallback: Arc<dyn MessageHandler>,
    broadcaster: Broadcaster,
}

impl Dispatcher {
    /// Empty table; everything falls through to the no-op.
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            routes: HashMap::new(),
            fallback: Arc::new(NoOp),
            broadcaster,
        }
    }

    /// Table with the hub's standard routes.
    pub fn with_default_routes(broadcaster: Broadcaster, bridge: Arc<OrderBridge>) -> Self {
        let mut dispatcher = Self::new(broadcaster.clone());
        dispatcher.register(kind::ORDER, WILDCARD, KitchenOrderRoute::new(broadcaster.clone()));
        dispatcher.register(
            kind::NOTIFICATION,
            action::ORDER_STATUS,
            OrderStatusRoute::new(broadcaster.clone()),
        );
        dispatcher.register(kind::STATUS_UPDATE, WILDCARD, StatusUpdateRoute::new(broadcaster.clone()));
        dispatcher.register(
            kind::DIRECT,
            action::ORDER,
            DirectOrderRoute::new(broadcaster.clone(), bridge),
        );
        dispatcher.register(kind::DIRECT, WILDCARD, DirectSendRoute::new(broadcaster));
        dispatcher
    }

    /// Register `handler` for `(kind, action)`; [`WILDCARD`] matches any action.
    /// A later registration for the same pair replaces the earlier one.
    pub fn register(&mut self, kind: &str, action: &str, handler: impl MessageHandler + 'static) {
        let _ = self
            .routes
            .entry(kind.to_owned())
            .or_default()
            .insert(action.to_owned(), Arc::new(handler));
    }

    /// All registered routes as `type/action`, sorted.
    pub fn routes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .routes
            .iter()
            .flat_map(|(kind, actions)| actions.keys().map(move |a| format!("{kind}/{a}")))
            .collect();
        names.sort();
        names
    }

    fn resolve(&self, kind: &str, action: &str) -> Option<&Arc<dyn MessageHandler>> {
        let actions = self.routes.get(kind)?;
        actions.get(action).or_else(|| actions.get(WILDCARD))
    }

    /// Route one message. Never fails; handler errors are reported back to
    /// the sender as an `error` notice.
    #[instrument(skip_all, fields(msg_type = %message.kind, action = %message.action))]
    pub async fn dispatch(&self, sender: &SessionInfo, message: Message) {
        let handler = match self.resolve(&message.kind, &message.action) {
            Some(handler) => {
                counter!(WS_MESSAGES_DISPATCHED_TOTAL, "type" => message.kind.clone()).increment(1);
                handler
            }
            None => {
                counter!(WS_MESSAGES_DISPATCHED_TOTAL, "type" => "unrouted").increment(1);
                debug!("no route, ignoring");
                &self.fallback
            }
        };

        let reply_action = message.action.clone();
        let Err(error) = handler.handle(sender, message).await else {
            return;
        };
        warn!(code = error.code(), error = %error, "handler failed");
        let notice = Message::error(reply_action, error.code(), error.to_string());
        if let Err(e) = self.broadcaster.reply(&sender.connection_id, &notice).await {
            debug!(error = %e, "could not report failure to sender");
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.routes())
            .finish_non_exhaustive()
    }
}
