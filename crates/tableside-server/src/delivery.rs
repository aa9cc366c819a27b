//! Delivery tracking feed.
//!
//! Producers hand [`DeliveryUpdate`]s to a bounded queue without waiting; one
//! background task turns each into a `delivery` message for every session.

use tableside_core::Role;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::Broadcaster;
use crate::errors::HubError;
use crate::protocol::{DeliveryUpdate, Message, kind};

/// Producer side of the delivery feed.
#[derive(Clone, Debug)]
pub struct DeliveryFeed {
    updates: mpsc::Sender<DeliveryUpdate>,
}

impl DeliveryFeed {
    /// Start the feed task. It stops on `cancel` or once every producer is
    /// dropped.
    pub fn spawn(
        broadcaster: Broadcaster,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (updates, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_feed(broadcaster, rx, cancel));
        (Self { updates }, task)
    }

    /// Queue an update.
    ///
    /// # Errors
    ///
    /// [`HubError::Backpressure`] if the queue is full, and
    /// [`HubError::RegistryClosed`] if the feed has stopped.
    pub fn publish(&self, update: DeliveryUpdate) -> Result<(), HubError> {
        self.updates.try_send(update).map_err(|e| match e {
            mpsc::error::TrySendError::Full(update) => {
                warn!(delivery_id = %update.delivery_id, "delivery feed full, dropping update");
                HubError::Backpressure {
                    target: "delivery feed".into(),
                }
            }
            mpsc::error::TrySendError::Closed(_) => HubError::RegistryClosed,
        })
    }
}

/// The broadcast form of an update. The payload is the whole update, so
/// clients see the delivery id alongside the detail.
fn to_message(update: DeliveryUpdate) -> Result<Message, HubError> {
    let action = update.action.clone();
    let payload = serde_json::to_value(update)?;
    Ok(Message::new(kind::DELIVERY, action, payload).with_role(Role::Employee))
}

#[instrument(skip_all, name = "delivery_feed")]
async fn run_feed(
    broadcaster: Broadcaster,
    mut updates: mpsc::Receiver<DeliveryUpdate>,
    cancel: CancellationToken,
) {
    info!("delivery feed started");
    loop {
        let update = tokio::select! {
            () = cancel.cancelled() => break,
            update = updates.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };
        let delivery_id = update.delivery_id.clone();
        let result = match to_message(update) {
            Ok(message) => broadcaster.broadcast(&message).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(delivery) => debug!(%delivery_id, recipients = delivery.delivered, "delivery update sent"),
            Err(e) => warn!(%delivery_id, error = %e, "delivery update not sent"),
        }
    }
    info!("delivery feed stopped");
}
