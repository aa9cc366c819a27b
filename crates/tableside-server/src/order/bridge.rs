//! Payload in, created order out, bounded by a deadline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::time;
use tracing::{info, instrument, warn};

use super::request::OrderCreateRequest;
use super::service::{CreateOutcome, OrderRecord, OrderService};
use crate::errors::BridgeError;
use crate::metrics::{ORDER_SERVICE_DURATION_SECONDS, ORDERS_BRIDGED_TOTAL};

/// Turns client order payloads into orders via an [`OrderService`].
///
/// The bridge never retries. A failed or timed-out call leaves retrying to
/// the client.
#[derive(Clone)]
pub struct OrderBridge {
    service: Arc<dyn OrderService>,
    timeout: Duration,
}

impl std::fmt::Debug for OrderBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBridge")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OrderBridge {
    /// Bridge to `service`, giving each call at most `timeout`.
    pub fn new(service: Arc<dyn OrderService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Decode `payload` and create the order.
    ///
    /// Validation failures return before the order service is contacted.
    #[instrument(skip_all)]
    pub async fn create_order_from_payload(
        &self,
        payload: &Value,
    ) -> Result<OrderRecord, BridgeError> {
        let request = OrderCreateRequest::from_payload(payload, Utc::now()).inspect_err(|e| {
            counter!(ORDERS_BRIDGED_TOTAL, "outcome" => "invalid").increment(1);
            warn!(code = e.code(), error = %e, "order payload rejected");
        })?;
        self.submit(&request).await
    }

    /// Send an already-validated request to the order service.
    #[instrument(skip_all, fields(is_guest = request.is_guest, table = request.table_number))]
    pub async fn submit(&self, request: &OrderCreateRequest) -> Result<OrderRecord, BridgeError> {
        let started = Instant::now();
        let result = time::timeout(self.timeout, self.service.create_order(request)).await;
        histogram!(ORDER_SERVICE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Err(_) => Err(BridgeError::DownstreamTimeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(e)) => Err(BridgeError::from(e)),
            Ok(Ok(CreateOutcome::Rejected { status, reason })) => {
                Err(BridgeError::Rejected { status, reason })
            }
            Ok(Ok(CreateOutcome::Created(record))) => Ok(record),
        };

        let label = match &outcome {
            Ok(_) => "created",
            Err(BridgeError::DownstreamTimeout { .. }) => "timeout",
            Err(BridgeError::Rejected { .. }) => "rejected",
            Err(_) => "error",
        };
        counter!(ORDERS_BRIDGED_TOTAL, "outcome" => label).increment(1);

        match &outcome {
            Ok(record) => info!(
                order_id = record.id,
                guest_id = request.guest_id,
                user_id = request.user_id,
                dishes = request.dish_items.len(),
                sets = request.set_items.len(),
                "order created"
            ),
            Err(e) => warn!(code = e.code(), error = %e, "order creation failed"),
        }
        outcome
    }
}
