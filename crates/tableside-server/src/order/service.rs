//! The external order service seam and its HTTP client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::request::OrderCreateRequest;
use crate::errors::OrderServiceError;

/// An order as stored by the order service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Order identifier.
    #[serde(alias = "order_id", alias = "orderId")]
    pub id: i64,
    /// Status after creation.
    #[serde(default)]
    pub status: String,
}

/// What the order service did with a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The order exists.
    Created(OrderRecord),
    /// The service answered but did not create the order.
    Rejected {
        /// Status code reported by the service.
        status: u16,
        /// Response body or reason text.
        reason: String,
    },
}

/// Creates orders. Timeouts are the caller's concern.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Submit one order.
    async fn create_order(
        &self,
        request: &OrderCreateRequest,
    ) -> Result<CreateOutcome, OrderServiceError>;
}

/// [`OrderService`] over HTTP: `POST` the request as JSON, `201 Created`
/// answers with the stored order.
#[derive(Clone, Debug)]
pub struct HttpOrderService {
    client: reqwest::Client,
    create_url: String,
}

impl HttpOrderService {
    /// Client for the given create-order endpoint.
    #[must_use]
    pub fn new(create_url: impl Into<String>) -> Self {
        Self::with_client(create_url, reqwest::Client::new())
    }

    /// Client sharing an existing connection pool.
    #[must_use]
    pub fn with_client(create_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            create_url: create_url.into(),
        }
    }

    /// Endpoint orders are posted to.
    pub fn create_url(&self) -> &str {
        &self.create_url
    }
}

#[async_trait]
impl OrderService for HttpOrderService {
    async fn create_order(
        &self,
        request: &OrderCreateRequest,
    ) -> Result<CreateOutcome, OrderServiceError> {
        let response = self
            .client
            .post(&self.create_url)
            .json(request)
            .send()
            .await
            .map_err(|e| OrderServiceError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(url = %self.create_url, status = status.as_u16(), "order service answered");
        if status != StatusCode::CREATED {
            let reason = response.text().await.unwrap_or_default();
            return Ok(CreateOutcome::Rejected {
                status: status.as_u16(),
                reason,
            });
        }
        let record = response
            .json::<OrderRecord>()
            .await
            .map_err(|e| OrderServiceError::Decode(e.to_string()))?;
        Ok(CreateOutcome::Created(record))
    }
}
