//! Error types for the hub.
//!
//! Transport errors end one session. Protocol errors drop one frame. Hub,
//! bridge and dispatch errors are returned to the caller that asked for the
//! delivery and never stop the registry.

use tableside_core::RoleSet;

// ── Error code constants ────────────────────────────────────────────

/// No live session matched a direct-message target.
pub const RECIPIENT_NOT_FOUND: &str = "RECIPIENT_NOT_FOUND";
/// A role-filtered fan-out reached nobody.
pub const NO_RECIPIENTS: &str = "NO_RECIPIENTS";
/// The recipient's queue was full and it was evicted.
pub const BACKPRESSURE: &str = "BACKPRESSURE";
/// The registry owner task is gone.
pub const REGISTRY_CLOSED: &str = "REGISTRY_CLOSED";
/// Serializing an outbound message failed.
pub const ENCODE_ERROR: &str = "ENCODE_ERROR";
/// The payload did not have the expected shape.
pub const INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
/// A guest or user order lacked its identifier.
pub const MISSING_IDENTITY: &str = "MISSING_IDENTITY";
/// The order service did not answer in time.
pub const DOWNSTREAM_TIMEOUT: &str = "DOWNSTREAM_TIMEOUT";
/// The order service answered with something other than "created".
pub const ORDER_REJECTED: &str = "ORDER_REJECTED";
/// The order service call failed.
pub const DOWNSTREAM_ERROR: &str = "DOWNSTREAM_ERROR";

/// Failure of the underlying duplex connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer or the local side closed the connection.
    #[error("connection closed")]
    Closed,
    /// A frame write exceeded the write deadline.
    #[error("write deadline exceeded")]
    WriteTimeout,
    /// Any other I/O or protocol failure reported by the transport.
    #[error("transport error: {0}")]
    Io(String),
}

/// A frame that could not be decoded into a [`Message`](crate::protocol::Message).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Not valid JSON, or JSON of the wrong shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// A binary frame that is not UTF-8 text.
    #[error("binary frame is not valid UTF-8")]
    NonUtf8,
}

/// Delivery failures reported by the registry.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// No live session carries the requested id.
    #[error("recipient {session_id} not found")]
    RecipientNotFound {
        /// The addressed session id.
        session_id: String,
    },

    /// A role-filtered fan-out had nobody to deliver to.
    #[error("no recipients available for {roles}")]
    NoRecipients {
        /// The role filter that matched nothing.
        roles: RoleSet,
    },

    /// The target's queue was full; it has been evicted.
    #[error("recipient {target} could not keep up and was evicted")]
    Backpressure {
        /// Session id or connection id of the recipient.
        target: String,
    },

    /// The registry owner task has stopped.
    #[error("registry is shut down")]
    RegistryClosed,

    /// A message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HubError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecipientNotFound { .. } => RECIPIENT_NOT_FOUND,
            Self::NoRecipients { .. } => NO_RECIPIENTS,
            Self::Backpressure { .. } => BACKPRESSURE,
            Self::RegistryClosed => REGISTRY_CLOSED,
            Self::Encode(_) => ENCODE_ERROR,
        }
    }
}

/// Failure reported by an [`OrderService`](crate::order::OrderService).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderServiceError {
    /// The request never got a response.
    #[error("order service unreachable: {0}")]
    Transport(String),
    /// The response body could not be read.
    #[error("order service returned an unreadable body: {0}")]
    Decode(String),
}

/// Which identifier an order was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// `guest_id` for guest orders.
    Guest,
    /// `user_id` for user orders.
    User,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Guest => "guest order requires guest_id",
            Self::User => "user order requires user_id",
        })
    }
}

/// Failures of the order bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The payload was not a key/value map.
    #[error("invalid order payload: {0}")]
    InvalidPayload(String),

    /// The identity precondition failed.
    #[error("{0}")]
    MissingIdentity(IdentityKind),

    /// The order service did not answer within the deadline.
    #[error("order service timed out after {timeout_ms}ms")]
    DownstreamTimeout {
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// The order service answered without creating the order.
    #[error("order not created (status {status}): {reason}")]
    Rejected {
        /// Status reported by the service.
        status: u16,
        /// Body or reason text.
        reason: String,
    },

    /// The order service call failed.
    #[error(transparent)]
    Downstream(#[from] OrderServiceError),
}

impl BridgeError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => INVALID_PAYLOAD,
            Self::MissingIdentity(_) => MISSING_IDENTITY,
            Self::DownstreamTimeout { .. } => DOWNSTREAM_TIMEOUT,
            Self::Rejected { .. } => ORDER_REJECTED,
            Self::Downstream(_) => DOWNSTREAM_ERROR,
        }
    }
}

/// Failure of a route handler.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The message payload did not decode into the route's payload type.
    #[error("invalid payload for {route}: {source}")]
    Payload {
        /// `type/action` of the message.
        route: String,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Fan-out or direct delivery failed.
    #[error(transparent)]
    Hub(#[from] HubError),

    /// Order creation failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl DispatchError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Payload { .. } => INVALID_PAYLOAD,
            Self::Hub(err) => err.code(),
            Self::Bridge(err) => err.code(),
        }
    }
}
