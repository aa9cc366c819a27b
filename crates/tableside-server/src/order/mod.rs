//! Order bridge: loosely-typed order payloads in, created orders out.
//!
//! [`OrderCreateRequest::from_payload`] is the only place that knows about
//! field aliases and lenient number coercion. Everything past it works on the
//! typed request.

mod bridge;
mod payload;
mod request;
mod service;

pub use bridge::OrderBridge;
pub use request::{INITIAL_STATUS, OrderCreateRequest, OrderDish, OrderSet};
pub use service::{CreateOutcome, HttpOrderService, OrderRecord, OrderService};

#[cfg(test)]
pub use service::MockOrderService;
