//! # tableside-server
//!
//! Realtime connection hub for a restaurant floor: guests, users, kitchen,
//! employees and admins hold long-lived WebSocket sessions and receive pushes
//! with different fan-out scopes.
//!
//! - **Registry**: single owner task for live sessions and the room index;
//!   non-blocking delivery that evicts slow consumers
//! - **Sessions**: inbound and outbound pumps per connection, with keepalive
//! - **Router**: `(type, action)` route table with a no-op fallback
//! - **Broadcaster**: room, role, staff and direct fan-out
//! - **Order bridge**: tolerant order payload decoding and a bounded call to
//!   the order service
//! - **Server**: axum upgrade surface, health, delivery feed, metrics and
//!   graceful shutdown

#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod order;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod transport;

pub use broadcast::Broadcaster;
pub use config::{HubConfig, KeepaliveConfig, SessionConfig};
pub use delivery::DeliveryFeed;
pub use registry::{Audience, Delivery, Registry};
pub use router::{Dispatcher, MessageHandler};
pub use server::HubServer;
pub use session::{CloseReason, Credentials, SessionInfo, run_session};
