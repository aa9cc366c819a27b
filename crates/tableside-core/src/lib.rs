//! # tableside-core
//!
//! Shared vocabulary for the tableside realtime hub:
//!
//! - **Roles**: [`Role`] and [`RoleSet`], including the staff set
//! - **Branded IDs**: [`ConnectionId`] distinguishes one live connection from
//!   another even when two sockets share a client-supplied session id
//! - **Logging**: global `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod role;

pub use ids::ConnectionId;
pub use logging::{LogFormat, init_subscriber};
pub use role::{Role, RoleParseError, RoleSet};
