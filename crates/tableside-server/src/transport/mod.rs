//! Duplex, message-framed connections.
//!
//! The hub never touches a socket type directly. A [`Connection`] splits into
//! a frame sink (driven only by the session's outbound pump) and a frame
//! stream (driven only by its inbound pump).

pub mod memory;
mod websocket;

use std::pin::Pin;

use futures::{Sink, Stream};

use crate::errors::TransportError;

/// One transport-level frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Keepalive probe.
    Ping(Vec<u8>),
    /// Keepalive answer.
    Pong(Vec<u8>),
    /// Orderly close.
    Close,
}

/// Write half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Read half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An established duplex connection handed over by the upgrade layer.
pub trait Connection: Send + 'static {
    /// Separate the connection into independently owned halves.
    fn split(self) -> (FrameSink, FrameStream);
}
