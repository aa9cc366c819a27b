//! In-memory [`Connection`] pair.
//!
//! The hub side behaves like an upgraded socket; the [`MemoryPeer`] side plays
//! the client. Used by the test suites and by embedders that bridge other
//! transports into the hub.

use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};

use super::{Connection, Frame, FrameSink, FrameStream};
use crate::errors::TransportError;
use crate::protocol::Message;

/// Hub side of an in-memory connection.
pub struct MemoryConnection {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
}

/// Client side of an in-memory connection.
pub struct MemoryPeer {
    to_hub: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_hub: mpsc::UnboundedReceiver<Frame>,
}

/// Create a connected pair.
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    let (to_hub, inbound) = mpsc::unbounded();
    let (outbound, from_hub) = mpsc::unbounded();
    (
        MemoryConnection { inbound, outbound },
        MemoryPeer { to_hub, from_hub },
    )
}

impl Connection for MemoryConnection {
    fn split(self) -> (FrameSink, FrameStream) {
        let sink = self.outbound.sink_map_err(|_| TransportError::Closed);
        (Box::pin(sink), Box::pin(self.inbound))
    }
}

impl MemoryPeer {
    /// Send a raw frame to the hub. Returns `false` once the hub side is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_hub.unbounded_send(Ok(frame)).is_ok()
    }

    /// Send a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Serialize and send a protocol message.
    pub fn send_message(&self, message: &Message) -> bool {
        serde_json::to_string(message).is_ok_and(|text| self.send_text(text))
    }

    /// Make the hub's next read fail with `error`.
    pub fn fail(&self, error: TransportError) -> bool {
        self.to_hub.unbounded_send(Err(error)).is_ok()
    }

    /// End the hub's inbound stream, as a vanished peer would.
    pub fn disconnect(&self) {
        self.to_hub.close_channel();
    }

    /// Next frame written by the hub, or `None` once the hub closed its side.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_hub.next().await
    }

    /// Next protocol message, skipping keepalive frames. `None` on close.
    pub async fn recv_message(&mut self) -> Option<Message> {
        loop {
            match self.recv().await? {
                Frame::Text(text) => return Message::decode(&text).ok(),
                Frame::Binary(bytes) => return Message::decode_bytes(&bytes).ok(),
                Frame::Ping(_) | Frame::Pong(_) => {}
                Frame::Close => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (conn, mut peer) = pair();
        let (mut sink, mut stream) = conn.split();

        assert!(peer.send_text("hi"));
        assert_eq!(stream.next().await, Some(Ok(Frame::Text("hi".into()))));

        sink.send(Frame::Ping(Vec::new())).await.unwrap();
        sink.send(Frame::Text(r#"{"type":"x"}"#.into())).await.unwrap();
        let msg = peer.recv_message().await.unwrap();
        assert_eq!(msg.kind, "x");
    }

    #[tokio::test]
    async fn disconnect_ends_inbound_stream() {
        let (conn, peer) = pair();
        let (_sink, mut stream) = conn.split();
        peer.disconnect();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn closing_sink_ends_peer_reads() {
        let (conn, mut peer) = pair();
        let (mut sink, _stream) = conn.split();
        sink.close().await.unwrap();
        assert_eq!(peer.recv().await, None);
    }

    #[tokio::test]
    async fn fail_surfaces_transport_error() {
        let (conn, peer) = pair();
        let (_sink, mut stream) = conn.split();
        assert!(peer.fail(TransportError::Io("reset".into())));
        assert_eq!(
            stream.next().await,
            Some(Err(TransportError::Io("reset".into())))
        );
    }

    #[tokio::test]
    async fn send_message_serializes() {
        let (conn, peer) = pair();
        let (_sink, mut stream) = conn.split();
        let msg = Message::new("status_update", "open", json!({"tables": 4}));
        assert!(peer.send_message(&msg));
        let Some(Ok(Frame::Text(text))) = stream.next().await else {
            panic!("expected text frame");
        };
        assert_eq!(Message::decode(&text).unwrap(), msg);
    }
}
