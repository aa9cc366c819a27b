//! [`Connection`] for axum WebSockets.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt, future};

use super::{Connection, Frame, FrameSink, FrameStream};
use crate::errors::TransportError;

impl From<Frame> for WsMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Ping(bytes) => WsMessage::Ping(bytes.into()),
            Frame::Pong(bytes) => WsMessage::Pong(bytes.into()),
            Frame::Close => WsMessage::Close(None),
        }
    }
}

impl From<WsMessage> for Frame {
    fn from(msg: WsMessage) -> Self {
        match msg {
            WsMessage::Text(text) => Frame::Text(text.to_string()),
            WsMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
            WsMessage::Ping(bytes) => Frame::Ping(bytes.to_vec()),
            WsMessage::Pong(bytes) => Frame::Pong(bytes.to_vec()),
            WsMessage::Close(_) => Frame::Close,
        }
    }
}

impl Connection for WebSocket {
    fn split(self) -> (FrameSink, FrameStream) {
        let (tx, rx) = StreamExt::split::<WsMessage>(self);
        let sink = tx
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(WsMessage::from(frame))));
        let stream = rx.map(|item| {
            item.map(Frame::from)
                .map_err(|e| TransportError::Io(e.to_string()))
        });
        (Box::pin(sink), Box::pin(stream))
    }
}
