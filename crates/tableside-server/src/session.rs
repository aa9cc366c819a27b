//! Client sessions: one inbound pump, one outbound pump per connection.
//!
//! The inbound pump reads frames, decodes them and hands them to the
//! [`Dispatcher`]. The outbound pump is the only writer of the connection: it
//! drains the session's queue, pings the peer on a fixed interval, and writes
//! a close frame once the registry drops the queue.
//!
//! Whichever pump stops first takes the other one down. The session is
//! unregistered exactly once, after the inbound pump returns.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tableside_core::{ConnectionId, Role};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::config::{KeepaliveConfig, SessionConfig};
use crate::errors::TransportError;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DECODE_ERRORS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::protocol::Message;
use crate::registry::{OutboundFrame, Registry, SessionHandle};
use crate::router::Dispatcher;
use crate::transport::{Connection, Frame, FrameSink, FrameStream};

/// Opaque side-channel credentials captured at upgrade time.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token of an authenticated client.
    pub token: Option<String>,
    /// Table access token of a guest.
    pub table_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("token", &redact(&self.token))
            .field("table_token", &redact(&self.table_token))
            .finish()
    }
}

/// Identity of one connected client. Immutable for the session's lifetime.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    /// Server-assigned, unique per connection.
    pub connection_id: ConnectionId,
    /// Client-supplied id; several connections may share it.
    pub session_id: String,
    /// Role fixed at upgrade time.
    pub role: Role,
    /// Room membership, if any.
    pub room_id: Option<String>,
    /// Upgrade-time credentials.
    pub credentials: Credentials,
    /// When the session was created.
    pub connected_at: DateTime<Utc>,
}

impl SessionInfo {
    /// New identity with a fresh connection id. An empty room means no room.
    pub fn new(session_id: impl Into<String>, role: Role, room_id: Option<String>) -> Self {
        Self {
            connection_id: ConnectionId::new(),
            session_id: session_id.into(),
            role,
            room_id: room_id.filter(|r| !r.is_empty()),
            credentials: Credentials::default(),
            connected_at: Utc::now(),
        }
    }

    /// Attach upgrade-time credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame.
    PeerClosed,
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Nothing arrived within the read deadline.
    ReadTimeout,
    /// Reading failed.
    Transport(TransportError),
    /// The outbound side stopped: write failure, eviction or hub shutdown.
    OutboundClosed,
}

/// Drive one session from registration to unregistration.
///
/// Returns once both pumps have stopped (or the outbound pump failed to
/// finish within the write deadline and was aborted).
#[instrument(
    skip_all,
    fields(conn_id = %info.connection_id, session_id = %info.session_id, role = %info.role)
)]
pub async fn run_session<C: Connection>(
    conn: C,
    info: SessionInfo,
    registry: Registry,
    dispatcher: Arc<Dispatcher>,
    config: SessionConfig,
) -> CloseReason {
    let info = Arc::new(info);
    let (handle, queue) = SessionHandle::new(Arc::clone(&info), config.queue_capacity);
    registry.register(handle);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(room_id = ?info.room_id, "client connected");
    let started = Instant::now();

    let (sink, stream) = conn.split();
    let cancel = CancellationToken::new();
    let mut outbound = tokio::spawn(
        outbound_pump(sink, queue, config.keepalive, cancel.clone()).in_current_span(),
    );

    let reason = inbound_pump(
        stream,
        &info,
        &dispatcher,
        config.keepalive.read_timeout,
        &cancel,
    )
    .await;

    // Dropping the registry's handle closes the queue; the outbound pump
    // flushes what is left, writes a close frame and exits.
    registry.unregister(&info.connection_id);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);

    if time::timeout(config.keepalive.write_timeout, &mut outbound)
        .await
        .is_err()
    {
        debug!("outbound pump did not finish in time, aborting");
        cancel.cancel();
        outbound.abort();
    }

    info!(
        ?reason,
        duration_secs = started.elapsed().as_secs_f64(),
        "client disconnected"
    );
    reason
}

async fn inbound_pump(
    mut stream: FrameStream,
    info: &SessionInfo,
    dispatcher: &Dispatcher,
    read_timeout: Duration,
    cancel: &CancellationToken,
) -> CloseReason {
    loop {
        // Every frame, pongs included, refreshes the read deadline.
        let next = tokio::select! {
            () = cancel.cancelled() => return CloseReason::OutboundClosed,
            next = time::timeout(read_timeout, stream.next()) => next,
        };
        let frame = match next {
            Err(_) => {
                warn!(?read_timeout, "read deadline exceeded");
                return CloseReason::ReadTimeout;
            }
            Ok(None) => return CloseReason::StreamEnded,
            Ok(Some(Err(error))) => {
                debug!(%error, "read failed");
                return CloseReason::Transport(error);
            }
            Ok(Some(Ok(frame))) => frame,
        };
        let decoded = match frame {
            Frame::Text(text) => Message::decode(&text),
            Frame::Binary(bytes) => Message::decode_bytes(&bytes),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Close => return CloseReason::PeerClosed,
        };
        match decoded {
            Ok(message) => dispatcher.dispatch(info, message).await,
            Err(error) => {
                counter!(WS_DECODE_ERRORS_TOTAL).increment(1);
                warn!(%error, "dropping undecodable frame");
            }
        }
    }
}

async fn outbound_pump(
    mut sink: FrameSink,
    mut queue: mpsc::Receiver<OutboundFrame>,
    keepalive: KeepaliveConfig,
    cancel: CancellationToken,
) {
    let mut ping = time::interval_at(
        time::Instant::now() + keepalive.ping_interval,
        keepalive.ping_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Fixed cadence: pongs are all a listen-only peer ever sends.
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = queue.recv() => match item {
                Some(text) => Frame::Text(Arc::unwrap_or_clone(text)),
                None => {
                    let _ = write(&mut sink, Frame::Close, keepalive.write_timeout).await;
                    break;
                }
            },
            _ = ping.tick() => Frame::Ping(Vec::new()),
        };
        if let Err(error) = write(&mut sink, frame, keepalive.write_timeout).await {
            debug!(%error, "write failed, stopping outbound pump");
            break;
        }
    }

    let _ = time::timeout(keepalive.write_timeout, sink.close()).await;
    cancel.cancel();
}

async fn write(sink: &mut FrameSink, frame: Frame, deadline: Duration) -> Result<(), TransportError> {
    time::timeout(deadline, sink.send(frame))
        .await
        .unwrap_or(Err(TransportError::WriteTimeout))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
