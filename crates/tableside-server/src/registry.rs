//! Connection registry: the single owner of live-session state.
//!
//! One task owns the live-session map and the room index. Every mutation and
//! every fan-out arrives as a [`Command`] over an unbounded channel, so
//! callers never block on the registry and never touch its maps.
//!
//! Delivery is non-blocking. Each recipient gets a `try_send` onto its bounded
//! outbound queue; a full (or already closed) queue gets the session evicted on
//! the spot rather than stalling delivery to everyone else.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use metrics::{counter, gauge};
use tableside_core::{ConnectionId, Role, RoleSet};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::HubError;
use crate::metrics::{WS_BROADCAST_EVICTIONS_TOTAL, WS_CONNECTIONS_ACTIVE};
use crate::session::SessionInfo;

/// A serialized message waiting in an outbound queue.
pub type OutboundFrame = Arc<String>;

/// Registry-side handle of one session: its identity plus the only sender of
/// its outbound queue. Dropping the handle closes the queue.
#[derive(Debug)]
pub struct SessionHandle {
    info: Arc<SessionInfo>,
    queue: mpsc::Sender<OutboundFrame>,
}

impl SessionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(
        info: Arc<SessionInfo>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (Self { info, queue }, rx)
    }

    /// Session identity.
    pub fn info(&self) -> &Arc<SessionInfo> {
        &self.info
    }

    fn offer(&self, frame: &OutboundFrame) -> bool {
        self.queue.try_send(Arc::clone(frame)).is_ok()
    }
}

/// Who a delivery is addressed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Every live session.
    All,
    /// Members of one room.
    Room(String),
    /// Sessions whose role is in the set.
    Roles(RoleSet),
    /// Sessions with this client-supplied id, optionally of one role.
    Session {
        /// Addressed session id.
        session_id: String,
        /// Required role, if any.
        role: Option<Role>,
    },
    /// Exactly one connection.
    Connection(ConnectionId),
}

impl Audience {
    fn admits(&self, info: &SessionInfo) -> bool {
        match self {
            Self::All => true,
            Self::Room(room) => info.room_id.as_deref() == Some(room.as_str()),
            Self::Roles(roles) => roles.contains(info.role),
            Self::Session { session_id, role } => {
                info.session_id == *session_id && role.is_none_or(|r| r == info.role)
            }
            Self::Connection(id) => info.connection_id == *id,
        }
    }
}

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Sessions the audience selected.
    pub matched: usize,
    /// Sessions whose queue accepted the message.
    pub delivered: usize,
    /// Sessions evicted because their queue refused it.
    pub evicted: usize,
}

/// The registry's mutable state. Only the owner task holds it; inspection
/// closures get a shared borrow between commands.
#[derive(Debug, Default)]
pub struct RegistryState {
    sessions: HashMap<ConnectionId, SessionHandle>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RegistryState {
    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether the connection is live.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Live members of a room, sorted.
    pub fn room_members(&self, room_id: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Live sessions per role. Roles with no session are omitted.
    pub fn role_counts(&self) -> BTreeMap<Role, usize> {
        let mut counts = BTreeMap::new();
        for handle in self.sessions.values() {
            *counts.entry(handle.info.role).or_insert(0) += 1;
        }
        counts
    }

    fn register(&mut self, handle: SessionHandle) {
        let id = handle.info.connection_id.clone();
        // A reused connection id replaces the old entry and its room membership.
        let _ = self.unregister(&id);
        if let Some(room) = &handle.info.room_id {
            let _ = self.rooms.entry(room.clone()).or_default().insert(id.clone());
        }
        debug!(
            conn_id = %id,
            session_id = %handle.info.session_id,
            role = %handle.info.role,
            room_id = ?handle.info.room_id,
            "session registered"
        );
        let _ = self.sessions.insert(id, handle);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    }

    /// Remove a session. Returns `false` if it was already gone.
    fn unregister(&mut self, id: &ConnectionId) -> bool {
        let Some(handle) = self.sessions.remove(id) else {
            return false;
        };
        if let Some(room) = &handle.info.room_id {
            if let Some(members) = self.rooms.get_mut(room) {
                let _ = members.remove(id);
                if members.is_empty() {
                    let _ = self.rooms.remove(room);
                }
            }
        }
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        debug!(conn_id = %id, live = self.sessions.len(), "session unregistered");
        // `handle` drops here, closing the outbound queue.
        true
    }

    /// Drop every session, closing all outbound queues.
    fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.sessions.keys().cloned().collect();
        for id in ids {
            let _ = self.unregister(&id);
        }
    }

    fn targets(&self, audience: &Audience) -> Vec<ConnectionId> {
        match audience {
            Audience::Room(room) => self
                .rooms
                .get(room)
                .map(|m| m.iter().cloned().collect())
                .unwrap_or_default(),
            Audience::Connection(id) if self.sessions.contains_key(id) => vec![id.clone()],
            Audience::Connection(_) => Vec::new(),
            other => self
                .sessions
                .iter()
                .filter(|(_, h)| other.admits(&h.info))
                .map(|(id, _)| id.clone())
                .collect(),
        }
    }

    fn deliver(&mut self, audience: &Audience, frame: &OutboundFrame) -> Delivery {
        let targets = self.targets(audience);
        let mut delivery = Delivery {
            matched: targets.len(),
            ..Delivery::default()
        };
        for id in targets {
            let accepted = self.sessions.get(&id).is_some_and(|h| h.offer(frame));
            if accepted {
                delivery.delivered += 1;
            } else {
                self.evict(&id);
                delivery.evicted += 1;
            }
        }
        delivery
    }

    fn evict(&mut self, id: &ConnectionId) {
        if let Some(handle) = self.sessions.get(id) {
            warn!(
                conn_id = %id,
                session_id = %handle.info.session_id,
                role = %handle.info.role,
                "outbound queue full, evicting session"
            );
        }
        counter!(WS_BROADCAST_EVICTIONS_TOTAL).increment(1);
        let _ = self.unregister(id);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register(handle) => self.register(handle),
            Command::Unregister(id) => {
                let _ = self.unregister(&id);
            }
            Command::Deliver {
                audience,
                frame,
                reply,
            } => {
                let delivery = self.deliver(&audience, &frame);
                let _ = reply.send(delivery);
            }
            Command::Inspect(inspect) => inspect(self),
        }
    }
}

type Inspector = Box<dyn FnOnce(&RegistryState) + Send>;

enum Command {
    Register(SessionHandle),
    Unregister(ConnectionId),
    Deliver {
        audience: Audience,
        frame: OutboundFrame,
        reply: oneshot::Sender<Delivery>,
    },
    Inspect(Inspector),
}

/// Cloneable handle to the registry owner task.
#[derive(Clone, Debug)]
pub struct Registry {
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(h) => f.debug_tuple("Register").field(&h.info.connection_id).finish(),
            Self::Unregister(id) => f.debug_tuple("Unregister").field(id).finish(),
            Self::Deliver { audience, .. } => f.debug_tuple("Deliver").field(audience).finish(),
            Self::Inspect(_) => f.write_str("Inspect"),
        }
    }
}

impl Registry {
    /// Start the owner task. It stops when `cancel` fires or every handle is
    /// dropped; either way all outbound queues are closed on exit.
    pub fn spawn(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_owner(RegistryState::default(), rx, cancel));
        (Self { commands }, task)
    }

    /// Whether the owner task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Add a session. Never fails; if the registry is gone the handle is
    /// dropped, which closes the session's queue.
    pub fn register(&self, handle: SessionHandle) {
        if self.commands.send(Command::Register(handle)).is_err() {
            warn!("registry is shut down, dropping registration");
        }
    }

    /// Remove a session. Idempotent.
    pub fn unregister(&self, id: &ConnectionId) {
        let _ = self.commands.send(Command::Unregister(id.clone()));
    }

    /// Enqueue `frame` for every session in `audience`.
    pub async fn deliver(
        &self,
        audience: Audience,
        frame: OutboundFrame,
    ) -> Result<Delivery, HubError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Deliver {
                audience,
                frame,
                reply,
            })
            .map_err(|_| HubError::RegistryClosed)?;
        rx.await.map_err(|_| HubError::RegistryClosed)
    }

    /// Deliver to every live session.
    pub async fn broadcast(&self, frame: OutboundFrame) -> Result<Delivery, HubError> {
        self.deliver(Audience::All, frame).await
    }

    /// Deliver to the members of one room. An empty room is not an error.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        frame: OutboundFrame,
    ) -> Result<Delivery, HubError> {
        self.deliver(Audience::Room(room_id.to_string()), frame).await
    }

    /// Deliver to sessions whose role is in `roles`.
    ///
    /// Fails with [`HubError::NoRecipients`] when nobody accepted the message.
    pub async fn broadcast_to_roles(
        &self,
        roles: RoleSet,
        frame: OutboundFrame,
    ) -> Result<Delivery, HubError> {
        let delivery = self.deliver(Audience::Roles(roles), frame).await?;
        if delivery.delivered == 0 {
            return Err(HubError::NoRecipients { roles });
        }
        Ok(delivery)
    }

    /// Deliver to the sessions addressed by a client-supplied id.
    pub async fn send_direct(
        &self,
        session_id: &str,
        role: Option<Role>,
        frame: OutboundFrame,
    ) -> Result<Delivery, HubError> {
        let audience = Audience::Session {
            session_id: session_id.to_string(),
            role,
        };
        let delivery = self.deliver(audience, frame).await?;
        if delivery.matched == 0 {
            return Err(HubError::RecipientNotFound {
                session_id: session_id.to_string(),
            });
        }
        if delivery.delivered == 0 {
            return Err(HubError::Backpressure {
                target: session_id.to_string(),
            });
        }
        Ok(delivery)
    }

    /// Deliver to exactly one connection.
    pub async fn send_to(&self, id: &ConnectionId, frame: OutboundFrame) -> Result<(), HubError> {
        let delivery = self.deliver(Audience::Connection(id.clone()), frame).await?;
        if delivery.matched == 0 {
            return Err(HubError::RecipientNotFound {
                session_id: id.to_string(),
            });
        }
        if delivery.delivered == 0 {
            return Err(HubError::Backpressure {
                target: id.to_string(),
            });
        }
        Ok(())
    }

    /// Run `f` against the registry state on the owner task.
    pub async fn inspect<R, F>(&self, f: F) -> Result<R, HubError>
    where
        R: Send + 'static,
        F: FnOnce(&RegistryState) -> R + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let inspector: Inspector = Box::new(move |state| {
            let _ = reply.send(f(state));
        });
        self.commands
            .send(Command::Inspect(inspector))
            .map_err(|_| HubError::RegistryClosed)?;
        rx.await.map_err(|_| HubError::RegistryClosed)
    }

    /// Number of live sessions.
    pub async fn live_count(&self) -> Result<usize, HubError> {
        self.inspect(RegistryState::len).await
    }

    /// Whether a connection is live.
    pub async fn is_live(&self, id: &ConnectionId) -> Result<bool, HubError> {
        let id = id.clone();
        self.inspect(move |state| state.contains(&id)).await
    }

    /// Live members of a room, sorted.
    pub async fn room_members(&self, room_id: &str) -> Result<Vec<ConnectionId>, HubError> {
        let room_id = room_id.to_string();
        self.inspect(move |state| state.room_members(&room_id)).await
    }

    /// Live sessions per role.
    pub async fn role_counts(&self) -> Result<BTreeMap<Role, usize>, HubError> {
        self.inspect(RegistryState::role_counts).await
    }
}

#[instrument(skip_all, name = "registry")]
async fn run_owner(
    mut state: RegistryState,
    mut commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    info!("registry started");
    loop {
        let command = tokio::select! {
            () = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        state.apply(command);
    }
    info!(remaining = state.len(), "registry stopped, closing all sessions");
    state.close_all();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
