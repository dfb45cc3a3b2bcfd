//! Hub actor: the single owner of room membership.
//!
//! One Tokio task owns the room map and serves three intake channels
//! (register, unregister, inbound envelope) plus a read-only stats query.
//! Nothing outside that task can reach the map: callers only hold a
//! [`HubHandle`], which is a bundle of channel senders.

use std::collections::HashMap;
use std::sync::Arc;

use huddle_protocol::{Envelope, RoomKey, UserId};
use huddle_transport::ConnectionId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};

use crate::HubError;

/// Default capacity of the inbound-envelope intake channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Teardown latch
// ---------------------------------------------------------------------------

/// One-way latch shared by a connection's hub handle, outbound queue,
/// and read loop. It flips once, and whoever flips it owns the teardown.
#[derive(Clone)]
pub(crate) struct Teardown(Arc<watch::Sender<bool>>);

impl Teardown {
    fn new() -> Self {
        Self(Arc::new(watch::channel(false).0))
    }

    /// Flips the latch. Returns `true` only for the first caller.
    pub(crate) fn trigger(&self) -> bool {
        self.0
            .send_if_modified(|torn_down| !std::mem::replace(torn_down, true))
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the latch has flipped, immediately if it already has.
    pub(crate) async fn triggered(&self) {
        let mut rx = self.0.subscribe();
        // `self` keeps the sender alive, so this cannot fail early.
        let _ = rx.wait_for(|torn_down| *torn_down).await;
    }
}

// ---------------------------------------------------------------------------
// Client handle and outbound queue
// ---------------------------------------------------------------------------

/// Identifies one registered connection: which connection, in which room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub id: ConnectionId,
    pub room: RoomKey,
}

/// The hub's side of a connection: the producer end of its outbound
/// queue.
///
/// Not `Clone`. Once registered, the hub holds the only sender, so
/// dropping the handle is what closes the queue.
pub struct ClientHandle {
    key: ClientKey,
    user: UserId,
    outbound: mpsc::Sender<Arc<Envelope>>,
    teardown: Teardown,
}

impl ClientHandle {
    /// Allocates a bounded outbound queue and returns the hub-side
    /// handle together with the consumer end.
    pub fn new(
        id: ConnectionId,
        room: RoomKey,
        user: UserId,
        capacity: usize,
    ) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let teardown = Teardown::new();
        let handle = Self {
            key: ClientKey { id, room },
            user,
            outbound: tx,
            teardown: teardown.clone(),
        };
        (handle, OutboundQueue { rx, teardown })
    }

    pub fn key(&self) -> &ClientKey {
        &self.key
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    fn is_closed(&self) -> bool {
        self.teardown.is_triggered()
    }

    /// Marks the connection torn down, which also stops its read loop,
    /// and closes its queue by dropping the sender.
    fn close(self) {
        self.teardown.trigger();
    }
}

/// The consumer end of a connection's outbound queue.
pub struct OutboundQueue {
    rx: mpsc::Receiver<Arc<Envelope>>,
    teardown: Teardown,
}

impl OutboundQueue {
    /// Waits for the next envelope. Returns `None` once the hub has
    /// closed the queue and everything buffered has been drained.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Returns the next envelope if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.try_recv().ok()
    }

    /// Returns `true` once the connection has been torn down, by either
    /// side.
    pub fn is_closed(&self) -> bool {
        self.teardown.is_triggered()
    }

    pub(crate) fn teardown(&self) -> Teardown {
        self.teardown.clone()
    }
}

// ---------------------------------------------------------------------------
// Rooms: the state owned by the control loop
// ---------------------------------------------------------------------------

/// A point-in-time view of hub membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    /// Rooms with at least one member.
    pub rooms: usize,
    /// Registered connections across all rooms.
    pub connections: usize,
}

/// Room membership. Only ever touched from the hub task.
#[derive(Default)]
pub(crate) struct Rooms {
    rooms: HashMap<RoomKey, HashMap<ConnectionId, ClientHandle>>,
}

impl Rooms {
    /// Adds a connection to its room, creating the room if absent.
    ///
    /// Re-registering an already-present connection is a no-op, and a
    /// handle whose connection was already torn down is dropped.
    pub(crate) fn register(&mut self, client: ClientHandle) {
        if client.is_closed() {
            tracing::debug!(
                conn_id = %client.key.id,
                room = %client.key.room,
                "ignoring registration of torn-down client"
            );
            return;
        }
        let ClientKey { id, room } = client.key.clone();
        let members = self.rooms.entry(room.clone()).or_default();
        if members.contains_key(&id) {
            return;
        }
        tracing::info!(
            conn_id = %id,
            %room,
            user = %client.user,
            members = members.len() + 1,
            "client registered"
        );
        members.insert(id, client);
    }

    /// Removes a connection and closes its queue. Safe to repeat.
    pub(crate) fn unregister(&mut self, key: &ClientKey) {
        let Some(members) = self.rooms.get_mut(&key.room) else {
            return;
        };
        if let Some(client) = members.remove(&key.id) {
            tracing::info!(
                conn_id = %key.id,
                room = %key.room,
                user = %client.user,
                members = members.len(),
                "client unregistered"
            );
            client.close();
        }
        if members.is_empty() {
            self.rooms.remove(&key.room);
        }
    }

    /// Fans an envelope out to every member of its target room.
    ///
    /// Never waits: a member whose queue is full or already gone is
    /// evicted on the spot. Returns how many members accepted it.
    pub(crate) fn route(&mut self, envelope: &Arc<Envelope>) -> usize {
        let Some(room) = envelope.room_key() else {
            return 0;
        };
        let Some(members) = self.rooms.get_mut(&room) else {
            return 0;
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        for (id, client) in members.iter() {
            match client.outbound.try_send(Arc::clone(envelope)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        conn_id = %id,
                        %room,
                        user = %client.user,
                        "outbound queue full, dropping slow client"
                    );
                    evicted.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        conn_id = %id,
                        %room,
                        "writer already gone, dropping client"
                    );
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            if let Some(client) = members.remove(&id) {
                client.close();
            }
        }
        if members.is_empty() {
            self.rooms.remove(&room);
        }
        delivered
    }

    pub(crate) fn stats(&self) -> HubStats {
        HubStats {
            rooms: self.rooms.len(),
            connections: self.rooms.values().map(HashMap::len).sum(),
        }
    }
}

// ---------------------------------------------------------------------------
// Hub task and handle
// ---------------------------------------------------------------------------

/// The hub's control loop.
///
/// Construct one per process with [`Hub::spawn`] and share the returned
/// [`HubHandle`].
pub struct Hub {
    rooms: Rooms,
    register_rx: mpsc::UnboundedReceiver<ClientHandle>,
    unregister_rx: mpsc::UnboundedReceiver<ClientKey>,
    inbound_rx: mpsc::Receiver<Arc<Envelope>>,
    query_rx: mpsc::UnboundedReceiver<oneshot::Sender<HubStats>>,
}

impl Hub {
    /// Spawns the control loop on the current Tokio runtime.
    pub fn spawn() -> HubHandle {
        Self::spawn_with_capacity(DEFAULT_INBOUND_CAPACITY)
    }

    /// Spawns the control loop with a custom inbound-envelope capacity.
    pub fn spawn_with_capacity(inbound_capacity: usize) -> HubHandle {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity.max(1));
        let (query_tx, query_rx) = mpsc::unbounded_channel();

        let hub = Hub {
            rooms: Rooms::default(),
            register_rx,
            unregister_rx,
            inbound_rx,
            query_rx,
        };
        tokio::spawn(hub.run());

        HubHandle {
            register_tx,
            unregister_tx,
            inbound_tx,
            query_tx,
        }
    }

    /// Serves intake until every handle is dropped.
    ///
    /// Intake is polled in a fixed order (register, unregister, inbound,
    /// query). A registration that still loses the race against its own
    /// unregistration is caught by the teardown latch in `Rooms::register`.
    async fn run(mut self) {
        tracing::info!("hub started");

        loop {
            tokio::select! {
                biased;
                Some(client) = self.register_rx.recv() => {
                    self.rooms.register(client);
                }
                Some(key) = self.unregister_rx.recv() => {
                    self.rooms.unregister(&key);
                }
                Some(envelope) = self.inbound_rx.recv() => {
                    self.rooms.route(&envelope);
                }
                Some(reply) = self.query_rx.recv() => {
                    let _ = reply.send(self.rooms.stats());
                }
                else => break,
            }
        }

        tracing::info!("hub stopped");
    }
}

/// Cheap-to-clone handle to the running hub.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::UnboundedSender<ClientHandle>,
    unregister_tx: mpsc::UnboundedSender<ClientKey>,
    inbound_tx: mpsc::Sender<Arc<Envelope>>,
    query_tx: mpsc::UnboundedSender<oneshot::Sender<HubStats>>,
}

impl HubHandle {
    /// Queues a connection for registration.
    pub fn register(&self, client: ClientHandle) -> Result<(), HubError> {
        self.register_tx
            .send(client)
            .map_err(|_| HubError::HubStopped)
    }

    /// Queues a connection for removal.
    pub fn unregister(&self, key: ClientKey) -> Result<(), HubError> {
        self.unregister_tx
            .send(key)
            .map_err(|_| HubError::HubStopped)
    }

    /// Submits an inbound envelope for routing.
    ///
    /// Waits only if the hub's inbound channel is full.
    pub async fn submit(&self, envelope: Envelope) -> Result<(), HubError> {
        self.inbound_tx
            .send(Arc::new(envelope))
            .await
            .map_err(|_| HubError::HubStopped)
    }

    /// Asks the control loop for current membership counts.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.query_tx
            .send(reply_tx)
            .map_err(|_| HubError::HubStopped)?;
        reply_rx.await.map_err(|_| HubError::HubStopped)
    }
}
