//! Connection adapter: bridges one duplex connection to the hub.
//!
//! Each adapter runs two independent tasks:
//!
//! - the **read loop** decodes inbound frames into envelopes and submits
//!   them to the hub, and enforces the pong-refreshed read deadline;
//! - the **write loop** drains the outbound queue onto the wire and sends
//!   keepalive pings.
//!
//! Teardown has exactly one entry point per side. The read loop flips the
//! shared teardown latch and asks the hub to unregister; the hub flips the
//! same latch when it evicts a slow consumer. Whichever flips it first
//! owns the teardown. The write loop never unregisters; it exits when the
//! hub drops the queue's sender, or on a write failure.
//!
//! The read loop also stops as soon as the latch flips or the write loop
//! exits, so an evicted or half-dead connection cannot keep submitting.

use huddle_protocol::{Codec, Envelope, RoomKey, UserId};
use huddle_transport::{Connection, ConnectionId, Frame, FrameSink, FrameSource};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::hub::{ClientHandle, ClientKey, HubHandle, OutboundQueue, Teardown};
use crate::{ClientConfig, HubError};

/// Entry point for attaching an upgraded connection to the hub.
pub struct Client;

impl Client {
    /// Registers the connection with the hub, then starts its read and
    /// write loops.
    ///
    /// Registration is queued before either loop starts, so the hub
    /// always sees it before anything the loops send.
    pub fn spawn<C, K>(
        conn: C,
        room: RoomKey,
        user: UserId,
        hub: &HubHandle,
        codec: K,
        config: &ClientConfig,
    ) -> Result<ClientTasks, HubError>
    where
        C: Connection,
        K: Codec + Clone,
    {
        let config = config.clone().validated();
        let id = conn.id();
        let (handle, queue) = ClientHandle::new(
            id,
            room,
            user.clone(),
            config.outbound_capacity,
        );
        let key = handle.key().clone();
        let teardown = queue.teardown();
        hub.register(handle)?;

        let (sink, source) = conn.split();
        let (writer_alive, writer_gone) = oneshot::channel();

        let reader = ReadLoop {
            key: key.clone(),
            user,
            source,
            hub: hub.clone(),
            codec: codec.clone(),
            read_timeout: config.read_timeout,
            max_frame_size: config.max_frame_size,
            teardown,
            writer_gone,
        };
        let writer = WriteLoop {
            key,
            sink,
            queue,
            codec,
            ping_interval: config.ping_interval,
            write_timeout: config.write_timeout,
            _alive: writer_alive,
        };

        Ok(ClientTasks {
            id,
            read: tokio::spawn(reader.run()),
            write: tokio::spawn(writer.run()),
        })
    }
}

/// Join handles for a running adapter's two loops.
pub struct ClientTasks {
    id: ConnectionId,
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

impl ClientTasks {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Waits until both loops have exited.
    pub async fn join(self) {
        let _ = tokio::join!(self.read, self.write);
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

struct ReadLoop<S, K> {
    key: ClientKey,
    user: UserId,
    source: S,
    hub: HubHandle,
    codec: K,
    read_timeout: std::time::Duration,
    max_frame_size: usize,
    teardown: Teardown,
    /// Resolves when the write loop drops its end.
    writer_gone: oneshot::Receiver<()>,
}

impl<S: FrameSource, K: Codec> ReadLoop<S, K> {
    async fn run(mut self) {
        match self.pump().await {
            Ok(()) => tracing::debug!(
                conn_id = %self.key.id,
                user = %self.user,
                "read loop finished"
            ),
            Err(e) => tracing::debug!(
                conn_id = %self.key.id,
                user = %self.user,
                error = %e,
                "read loop ended"
            ),
        }
        self.finish();
        // `self.source` drops here, releasing the read half.
    }

    /// Reads until the peer closes, the connection is torn down
    /// elsewhere, or something fails.
    async fn pump(&mut self) -> Result<(), HubError> {
        let mut deadline = Instant::now() + self.read_timeout;

        loop {
            let next = tokio::select! {
                biased;
                () = self.teardown.triggered() => {
                    tracing::debug!(conn_id = %self.key.id, "torn down by hub");
                    return Ok(());
                }
                _ = &mut self.writer_gone => {
                    tracing::debug!(conn_id = %self.key.id, "write loop gone");
                    return Ok(());
                }
                next = time::timeout_at(deadline, self.source.recv()) => next,
            };
            let frame = match next {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(HubError::ReadTimeout(self.read_timeout)),
            };

            if frame.len() > self.max_frame_size {
                tracing::warn!(
                    conn_id = %self.key.id,
                    size = frame.len(),
                    max = self.max_frame_size,
                    "oversized frame"
                );
                return Err(HubError::FrameTooLarge {
                    size: frame.len(),
                    max: self.max_frame_size,
                });
            }

            let data = match frame {
                Frame::Pong(_) => {
                    deadline = Instant::now() + self.read_timeout;
                    continue;
                }
                // Pings are not answered here. The WebSocket transport
                // replies on its own; other transports may not.
                Frame::Ping(_) => continue,
                Frame::Close => return Ok(()),
                Frame::Text(text) => text.into_bytes(),
                Frame::Binary(data) => data,
            };

            let envelope: Envelope = self.codec.decode(&data)?;
            let envelope = envelope.stamped(&self.user, &self.key.room);
            if envelope.room_key().is_none() {
                tracing::debug!(
                    conn_id = %self.key.id,
                    kind = %envelope.kind(),
                    "envelope has no route, hub will drop it"
                );
            }
            self.hub.submit(envelope).await?;
        }
    }

    /// Unregisters this connection unless the hub already tore it down.
    fn finish(&self) {
        if !self.teardown.trigger() {
            return;
        }
        if self.hub.unregister(self.key.clone()).is_err() {
            tracing::debug!(
                conn_id = %self.key.id,
                "hub stopped before unregister"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Write loop
// ---------------------------------------------------------------------------

struct WriteLoop<S, K> {
    key: ClientKey,
    sink: S,
    queue: OutboundQueue,
    codec: K,
    ping_interval: std::time::Duration,
    write_timeout: std::time::Duration,
    /// Dropped with the loop, which stops the read loop.
    _alive: oneshot::Sender<()>,
}

impl<S: FrameSink, K: Codec> WriteLoop<S, K> {
    async fn run(mut self) {
        match self.pump().await {
            Ok(()) => tracing::debug!(
                conn_id = %self.key.id,
                "outbound queue closed"
            ),
            Err(e) => tracing::debug!(
                conn_id = %self.key.id,
                error = %e,
                "write loop ended"
            ),
        }

        if let Ok(Err(e)) =
            time::timeout(self.write_timeout, self.sink.close()).await
        {
            tracing::debug!(conn_id = %self.key.id, error = %e, "close failed");
        }
    }

    /// Writes queued envelopes and pings until the queue closes or a
    /// write fails.
    async fn pump(&mut self) -> Result<(), HubError> {
        let mut ping = time::interval_at(
            Instant::now() + self.ping_interval,
            self.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = self.queue.recv() => match next {
                    Some(envelope) => self.write_envelope(&envelope).await?,
                    None => {
                        // Best effort: the peer may already be gone.
                        let _ = self.write(Frame::Close).await;
                        return Ok(());
                    }
                },
                _ = ping.tick() => self.write(Frame::Ping(Vec::new())).await?,
            }
        }
    }

    async fn write_envelope(
        &mut self,
        envelope: &Envelope,
    ) -> Result<(), HubError> {
        let bytes = match self.codec.encode(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    conn_id = %self.key.id,
                    error = %e,
                    "failed to encode envelope, skipping"
                );
                return Ok(());
            }
        };
        let frame = match String::from_utf8(bytes) {
            Ok(text) => Frame::Text(text),
            Err(e) => Frame::Binary(e.into_bytes()),
        };
        self.write(frame).await
    }

    async fn write(&mut self, frame: Frame) -> Result<(), HubError> {
        time::timeout(self.write_timeout, self.sink.send(frame))
            .await
            .map_err(|_| HubError::WriteTimeout(self.write_timeout))??;
        Ok(())
    }
}
