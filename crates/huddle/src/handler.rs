//! Per-connection admission: route the upgrade request, authenticate,
//! attach to the hub.
//!
//! Each accepted connection gets its own Tokio task running
//! [`admit`]. The flow is:
//!   1. Match the request path against `{prefix}/{room}`
//!   2. Authenticate the `token` query parameter
//!   3. Hand the connection to [`Client::spawn`]
//!
//! A connection that fails step 1 or 2 is closed before any client
//! exists, so the hub never sees it.

use std::sync::Arc;

use huddle_hub::{Client, ClientTasks};
use huddle_protocol::{JsonCodec, RoomKey};
use huddle_transport::{Connection, FrameSink, UpgradeRequest};

use crate::server::ServerState;
use crate::{Authenticator, HuddleError};

/// Query parameter carrying the auth token.
pub(crate) const TOKEN_PARAM: &str = "token";

/// Admits one upgraded connection.
pub(crate) async fn admit<C, A>(
    conn: C,
    upgrade: UpgradeRequest,
    state: Arc<ServerState<A>>,
) -> Result<ClientTasks, HuddleError>
where
    C: Connection,
    A: Authenticator,
{
    let conn_id = conn.id();

    let Some(room) = room_from_path(&state.config.path_prefix, &upgrade.path)
    else {
        reject(conn).await;
        return Err(HuddleError::BadPath(upgrade.path));
    };

    let token = upgrade.query_param(TOKEN_PARAM).unwrap_or_default();
    let user = match state.auth.authenticate(token).await {
        Ok(user) => user,
        Err(e) => {
            reject(conn).await;
            return Err(e);
        }
    };

    tracing::info!(%conn_id, %room, %user, "client admitted");
    let tasks = Client::spawn(
        conn,
        room,
        user,
        &state.hub,
        JsonCodec,
        &state.config.client,
    )?;
    Ok(tasks)
}

/// Extracts the room from `{prefix}/{room}`.
///
/// The room must be a single non-empty path segment.
pub(crate) fn room_from_path(prefix: &str, path: &str) -> Option<RoomKey> {
    let room = path.strip_prefix(prefix)?.strip_prefix('/')?;
    if room.is_empty() || room.contains('/') {
        return None;
    }
    Some(RoomKey::new(room))
}

/// Sends a close frame and drops the connection.
async fn reject<C: Connection>(conn: C) {
    let conn_id = conn.id();
    let (mut sink, _source) = conn.split();
    if let Err(e) = sink.close().await {
        tracing::debug!(%conn_id, error = %e, "close after reject failed");
    }
}
