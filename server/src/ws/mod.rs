pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

pub use broadcast::ConnectionHub;

use std::collections::BTreeSet;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::services::{RoomId, UserId};
use protocol::ServerEvent;

/// Identifier of one WebSocket connection, unique for the process lifetime.
pub type ConnectionId = Uuid;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Close code sent to a connection replaced by a newer one of the same user.
pub const CLOSE_SUPERSEDED: u16 = 4004;

/// Per-connection state, owned by the connection actor from handshake to
/// disconnect. Never persisted.
#[derive(Debug)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub is_admin: bool,
    pub joined_rooms: BTreeSet<RoomId>,
    /// Location this connection last wrote to the geo index, or found there
    /// when it started. Disconnect only removes the entry while it still
    /// holds this value.
    pub last_location: Option<GeoPoint>,
    tx: ConnectionSender,
}

impl Session {
    pub fn new(
        connection_id: ConnectionId,
        user_id: UserId,
        display_name: String,
        is_admin: bool,
        tx: ConnectionSender,
    ) -> Self {
        Self {
            connection_id,
            user_id,
            display_name,
            is_admin,
            joined_rooms: BTreeSet::new(),
            last_location: None,
            tx,
        }
    }

    /// Send an event to this connection only. A closed socket is a no-op.
    pub fn reply(&self, event: &ServerEvent) {
        if let Some(msg) = event.to_message() {
            let _ = self.tx.send(msg);
        }
    }
}
