use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::protocol::ServerEvent;
use super::{ConnectionId, ConnectionSender};
use crate::services::RoomId;

/// Local fan-out: the sender of every attached connection plus the member
/// set of every room group.
///
/// Sending to a connection that is gone (detached, or whose socket closed) is
/// a silent no-op, so handlers that finish after a disconnect stay harmless.
#[derive(Debug, Clone, Default)]
pub struct ConnectionHub {
    senders: Arc<DashMap<ConnectionId, ConnectionSender>>,
    rooms: Arc<DashMap<RoomId, HashSet<ConnectionId>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, connection_id: ConnectionId, tx: ConnectionSender) {
        self.senders.insert(connection_id, tx);
    }

    pub fn detach(&self, connection_id: ConnectionId) {
        self.senders.remove(&connection_id);
    }

    pub fn is_attached(&self, connection_id: ConnectionId) -> bool {
        self.senders.contains_key(&connection_id)
    }

    /// Send an event to one connection. Returns whether it was queued.
    pub fn send_to(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        match event.to_message() {
            Some(msg) => self.send_raw(connection_id, msg),
            None => false,
        }
    }

    fn send_raw(&self, connection_id: ConnectionId, msg: Message) -> bool {
        self.senders
            .get(&connection_id)
            .map(|sender| sender.send(msg).is_ok())
            .unwrap_or(false)
    }

    /// Add a connection to a room group. Returns the member count afterwards.
    pub fn join_room(&self, room_id: RoomId, connection_id: ConnectionId) -> usize {
        let mut members = self.rooms.entry(room_id).or_default();
        members.insert(connection_id);
        members.len()
    }

    /// Remove a connection from a room group. Returns the remaining member count.
    pub fn leave_room(&self, room_id: RoomId, connection_id: ConnectionId) -> usize {
        let remaining = match self.rooms.get_mut(&room_id) {
            Some(mut members) => {
                members.remove(&connection_id);
                members.len()
            }
            None => return 0,
        };
        if remaining == 0 {
            self.rooms.remove_if(&room_id, |_, members| members.is_empty());
        }
        remaining
    }

    pub fn room_member_count(&self, room_id: RoomId) -> usize {
        self.rooms.get(&room_id).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_member(&self, room_id: RoomId, connection_id: ConnectionId) -> bool {
        self.rooms
            .get(&room_id)
            .map(|m| m.contains(&connection_id))
            .unwrap_or(false)
    }

    /// Broadcast an event to every member of a room.
    pub fn broadcast_to_room(&self, room_id: RoomId, event: &ServerEvent) {
        let Some(msg) = event.to_message() else {
            return;
        };
        // Snapshot the members so no room guard is held while sending.
        let members: Vec<ConnectionId> = match self.rooms.get(&room_id) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };
        for connection_id in members {
            self.send_raw(connection_id, msg.clone());
        }
    }

    /// Ask a connection to close with the given code and reason.
    pub fn close(&self, connection_id: ConnectionId, close_code: u16, reason: &str) {
        let frame = CloseFrame {
            code: close_code,
            reason: reason.to_string().into(),
        };
        self.send_raw(connection_id, Message::Close(Some(frame)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn text_of(msg: Message) -> serde_json::Value {
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_room_broadcast_reaches_members_only() {
        let hub = ConnectionHub::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        hub.attach(a, tx_a);
        hub.attach(b, tx_b);

        assert_eq!(hub.join_room(1, a), 1);
        hub.broadcast_to_room(1, &ServerEvent::NearbyUserCount { count: 3 });

        let got = text_of(rx_a.try_recv().unwrap());
        assert_eq!(got["event"], "nearbyUserCount");
        assert_eq!(got["data"]["count"], 3);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_leave_room_reports_remaining_and_prunes() {
        let hub = ConnectionHub::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        hub.join_room(5, a);
        assert_eq!(hub.join_room(5, b), 2);
        assert_eq!(hub.leave_room(5, a), 1);
        assert!(!hub.is_member(5, a));
        assert_eq!(hub.leave_room(5, b), 0);
        assert_eq!(hub.room_member_count(5), 0);
        assert_eq!(hub.leave_room(5, b), 0);
    }

    #[test]
    fn test_send_to_detached_connection_is_noop() {
        let hub = ConnectionHub::new();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.attach(id, tx);
        drop(rx);
        assert!(!hub.send_to(id, &ServerEvent::error("closed")));

        hub.detach(id);
        assert!(!hub.is_attached(id));
        assert!(!hub.send_to(id, &ServerEvent::error("gone")));
    }
}
