use std::sync::Arc;

use crate::db::models::ChatRoom;
use crate::error::{ChatError, ChatResult};
use crate::geo::{GeoIndex, GeoPoint};
use crate::services::{RoomDirectory, RoomId, UserId};

/// Authorizes room-scoped actions against the room's geofence.
///
/// Nothing is cached: the caller's location can change between two events,
/// so every join, send and vote asks again.
#[derive(Clone)]
pub struct RoomGate {
    rooms: Arc<dyn RoomDirectory>,
    geo: Arc<dyn GeoIndex>,
}

impl RoomGate {
    pub fn new(rooms: Arc<dyn RoomDirectory>, geo: Arc<dyn GeoIndex>) -> Self {
        Self { rooms, geo }
    }

    pub async fn authorize(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_admin: bool,
    ) -> ChatResult<ChatRoom> {
        let room = match self.rooms.find_room(room_id).await? {
            Some(room) if !room.deleted => room,
            _ => return Err(ChatError::RoomNotFound),
        };

        let Some(fence) = room.geofence else {
            return Ok(room);
        };
        if is_admin {
            return Ok(room);
        }

        let location = self
            .geo
            .position(user_id)
            .await?
            .ok_or(ChatError::LocationUnavailable)?;

        let center = GeoPoint::new(fence.latitude, fence.longitude);
        if center.within(&location, fence.size_meters) {
            Ok(room)
        } else {
            tracing::debug!(
                user_id,
                room_id,
                distance_m = center.distance_to(&location),
                size_m = fence.size_meters,
                "Room access denied, out of range"
            );
            Err(ChatError::OutOfRange)
        }
    }
}
