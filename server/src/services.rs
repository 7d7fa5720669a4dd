//! Contracts of the collaborators the real-time core depends on.
//!
//! The core only ever talks to these traits; `db::SqliteStore` implements all
//! of them for a stand-alone deployment and for tests.

use async_trait::async_trait;

use crate::db::models::{
    ChatRoom, ProximityMessage, RoomMessage, User, VoteKind, VoteTarget,
};
use crate::error::ChatResult;
use crate::geo::GeoPoint;

pub type UserId = i64;
pub type RoomId = i64;
pub type MessageId = i64;

/// Resolves user ids (taken from verified tokens) to user records.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> ChatResult<Option<User>>;
}

/// Read access to chat rooms and their geofences.
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Returns soft-deleted rooms too; callers decide what to do with them.
    async fn find_room(&self, room_id: RoomId) -> ChatResult<Option<ChatRoom>>;
}

/// Message persistence. Reads redact soft-deleted content.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_room_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: &str,
    ) -> ChatResult<RoomMessage>;

    async fn create_proximity_message(
        &self,
        sender_id: UserId,
        content: &str,
        at: GeoPoint,
    ) -> ChatResult<ProximityMessage>;

    async fn get_room_message(&self, message_id: MessageId) -> ChatResult<Option<RoomMessage>>;

    /// Mark the message deleted. Returns false when no such message exists.
    async fn soft_delete_room_message(&self, message_id: MessageId) -> ChatResult<bool>;

    /// The `limit` most recent messages of the room, oldest first.
    async fn latest_room_messages(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> ChatResult<Vec<RoomMessage>>;
}

/// Per-user karma counter. It only moves inside `VoteStore::exchange_vote`.
#[async_trait]
pub trait KarmaStore: Send + Sync {
    async fn karma(&self, user_id: UserId) -> ChatResult<i64>;
}

/// Vote storage keyed by (voter, target).
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Look up a votable row and its author. `None` if the row is missing.
    async fn vote_target(&self, kind: VoteKind, target_id: i64) -> ChatResult<Option<VoteTarget>>;

    /// Store `value` as the voter's vote (0 removes it) and return the value it
    /// replaced. The difference is added to the owner's karma and the target's
    /// cached tally in the same transaction, so either all three change or none.
    async fn exchange_vote(
        &self,
        voter_id: UserId,
        target: &VoteTarget,
        value: i64,
    ) -> ChatResult<Option<i64>>;

    async fn get_vote(
        &self,
        voter_id: UserId,
        kind: VoteKind,
        target_id: i64,
    ) -> ChatResult<Option<i64>>;

    /// Sum of all live votes on the target.
    async fn vote_count(&self, kind: VoteKind, target_id: i64) -> ChatResult<i64>;
}
