/// Row types for the tables the real-time core reads and writes.
/// These correspond to the SQLite schema defined in migrations.rs.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::{MessageId, RoomId, UserId};

/// Content shown in place of a soft-deleted message.
pub const DELETED_MESSAGE_TEXT: &str = "Message Has Been Deleted";

/// Display name shown in place of a soft-deleted sender.
pub const DELETED_USER_TEXT: &str = "User no Longer exists";

/// User record joined with its settings row
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub deleted: bool,
    pub karma: i64,
    /// Proximity radius in meters; `None` means the server default applies
    pub proximity_radius: Option<f64>,
}

/// Circular area gating access to a room
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub size_meters: f64,
}

/// Chat room record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: String,
    pub geofence: Option<Geofence>,
    #[serde(skip)]
    pub deleted: bool,
}

/// Message posted in a chat room, redacted on read when deleted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    /// Cached tally maintained by the vote ledger
    pub vote_count: i64,
}

/// Location-stamped message sent to mutually nearby users
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub content: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
}

/// Kinds of content users can vote on. Each kind has its own table and
/// author column; karma always lands on the author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteKind {
    RoomMessage,
    Post,
    PostComment,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoomMessage => "room_message",
            Self::Post => "post",
            Self::PostComment => "post_comment",
        }
    }

    /// Table holding the votable rows of this kind.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::RoomMessage => "room_messages",
            Self::Post => "posts",
            Self::PostComment => "post_comments",
        }
    }

    /// Column naming the row's author.
    pub(crate) fn owner_column(&self) -> &'static str {
        match self {
            Self::RoomMessage => "sender_id",
            Self::Post | Self::PostComment => "author_id",
        }
    }
}

/// A votable row together with its author
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTarget {
    pub kind: VoteKind,
    pub id: i64,
    pub owner_id: UserId,
}
