//! SQLite implementation of every collaborator contract in `services`.
//!
//! Each call takes the connection lock once inside `spawn_blocking`. The vote
//! exchange and its karma and tally increments share one transaction, so a
//! failed increment rolls the vote back with it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{
    ChatRoom, Geofence, ProximityMessage, RoomMessage, User, VoteKind, VoteTarget,
    DELETED_MESSAGE_TEXT, DELETED_USER_TEXT,
};
use crate::db::DbPool;
use crate::error::ChatResult;
use crate::geo::GeoPoint;
use crate::services::{
    KarmaStore, MessageId, MessageStore, RoomDirectory, RoomId, UserDirectory, UserId, VoteStore,
};

const ROOM_MESSAGE_SELECT: &str = "SELECT m.id, m.room_id, m.sender_id, u.display_name, u.deleted,
        m.content, m.created_at, m.deleted, m.vote_count
     FROM room_messages m JOIN users u ON u.id = m.sender_id";

/// Fields needed to create a user row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub email_verified: bool,
    pub is_admin: bool,
    pub proximity_radius: Option<f64>,
}

impl NewUser {
    /// A verified, non-admin user with the default radius.
    pub fn verified(email: &str, display_name: &str) -> Self {
        Self {
            email: email.to_string(),
            display_name: display_name.to_string(),
            email_verified: true,
            is_admin: false,
            proximity_radius: None,
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run `f` against the locked connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> ChatResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> ChatResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock()?;
            f(&mut conn)
        })
        .await?
    }

    // --- Provisioning. Account and room management live outside the
    // real-time core; these exist for bootstrapping and tests. ---

    pub async fn create_user(&self, user: NewUser) -> ChatResult<UserId> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (email, display_name, email_verified, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.email,
                    user.display_name,
                    user.email_verified,
                    user.is_admin,
                    Utc::now().to_rfc3339()
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO user_settings (user_id, proximity_radius) VALUES (?1, ?2)",
                params![id, user.proximity_radius],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    pub async fn set_user_deleted(&self, user_id: UserId) -> ChatResult<()> {
        self.with_conn(move |conn| {
            conn.execute("UPDATE users SET deleted = 1 WHERE id = ?1", params![user_id])?;
            Ok(())
        })
        .await
    }

    pub async fn set_proximity_radius(&self, user_id: UserId, radius: f64) -> ChatResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_settings (user_id, proximity_radius) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET proximity_radius = excluded.proximity_radius",
                params![user_id, radius],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn create_room(&self, name: &str, geofence: Option<Geofence>) -> ChatResult<RoomId> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO chat_rooms (name, latitude, longitude, size_meters, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    name,
                    geofence.map(|g| g.latitude),
                    geofence.map(|g| g.longitude),
                    geofence.map(|g| g.size_meters),
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn set_room_deleted(&self, room_id: RoomId) -> ChatResult<()> {
        self.with_conn(move |conn| {
            conn.execute("UPDATE chat_rooms SET deleted = 1 WHERE id = ?1", params![room_id])?;
            Ok(())
        })
        .await
    }

    pub async fn create_post(&self, author_id: UserId, title: &str, content: &str) -> ChatResult<i64> {
        let (title, content) = (title.to_string(), content.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO posts (author_id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![author_id, title, content, Utc::now().to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn create_post_comment(
        &self,
        post_id: i64,
        author_id: UserId,
        content: &str,
    ) -> ChatResult<i64> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO post_comments (post_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![post_id, author_id, content, Utc::now().to_rfc3339()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Cached tally column of a votable row.
    pub async fn cached_tally(&self, kind: VoteKind, target_id: i64) -> ChatResult<i64> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT vote_count FROM {} WHERE id = ?1", kind.table());
            Ok(conn.query_row(&sql, params![target_id], |row| row.get(0))?)
        })
        .await
    }
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse::<DateTime<Utc>>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn room_message_from_row(row: &Row<'_>) -> rusqlite::Result<RoomMessage> {
    let sender_deleted: bool = row.get(4)?;
    let deleted: bool = row.get(7)?;
    Ok(RoomMessage {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_display_name: if sender_deleted {
            DELETED_USER_TEXT.to_string()
        } else {
            row.get(3)?
        },
        content: if deleted {
            DELETED_MESSAGE_TEXT.to_string()
        } else {
            row.get(5)?
        },
        created_at: parse_timestamp(row, 6)?,
        deleted,
        vote_count: row.get(8)?,
    })
}

fn load_room_message(conn: &Connection, message_id: MessageId) -> rusqlite::Result<Option<RoomMessage>> {
    conn.query_row(
        &format!("{ROOM_MESSAGE_SELECT} WHERE m.id = ?1"),
        params![message_id],
        room_message_from_row,
    )
    .optional()
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_user(&self, user_id: UserId) -> ChatResult<Option<User>> {
        self.with_conn(move |conn| {
            let user = conn
                .query_row(
                    "SELECT u.id, u.email, u.display_name, u.email_verified, u.is_admin,
                            u.deleted, u.karma, s.proximity_radius
                     FROM users u LEFT JOIN user_settings s ON s.user_id = u.id
                     WHERE u.id = ?1",
                    params![user_id],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            display_name: row.get(2)?,
                            email_verified: row.get(3)?,
                            is_admin: row.get(4)?,
                            deleted: row.get(5)?,
                            karma: row.get(6)?,
                            proximity_radius: row.get(7)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
        .await
    }
}

#[async_trait]
impl RoomDirectory for SqliteStore {
    async fn find_room(&self, room_id: RoomId) -> ChatResult<Option<ChatRoom>> {
        self.with_conn(move |conn| {
            let room = conn
                .query_row(
                    "SELECT id, name, latitude, longitude, size_meters, deleted
                     FROM chat_rooms WHERE id = ?1",
                    params![room_id],
                    |row| {
                        let lat: Option<f64> = row.get(2)?;
                        let lon: Option<f64> = row.get(3)?;
                        let size: Option<f64> = row.get(4)?;
                        // A fence needs all three columns; (0, 0) is a valid center.
                        let geofence = match (lat, lon, size) {
                            (Some(latitude), Some(longitude), Some(size_meters)) => Some(Geofence {
                                latitude,
                                longitude,
                                size_meters,
                            }),
                            _ => None,
                        };
                        Ok(ChatRoom {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            geofence,
                            deleted: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(room)
        })
        .await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_room_message(
        &self,
        room_id: RoomId,
        sender_id: UserId,
        content: &str,
    ) -> ChatResult<RoomMessage> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO room_messages (room_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![room_id, sender_id, content, Utc::now().to_rfc3339()],
            )?;
            let id = conn.last_insert_rowid();
            load_room_message(conn, id)?
                .ok_or_else(|| crate::error::ChatError::Internal("message vanished after insert".into()))
        })
        .await
    }

    async fn create_proximity_message(
        &self,
        sender_id: UserId,
        content: &str,
        at: GeoPoint,
    ) -> ChatResult<ProximityMessage> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO proximity_messages (sender_id, content, latitude, longitude, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![sender_id, content, at.latitude, at.longitude, created_at.to_rfc3339()],
            )?;
            let id = conn.last_insert_rowid();
            let sender_display_name: String = conn.query_row(
                "SELECT display_name FROM users WHERE id = ?1",
                params![sender_id],
                |row| row.get(0),
            )?;
            Ok(ProximityMessage {
                id,
                sender_id,
                sender_display_name,
                content,
                latitude: at.latitude,
                longitude: at.longitude,
                created_at,
                deleted: false,
            })
        })
        .await
    }

    async fn get_room_message(&self, message_id: MessageId) -> ChatResult<Option<RoomMessage>> {
        self.with_conn(move |conn| Ok(load_room_message(conn, message_id)?))
            .await
    }

    async fn soft_delete_room_message(&self, message_id: MessageId) -> ChatResult<bool> {
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE room_messages SET deleted = 1 WHERE id = ?1",
                params![message_id],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn latest_room_messages(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> ChatResult<Vec<RoomMessage>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{ROOM_MESSAGE_SELECT} WHERE m.room_id = ?1 ORDER BY m.id DESC LIMIT ?2"
            ))?;
            let mut messages = stmt
                .query_map(params![room_id, limit as i64], room_message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

#[async_trait]
impl KarmaStore for SqliteStore {
    async fn karma(&self, user_id: UserId) -> ChatResult<i64> {
        self.with_conn(move |conn| {
            let karma = conn
                .query_row(
                    "SELECT karma FROM users WHERE id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(karma.unwrap_or(0))
        })
        .await
    }
}

#[async_trait]
impl VoteStore for SqliteStore {
    async fn vote_target(&self, kind: VoteKind, target_id: i64) -> ChatResult<Option<VoteTarget>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE id = ?1",
                kind.owner_column(),
                kind.table()
            );
            let owner: Option<UserId> = conn
                .query_row(&sql, params![target_id], |row| row.get(0))
                .optional()?;
            Ok(owner.map(|owner_id| VoteTarget {
                kind,
                id: target_id,
                owner_id,
            }))
        })
        .await
    }

    async fn exchange_vote(
        &self,
        voter_id: UserId,
        target: &VoteTarget,
        value: i64,
    ) -> ChatResult<Option<i64>> {
        let target = *target;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let previous: Option<i64> = tx
                .query_row(
                    "SELECT value FROM votes
                     WHERE voter_id = ?1 AND target_kind = ?2 AND target_id = ?3",
                    params![voter_id, target.kind.as_str(), target.id],
                    |row| row.get(0),
                )
                .optional()?;

            if value == 0 {
                if previous.is_some() {
                    tx.execute(
                        "DELETE FROM votes WHERE voter_id = ?1 AND target_kind = ?2 AND target_id = ?3",
                        params![voter_id, target.kind.as_str(), target.id],
                    )?;
                }
            } else {
                let now = Utc::now().to_rfc3339();
                tx.execute(
                    "INSERT INTO votes (voter_id, target_kind, target_id, value, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                     ON CONFLICT(voter_id, target_kind, target_id)
                     DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![voter_id, target.kind.as_str(), target.id, value, now],
                )?;
            }

            let delta = value - previous.unwrap_or(0);
            if delta != 0 {
                tx.execute(
                    "UPDATE users SET karma = karma + ?1 WHERE id = ?2",
                    params![delta, target.owner_id],
                )?;
                let sql = format!(
                    "UPDATE {} SET vote_count = vote_count + ?1 WHERE id = ?2",
                    target.kind.table()
                );
                tx.execute(&sql, params![delta, target.id])?;
            }

            tx.commit()?;
            Ok(previous)
        })
        .await
    }

    async fn get_vote(
        &self,
        voter_id: UserId,
        kind: VoteKind,
        target_id: i64,
    ) -> ChatResult<Option<i64>> {
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM votes
                     WHERE voter_id = ?1 AND target_kind = ?2 AND target_id = ?3",
                    params![voter_id, kind.as_str(), target_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn vote_count(&self, kind: VoteKind, target_id: i64) -> ChatResult<i64> {
        self.with_conn(move |conn| {
            let sum: i64 = conn.query_row(
                "SELECT COALESCE(SUM(value), 0) FROM votes WHERE target_kind = ?1 AND target_id = ?2",
                params![kind.as_str(), target_id],
                |row| row.get(0),
            )?;
            Ok(sum)
        })
        .await
    }
}
