//! Room-scoped event handlers: join, leave, send, delete and vote.

use crate::db::models::{RoomMessage, VoteKind};
use crate::error::{ChatError, ChatResult};
use crate::services::{MessageId, RoomId};
use crate::state::AppState;
use crate::ws::protocol::{MessageView, ServerEvent};
use crate::ws::Session;

use super::validate::validate_content;

/// Join a room: authorize against its geofence, subscribe to its group,
/// announce the arrival and reply with the recent history. Joining a room
/// this connection is already in only refreshes the history.
pub async fn join(state: &AppState, session: &mut Session, room_id: RoomId) -> ChatResult<()> {
    let room = state
        .gate
        .authorize(room_id, session.user_id, session.is_admin)
        .await?;

    let history = state
        .messages
        .latest_room_messages(room_id, state.settings.history_limit)
        .await?;
    let mut last_messages = Vec::with_capacity(history.len());
    for message in history {
        let user_vote = state
            .ledger
            .user_vote(session.user_id, VoteKind::RoomMessage, message.id)
            .await?;
        last_messages.push(MessageView {
            is_own_message: message.sender_id == session.user_id,
            user_vote,
            message,
        });
    }

    let member_count = state.hub.join_room(room_id, session.connection_id);
    if session.joined_rooms.insert(room_id) {
        tracing::info!(
            user_id = session.user_id,
            room_id,
            member_count,
            "User joined room"
        );
        state.hub.broadcast_to_room(
            room_id,
            &ServerEvent::UserJoined {
                display_name: session.display_name.clone(),
                room_name: room.name.clone(),
                member_count,
                message: format!("{} has joined the chat room", session.display_name),
            },
        );
    }
    session.reply(&ServerEvent::JoinedRoom {
        room,
        last_messages,
    });
    Ok(())
}

/// Leave every joined room, notifying the members that remain.
pub fn leave_all(state: &AppState, session: &mut Session) {
    for room_id in std::mem::take(&mut session.joined_rooms) {
        let member_count = state.hub.leave_room(room_id, session.connection_id);
        tracing::info!(
            user_id = session.user_id,
            room_id,
            member_count,
            "User left room"
        );
        state.hub.broadcast_to_room(
            room_id,
            &ServerEvent::UserLeft {
                display_name: session.display_name.clone(),
                member_count,
                message: format!("{} has left the chat room", session.display_name),
            },
        );
    }
}

pub async fn send(
    state: &AppState,
    session: &Session,
    room_id: RoomId,
    content: &str,
) -> ChatResult<()> {
    ensure_joined(session, room_id)?;
    state
        .gate
        .authorize(room_id, session.user_id, session.is_admin)
        .await?;
    let content = validate_content(content, state.settings.max_content_length)?;

    let message = state
        .messages
        .create_room_message(room_id, session.user_id, &content)
        .await?;

    state
        .hub
        .broadcast_to_room(room_id, &ServerEvent::ReceiveMessage { message });
    Ok(())
}

/// Soft-delete a message. Only its sender or an admin may do so.
pub async fn delete(
    state: &AppState,
    session: &Session,
    room_id: RoomId,
    message_id: MessageId,
) -> ChatResult<()> {
    ensure_joined(session, room_id)?;
    state
        .gate
        .authorize(room_id, session.user_id, session.is_admin)
        .await?;

    let message = message_in_room(state, room_id, message_id).await?;
    if message.sender_id != session.user_id && !session.is_admin {
        return Err(ChatError::NotAuthorized);
    }

    if !state.messages.soft_delete_room_message(message_id).await? {
        return Err(ChatError::MessageNotFound);
    }
    let redacted = message_in_room(state, room_id, message_id).await?;

    tracing::info!(
        user_id = session.user_id,
        room_id,
        message_id,
        "Message deleted"
    );
    state
        .hub
        .broadcast_to_room(room_id, &ServerEvent::UpdateMessage { message: redacted });
    Ok(())
}

pub async fn vote(
    state: &AppState,
    session: &Session,
    room_id: RoomId,
    message_id: MessageId,
    value: i64,
) -> ChatResult<()> {
    ensure_joined(session, room_id)?;
    state
        .gate
        .authorize(room_id, session.user_id, session.is_admin)
        .await?;

    let message = message_in_room(state, room_id, message_id).await?;
    if message.deleted {
        return Err(ChatError::MessageDeleted);
    }
    let target = state
        .ledger
        .target(VoteKind::RoomMessage, message_id)
        .await?
        .ok_or(ChatError::MessageNotFound)?;

    state.ledger.apply_vote(session.user_id, &target, value).await?;

    let updated = message_in_room(state, room_id, message_id).await?;
    state
        .hub
        .broadcast_to_room(room_id, &ServerEvent::UpdateMessage { message: updated });
    Ok(())
}

fn ensure_joined(session: &Session, room_id: RoomId) -> ChatResult<()> {
    if session.joined_rooms.contains(&room_id) {
        Ok(())
    } else {
        Err(ChatError::NotInRoom)
    }
}

/// Load a message and check it belongs to `room_id`.
async fn message_in_room(
    state: &AppState,
    room_id: RoomId,
    message_id: MessageId,
) -> ChatResult<RoomMessage> {
    state
        .messages
        .get_room_message(message_id)
        .await?
        .filter(|message| message.room_id == room_id)
        .ok_or(ChatError::MessageNotFound)
}
