//! JSON wire protocol and the per-event dispatcher.
//!
//! Frames are `{"event": "<name>", "data": {...}}` in both directions.

use axum::extract::ws::Message;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;

use crate::chat::{nearby, rooms};
use crate::db::models::{ChatRoom, ProximityMessage, RoomMessage};
use crate::error::{ChatResult, ErrorKind, GENERIC_ERROR_MESSAGE};
use crate::services::{MessageId, RoomId};
use crate::state::AppState;
use crate::ws::Session;

/// Events a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    Join { room_id: RoomId },

    Leave,

    #[serde(rename_all = "camelCase")]
    Send { room_id: RoomId, content: String },

    #[serde(rename_all = "camelCase")]
    Delete {
        room_id: RoomId,
        message_id: MessageId,
    },

    #[serde(rename_all = "camelCase")]
    Vote {
        room_id: RoomId,
        message_id: MessageId,
        value: i64,
    },

    UpdateLocation { latitude: f64, longitude: f64 },

    SendProximityMessage {
        latitude: f64,
        longitude: f64,
        content: String,
    },

    #[serde(rename_all = "camelCase")]
    ProximityTyping { is_typing: bool },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::Send { .. } => "send",
            Self::Delete { .. } => "delete",
            Self::Vote { .. } => "vote",
            Self::UpdateLocation { .. } => "updateLocation",
            Self::SendProximityMessage { .. } => "sendProximityMessage",
            Self::ProximityTyping { .. } => "proximityTyping",
        }
    }
}

/// A room message as seen by one particular user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: RoomMessage,
    pub is_own_message: bool,
    pub user_vote: Option<i64>,
}

/// Events the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    JoinedRoom {
        room: ChatRoom,
        last_messages: Vec<MessageView>,
    },

    #[serde(rename_all = "camelCase")]
    UserJoined {
        display_name: String,
        room_name: String,
        member_count: usize,
        message: String,
    },

    #[serde(rename_all = "camelCase")]
    UserLeft {
        display_name: String,
        member_count: usize,
        message: String,
    },

    ReceiveMessage { message: RoomMessage },

    UpdateMessage { message: RoomMessage },

    NearbyUserCount { count: usize },

    ReceiveProximityMessage { message: ProximityMessage },

    #[serde(rename_all = "camelCase")]
    NearbyUserTyping { display_name: String, is_typing: bool },

    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Encode as a text frame. `None` only if serialization fails.
    pub fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                None
            }
        }
    }
}

/// Handle an incoming text frame.
/// Decodes the event, dispatches it, and turns any failure into an `error`
/// event for this connection only.
pub async fn handle_text_message(text: &str, session: &mut Session, state: &AppState) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                user_id = session.user_id,
                error = %e,
                "Failed to decode client event"
            );
            session.reply(&ServerEvent::error("Invalid event"));
            return;
        }
    };

    let name = event.name();
    let outcome = AssertUnwindSafe(dispatch_event(event, session, state))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            if err.kind() == ErrorKind::Internal {
                tracing::warn!(
                    user_id = session.user_id,
                    event = name,
                    error = %err,
                    "Event handler failed"
                );
            } else {
                tracing::debug!(
                    user_id = session.user_id,
                    event = name,
                    error = %err,
                    "Event rejected"
                );
            }
            session.reply(&ServerEvent::error(err.client_message()));
        }
        Err(_) => {
            tracing::error!(
                user_id = session.user_id,
                event = name,
                "Event handler panicked"
            );
            session.reply(&ServerEvent::error(GENERIC_ERROR_MESSAGE));
        }
    }
}

/// Dispatch a decoded event to its handler.
async fn dispatch_event(event: ClientEvent, session: &mut Session, state: &AppState) -> ChatResult<()> {
    match event {
        ClientEvent::Join { room_id } => rooms::join(state, session, room_id).await,
        ClientEvent::Leave => {
            rooms::leave_all(state, session);
            Ok(())
        }
        ClientEvent::Send { room_id, content } => {
            rooms::send(state, session, room_id, &content).await
        }
        ClientEvent::Delete {
            room_id,
            message_id,
        } => rooms::delete(state, session, room_id, message_id).await,
        ClientEvent::Vote {
            room_id,
            message_id,
            value,
        } => rooms::vote(state, session, room_id, message_id, value).await,
        ClientEvent::UpdateLocation {
            latitude,
            longitude,
        } => nearby::update_location(state, session, latitude, longitude).await,
        ClientEvent::SendProximityMessage {
            latitude,
            longitude,
            content,
        } => nearby::send_proximity_message(state, session, latitude, longitude, &content).await,
        ClientEvent::ProximityTyping { is_typing } => {
            nearby::typing(state, session, is_typing).await;
            Ok(())
        }
    }
}
