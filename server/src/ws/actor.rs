use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::chat::rooms;
use crate::db::models::User;
use crate::proximity::RegistryEntry;
use crate::state::AppState;
use crate::ws::protocol::{self, ServerEvent};
use crate::ws::{Session, CLOSE_SUPERSEDED};

/// Ping interval: server sends WebSocket ping every 30 seconds.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: processes incoming frames one at a time, in receipt order
///
/// Any part of the system can reach this client through the hub, which holds
/// a clone of the channel sender.
pub async fn run_connection(socket: WebSocket, state: AppState, user: User) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let connection_id = Uuid::new_v4();
    let user_id = user.id;
    let radius = user
        .proximity_radius
        .unwrap_or(state.settings.default_radius_m);

    state.hub.attach(connection_id, tx.clone());
    let superseded = state
        .registry
        .register(RegistryEntry {
            user_id,
            connection_id,
            proximity_radius: radius,
        })
        .await;
    if let Some(old) = superseded {
        tracing::info!(
            user_id,
            old_connection_id = %old.connection_id,
            "Closing superseded connection"
        );
        state
            .hub
            .close(old.connection_id, CLOSE_SUPERSEDED, "Connected from another session");
    }

    let mut session = Session::new(
        connection_id,
        user_id,
        user.display_name.clone(),
        user.is_admin,
        tx.clone(),
    );
    session.last_location = match state.geo.position(user_id).await {
        Ok(point) => point,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Failed to read stored location");
            None
        }
    };

    tracing::info!(
        user_id,
        connection_id = %connection_id,
        radius_m = radius,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop. Also ends when the writer stops, e.g. after sending a
    // close frame to a superseded connection.
    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut writer_handle => {
                tracing::debug!(user_id, "Writer finished, ending reader");
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &mut session, &state).await;
                }
                Message::Binary(_) => {
                    session.reply(&ServerEvent::error("Invalid event"));
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    disconnect(&state, &mut session).await;

    tracing::info!(
        user_id,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

/// Leave every room, then drop the registry entry if it still belongs to this
/// connection. The location is only removed while it still holds the value
/// this connection last saw, so a newer connection's update survives.
async fn disconnect(state: &AppState, session: &mut Session) {
    rooms::leave_all(state, session);
    state.hub.detach(session.connection_id);

    if !state
        .registry
        .unregister(session.user_id, session.connection_id)
        .await
    {
        tracing::debug!(
            user_id = session.user_id,
            "Registry entry owned by a newer connection, keeping location"
        );
        return;
    }

    let Some(point) = session.last_location else {
        return;
    };
    match state.geo.remove_if_unchanged(session.user_id, point).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!(
            user_id = session.user_id,
            "Location rewritten by a newer connection, keeping it"
        ),
        Err(e) => tracing::warn!(
            user_id = session.user_id,
            error = %e,
            "Failed to remove location on disconnect"
        ),
    }
}

/// Writer task: receives messages from mpsc channel and forwards them to the
/// WebSocket sink. Stops after a close frame.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let is_close = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || is_close {
            break;
        }
    }
}
