//! Helpers for handler tests: an in-memory state and fake connections.

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ProximityConfig;
use crate::db::{init_memory_db, SqliteStore};
use crate::proximity::RegistryEntry;
use crate::services::UserId;
use crate::state::AppState;
use crate::ws::Session;

pub fn test_state() -> (AppState, SqliteStore) {
    let store = SqliteStore::new(init_memory_db().unwrap());
    let state = AppState::new(store.clone(), vec![7; 32], ProximityConfig::default());
    (state, store)
}

/// A session attached to the hub and registered with the default radius.
pub async fn connect(
    state: &AppState,
    user_id: UserId,
    display_name: &str,
    is_admin: bool,
) -> (Session, mpsc::UnboundedReceiver<Message>) {
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    state.hub.attach(connection_id, tx.clone());
    state
        .registry
        .register(RegistryEntry {
            user_id,
            connection_id,
            proximity_radius: state.settings.default_radius_m,
        })
        .await;
    let session = Session::new(
        connection_id,
        user_id,
        display_name.to_string(),
        is_admin,
        tx,
    );
    (session, rx)
}

/// Drain every queued text frame as JSON.
pub fn frames(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Message::Text(text) = msg {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    out
}

/// The next queued text frame as JSON. Panics when nothing is queued.
pub fn next_event(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
    match rx.try_recv() {
        Ok(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}
