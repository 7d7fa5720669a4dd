use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::{self, AuthFailure};
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. Auth is via `?token=JWT`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. The token is checked before upgrading, so a
/// refused client gets a plain HTTP 401/403 with the reason as body.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user = match auth::authenticate(
        &state.jwt_secret,
        state.users.as_ref(),
        params.token.as_deref(),
    )
    .await
    {
        Ok(user) => user,
        Err(failure) => return reject(failure),
    };

    tracing::info!(user_id = user.id, "WebSocket connection authenticated");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, user))
}

fn reject(failure: AuthFailure) -> Response {
    match &failure {
        AuthFailure::Internal(e) => {
            tracing::warn!(error = %e, "WebSocket auth failed on storage error")
        }
        other => tracing::debug!(reason = %other, "WebSocket auth refused"),
    }
    (failure.status(), failure.to_string()).into_response()
}
