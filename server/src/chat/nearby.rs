//! Location updates and mutual-proximity messaging.

use crate::error::{ChatError, ChatResult};
use crate::geo::GeoPoint;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;
use crate::ws::Session;

use super::validate::validate_content;

/// Store the caller's location and reply with the size of its mutual set.
pub async fn update_location(
    state: &AppState,
    session: &mut Session,
    latitude: f64,
    longitude: f64,
) -> ChatResult<()> {
    let point = GeoPoint::validated(latitude, longitude)?;
    state.geo.upsert(session.user_id, point).await?;
    session.last_location = Some(point);

    let peers = state.matcher.mutual_nearby(session.user_id, point).await?;
    tracing::debug!(
        user_id = session.user_id,
        nearby = peers.len(),
        "Location updated"
    );
    session.reply(&ServerEvent::NearbyUserCount { count: peers.len() });
    Ok(())
}

/// Persist a proximity message and deliver it to every mutually nearby
/// connection, plus an echo to the sender.
///
/// The audience is anchored on the stored location, not on the coordinates
/// claimed in the event; those are only recorded on the message.
pub async fn send_proximity_message(
    state: &AppState,
    session: &Session,
    latitude: f64,
    longitude: f64,
    content: &str,
) -> ChatResult<()> {
    let claimed = GeoPoint::validated(latitude, longitude)?;
    let content = validate_content(content, state.settings.max_content_length)?;

    let anchor = state
        .geo
        .position(session.user_id)
        .await?
        .ok_or(ChatError::LocationUnavailable)?;

    let message = state
        .messages
        .create_proximity_message(session.user_id, &content, claimed)
        .await?;

    let peers = state.matcher.mutual_nearby(session.user_id, anchor).await?;
    let event = ServerEvent::ReceiveProximityMessage { message };
    for peer in &peers {
        state.hub.send_to(peer.connection_id, &event);
    }
    session.reply(&event);

    tracing::debug!(
        user_id = session.user_id,
        recipients = peers.len(),
        "Proximity message delivered"
    );
    Ok(())
}

/// Relay a typing indicator to the mutual set. Best effort: failures are
/// logged and dropped.
pub async fn typing(state: &AppState, session: &Session, is_typing: bool) {
    if let Err(e) = relay_typing(state, session, is_typing).await {
        tracing::debug!(
            user_id = session.user_id,
            error = %e,
            "Typing indicator dropped"
        );
    }
}

async fn relay_typing(state: &AppState, session: &Session, is_typing: bool) -> ChatResult<()> {
    let anchor = state
        .geo
        .position(session.user_id)
        .await?
        .ok_or(ChatError::LocationUnavailable)?;

    let event = ServerEvent::NearbyUserTyping {
        display_name: session.display_name.clone(),
        is_typing,
    };
    for peer in state.matcher.mutual_nearby(session.user_id, anchor).await? {
        state.hub.send_to(peer.connection_id, &event);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::test_support::{connect, frames, next_event, test_state};
    use crate::db::sqlite::NewUser;
    use crate::geo::meters_to_lat_degrees;

    fn north(meters: f64) -> f64 {
        meters_to_lat_degrees(meters)
    }

    #[tokio::test]
    async fn test_update_location_reports_mutual_count() {
        let (state, store) = test_state();
        let alice = store
            .create_user(NewUser::verified("a@example.com", "alice"))
            .await
            .unwrap();
        let bob = store
            .create_user(NewUser::verified("b@example.com", "bob"))
            .await
            .unwrap();
        let (mut a, mut a_rx) = connect(&state, alice, "alice", false).await;
        let (mut b, mut b_rx) = connect(&state, bob, "bob", false).await;

        update_location(&state, &mut a, 0.0, 0.0).await.unwrap();
        assert_eq!(next_event(&mut a_rx)["data"]["count"], 0);

        update_location(&state, &mut b, north(300.0), 0.0).await.unwrap();
        let count = next_event(&mut b_rx);
        assert_eq!(count["event"], "nearbyUserCount");
        assert_eq!(count["data"]["count"], 1);

        assert!(matches!(
            update_location(&state, &mut a, 95.0, 0.0).await,
            Err(ChatError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_proximity_message_reaches_mutual_set_and_echoes() {
        let (state, store) = test_state();
        let alice = store
            .create_user(NewUser::verified("a@example.com", "alice"))
            .await
            .unwrap();
        let bob = store
            .create_user(NewUser::verified("b@example.com", "bob"))
            .await
            .unwrap();
        let carol = store
            .create_user(NewUser::verified("c@example.com", "carol"))
            .await
            .unwrap();
        let (mut a, mut a_rx) = connect(&state, alice, "alice", false).await;
        let (mut b, mut b_rx) = connect(&state, bob, "bob", false).await;
        let (mut c, mut c_rx) = connect(&state, carol, "carol", false).await;

        update_location(&state, &mut a, 0.0, 0.0).await.unwrap();
        update_location(&state, &mut b, north(500.0), 0.0).await.unwrap();
        update_location(&state, &mut c, north(5000.0), 0.0).await.unwrap();
        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            frames(rx);
        }

        send_proximity_message(&state, &a, 0.0, 0.0, " hello nearby ")
            .await
            .unwrap();

        let echo = next_event(&mut a_rx);
        assert_eq!(echo["event"], "receiveProximityMessage");
        assert_eq!(echo["data"]["message"]["content"], "hello nearby");
        let got = next_event(&mut b_rx);
        assert_eq!(got["data"]["message"]["senderDisplayName"], "alice");
        assert!(frames(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn test_proximity_message_needs_stored_location() {
        let (state, store) = test_state();
        let alice = store
            .create_user(NewUser::verified("a@example.com", "alice"))
            .await
            .unwrap();
        let (a, mut a_rx) = connect(&state, alice, "alice", false).await;

        let err = send_proximity_message(&state, &a, 0.0, 0.0, "anyone?")
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::LocationUnavailable));
        assert!(frames(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_is_relayed_and_never_fails() {
        let (state, store) = test_state();
        let alice = store
            .create_user(NewUser::verified("a@example.com", "alice"))
            .await
            .unwrap();
        let bob = store
            .create_user(NewUser::verified("b@example.com", "bob"))
            .await
            .unwrap();
        let (mut a, mut a_rx) = connect(&state, alice, "alice", false).await;
        let (mut b, mut b_rx) = connect(&state, bob, "bob", false).await;

        // No location yet: silently dropped.
        typing(&state, &a, true).await;
        assert!(frames(&mut b_rx).is_empty());

        update_location(&state, &mut a, 0.0, 0.0).await.unwrap();
        update_location(&state, &mut b, north(100.0), 0.0).await.unwrap();
        frames(&mut a_rx);
        frames(&mut b_rx);

        typing(&state, &a, true).await;
        let got = next_event(&mut b_rx);
        assert_eq!(got["event"], "nearbyUserTyping");
        assert_eq!(got["data"]["displayName"], "alice");
        assert_eq!(got["data"]["isTyping"], true);
        assert!(frames(&mut a_rx).is_empty());
    }
}
