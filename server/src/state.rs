use std::sync::Arc;

use crate::chat::{RoomGate, VoteLedger};
use crate::config::ProximityConfig;
use crate::db::SqliteStore;
use crate::geo::{GeoIndex, MemoryGeoIndex};
use crate::proximity::{ConnectionRegistry, MemoryConnectionRegistry, ProximityMatcher};
use crate::services::{MessageStore, RoomDirectory, UserDirectory};
use crate::ws::ConnectionHub;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    pub users: Arc<dyn UserDirectory>,
    pub rooms: Arc<dyn RoomDirectory>,
    pub messages: Arc<dyn MessageStore>,
    /// Current location of every connected user
    pub geo: Arc<dyn GeoIndex>,
    /// user id -> live connection and proximity radius
    pub registry: Arc<dyn ConnectionRegistry>,
    /// Local connection senders and room fan-out groups
    pub hub: ConnectionHub,
    pub gate: RoomGate,
    pub matcher: ProximityMatcher,
    pub ledger: VoteLedger,
    pub settings: ProximityConfig,
}

impl AppState {
    /// State backed by one SQLite store and in-memory geo index and registry.
    pub fn new(store: SqliteStore, jwt_secret: Vec<u8>, settings: ProximityConfig) -> Self {
        let store = Arc::new(store);
        let geo: Arc<dyn GeoIndex> = Arc::new(MemoryGeoIndex::new());
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(MemoryConnectionRegistry::new());

        Self {
            jwt_secret,
            users: store.clone(),
            rooms: store.clone(),
            messages: store.clone(),
            gate: RoomGate::new(store.clone(), geo.clone()),
            matcher: ProximityMatcher::new(
                geo.clone(),
                registry.clone(),
                settings.default_radius_m,
            ),
            ledger: VoteLedger::new(store),
            geo,
            registry,
            hub: ConnectionHub::new(),
            settings,
        }
    }
}
