use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::ChatResult;
use crate::geo::GeoPoint;
use crate::services::UserId;

/// Shared store of the current location of every connected user.
///
/// The trait is async so an external key-value service can stand in for the
/// in-memory implementation without touching callers.
#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// Insert or overwrite the user's location.
    async fn upsert(&self, user_id: UserId, point: GeoPoint) -> ChatResult<()>;

    /// Current location of the user, if one is on file.
    async fn position(&self, user_id: UserId) -> ChatResult<Option<GeoPoint>>;

    /// Every user whose stored location lies within `radius_m` meters of
    /// `center`, in ascending user id order.
    async fn within_radius(&self, center: GeoPoint, radius_m: f64) -> ChatResult<Vec<UserId>>;

    /// Drop the user's location only if it is still `expected`. Returns
    /// whether an entry was removed.
    async fn remove_if_unchanged(&self, user_id: UserId, expected: GeoPoint) -> ChatResult<bool>;
}

/// DashMap-backed [`GeoIndex`] for a single process.
#[derive(Debug, Clone, Default)]
pub struct MemoryGeoIndex {
    locations: Arc<DashMap<UserId, GeoPoint>>,
}

impl MemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[async_trait]
impl GeoIndex for MemoryGeoIndex {
    async fn upsert(&self, user_id: UserId, point: GeoPoint) -> ChatResult<()> {
        self.locations.insert(user_id, point);
        Ok(())
    }

    async fn position(&self, user_id: UserId) -> ChatResult<Option<GeoPoint>> {
        Ok(self.locations.get(&user_id).map(|entry| *entry.value()))
    }

    async fn within_radius(&self, center: GeoPoint, radius_m: f64) -> ChatResult<Vec<UserId>> {
        let mut ids: Vec<UserId> = self
            .locations
            .iter()
            .filter(|entry| center.within(entry.value(), radius_m))
            .map(|entry| *entry.key())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn remove_if_unchanged(&self, user_id: UserId, expected: GeoPoint) -> ChatResult<bool> {
        Ok(self
            .locations
            .remove_if(&user_id, |_, point| *point == expected)
            .is_some())
    }
}
