use std::sync::Arc;

use crate::error::ChatResult;
use crate::geo::{GeoIndex, GeoPoint};
use crate::proximity::ConnectionRegistry;
use crate::services::UserId;
use crate::ws::ConnectionId;

/// A mutually nearby user and the connection to deliver to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyPeer {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
}

/// Computes mutual proximity sets.
///
/// A radius is both a broadcast and a receive setting: B is in A's set only
/// if B lies inside A's radius *and* A lies inside B's radius.
#[derive(Clone)]
pub struct ProximityMatcher {
    geo: Arc<dyn GeoIndex>,
    registry: Arc<dyn ConnectionRegistry>,
    default_radius_m: f64,
}

impl ProximityMatcher {
    pub fn new(
        geo: Arc<dyn GeoIndex>,
        registry: Arc<dyn ConnectionRegistry>,
        default_radius_m: f64,
    ) -> Self {
        Self {
            geo,
            registry,
            default_radius_m,
        }
    }

    /// Configured radius of a user, or the default when unknown.
    pub async fn radius_of(&self, user_id: UserId) -> f64 {
        self.registry
            .lookup(user_id)
            .await
            .map(|entry| entry.proximity_radius)
            .unwrap_or(self.default_radius_m)
    }

    /// Mutually nearby connections of `anchor_user` located at `anchor`.
    /// The anchor user is never part of the result.
    pub async fn mutual_nearby(
        &self,
        anchor_user: UserId,
        anchor: GeoPoint,
    ) -> ChatResult<Vec<NearbyPeer>> {
        let anchor_radius = self.radius_of(anchor_user).await;
        let candidates: Vec<UserId> = self
            .geo
            .within_radius(anchor, anchor_radius)
            .await?
            .into_iter()
            .filter(|id| *id != anchor_user)
            .collect();

        self.filter_mutual(anchor, &candidates).await
    }

    /// Keep the candidates whose own radius covers `anchor`, mapped to their
    /// live connections. Candidates without a stored location or without a
    /// registered connection are skipped.
    pub async fn filter_mutual(
        &self,
        anchor: GeoPoint,
        candidates: &[UserId],
    ) -> ChatResult<Vec<NearbyPeer>> {
        let mut peers = Vec::with_capacity(candidates.len());

        for &candidate in candidates {
            let Some(location) = self.geo.position(candidate).await? else {
                continue;
            };
            // Lookup after the geo read: the user may have disconnected meanwhile.
            let Some(entry) = self.registry.lookup(candidate).await else {
                continue;
            };
            if anchor.within(&location, entry.proximity_radius) {
                peers.push(NearbyPeer {
                    user_id: candidate,
                    connection_id: entry.connection_id,
                });
            }
        }

        peers.sort_by_key(|peer| peer.user_id);
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{meters_to_lat_degrees, MemoryGeoIndex};
    use crate::proximity::{MemoryConnectionRegistry, RegistryEntry};
    use uuid::Uuid;

    struct Fixture {
        geo: Arc<MemoryGeoIndex>,
        registry: Arc<MemoryConnectionRegistry>,
        matcher: ProximityMatcher,
    }

    fn fixture() -> Fixture {
        let geo = Arc::new(MemoryGeoIndex::new());
        let registry = Arc::new(MemoryConnectionRegistry::new());
        let matcher = ProximityMatcher::new(geo.clone(), registry.clone(), 1600.0);
        Fixture {
            geo,
            registry,
            matcher,
        }
    }

    /// Place a connected user `north_m` meters north of the origin.
    async fn place(f: &Fixture, user_id: UserId, north_m: f64, radius: f64) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        f.registry
            .register(RegistryEntry {
                user_id,
                connection_id,
                proximity_radius: radius,
            })
            .await;
        f.geo
            .upsert(user_id, GeoPoint::new(meters_to_lat_degrees(north_m), 0.0))
            .await
            .unwrap();
        connection_id
    }

    fn origin() -> GeoPoint {
        GeoPoint::new(0.0, 0.0)
    }

    #[tokio::test]
    async fn test_mutual_match_requires_both_radii() {
        let f = fixture();
        place(&f, 1, 0.0, 1000.0).await;
        let near_conn = place(&f, 2, 300.0, 500.0).await;
        // Inside A's radius, but A is outside B's 100m radius.
        place(&f, 3, 400.0, 100.0).await;
        // Outside A's radius entirely.
        place(&f, 4, 1500.0, 5000.0).await;

        let peers = f.matcher.mutual_nearby(1, origin()).await.unwrap();
        assert_eq!(
            peers,
            vec![NearbyPeer {
                user_id: 2,
                connection_id: near_conn
            }]
        );
    }

    #[tokio::test]
    async fn test_mutual_relation_is_symmetric() {
        let f = fixture();
        place(&f, 1, 0.0, 800.0).await;
        place(&f, 2, 600.0, 700.0).await;
        place(&f, 3, 750.0, 2000.0).await;

        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(meters_to_lat_degrees(600.0), 0.0);
        let c = GeoPoint::new(meters_to_lat_degrees(750.0), 0.0);

        let of = |peers: Vec<NearbyPeer>| peers.into_iter().map(|p| p.user_id).collect::<Vec<_>>();
        let a_set = of(f.matcher.mutual_nearby(1, a).await.unwrap());
        let b_set = of(f.matcher.mutual_nearby(2, b).await.unwrap());
        let c_set = of(f.matcher.mutual_nearby(3, c).await.unwrap());

        for (x, x_set) in [(1, &a_set), (2, &b_set), (3, &c_set)] {
            for y in x_set {
                let y_set = match y {
                    1 => &a_set,
                    2 => &b_set,
                    _ => &c_set,
                };
                assert!(y_set.contains(&x), "{x} sees {y} but not vice versa");
            }
        }
        assert_eq!(a_set, vec![2, 3]);
        // B (700m radius) reaches C at 150m, C (2000m) reaches B.
        assert_eq!(b_set, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_disconnected_and_unlocated_users_are_dropped() {
        let f = fixture();
        place(&f, 1, 0.0, 1000.0).await;
        let gone = place(&f, 2, 100.0, 1000.0).await;
        f.registry.unregister(2, gone).await;

        // Registered but never sent a location.
        f.registry
            .register(RegistryEntry {
                user_id: 3,
                connection_id: Uuid::new_v4(),
                proximity_radius: 1000.0,
            })
            .await;

        let peers = f.matcher.filter_mutual(origin(), &[2, 3]).await.unwrap();
        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_anchor_uses_default_radius() {
        let f = fixture();
        place(&f, 2, 1500.0, 5000.0).await;
        place(&f, 3, 1700.0, 5000.0).await;

        assert_eq!(f.matcher.radius_of(99).await, 1600.0);
        let peers = f.matcher.mutual_nearby(99, origin()).await.unwrap();
        assert_eq!(peers.iter().map(|p| p.user_id).collect::<Vec<_>>(), vec![2]);
    }
}
