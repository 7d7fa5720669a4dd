//! Who is connected, and who is close enough to whom.

pub mod matcher;
pub mod registry;

pub use matcher::{NearbyPeer, ProximityMatcher};
pub use registry::{ConnectionRegistry, MemoryConnectionRegistry, RegistryEntry};
