//! Event handlers for room chat and proximity messaging, plus the geofence
//! gate and the vote ledger they rely on.

pub mod gate;
pub mod nearby;
pub mod rooms;
pub mod validate;
pub mod votes;

pub use gate::RoomGate;
pub use votes::VoteLedger;

#[cfg(test)]
pub(crate) mod test_support;
