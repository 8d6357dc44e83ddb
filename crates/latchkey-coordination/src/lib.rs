//! Latchkey Coordination - primitives built on a shared key-value store
//!
//! This crate provides:
//! - [`DistributedLock`]: token-owned mutual exclusion with a leased key
//! - [`HeartbeatBeacon`]: periodic liveness key refresh with graceful stop
//!
//! Both talk to the store only through [`latchkey_store::Store`], and neither
//! depends on the other.

pub mod error;
pub mod heartbeat;
pub mod lock;

// Re-export lock and heartbeat types
pub use error::{BeaconError, HeartbeatError, LockError, LockResult};
pub use heartbeat::{BeaconState, HeartbeatBeacon, HeartbeatOptions};
pub use lock::{
    ACQUIRE_SCRIPT, DistributedLock, RELEASE_ERROR_STATUS, RELEASE_SCRIPT, ReleaseOutcome,
    release_status,
};
