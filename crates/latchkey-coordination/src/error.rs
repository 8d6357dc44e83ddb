//! Error types for coordination primitives

use std::time::Duration;

use latchkey_store::StoreError;

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations.
///
/// Losing a race is not an error: `acquire` returns `false` and `release`
/// reports [`crate::ReleaseOutcome::NotOwner`] or
/// [`crate::ReleaseOutcome::NotHeld`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Store could not run the script (connectivity or evaluation failure)
    #[error("lock store error: {0}")]
    Store(#[from] StoreError),

    /// Release script replied with a status outside -1, 0 and the delete count
    #[error("unexpected release status: {0}")]
    UnexpectedStatus(i64),
}

/// A failed liveness refresh, handed to the beacon's error callback
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("heartbeat refresh failed ({count} in a row): {error}")]
pub struct HeartbeatError {
    /// The store error behind this failure
    #[source]
    pub error: StoreError,
    /// Consecutive failures including this one, starting at 1
    pub count: u64,
}

/// Errors from starting or stopping a beacon
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BeaconError {
    #[error("heartbeat beacon is already running")]
    AlreadyRunning,

    /// Interval too short to be written as a whole-millisecond TTL
    #[error("heartbeat interval must be at least 1ms, got {0:?}")]
    InvalidInterval(Duration),

    /// Liveness key could not be removed after the loop stopped
    #[error("heartbeat store error: {0}")]
    Store(#[from] StoreError),
}
