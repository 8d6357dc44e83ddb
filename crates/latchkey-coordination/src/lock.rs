//! Distributed Lock Implementation
//!
//! A lock is a single store key whose value is the holder's token. Both
//! transitions run as atomic scripts so no other client can slip a write in
//! between the ownership check and the update:
//! - acquire: refresh the lease if the key already holds our token, otherwise
//!   `SET NX PX`
//! - release: delete the key only while it still holds our token
//!
//! The lock object itself keeps no ownership state. Two `DistributedLock`s with
//! the same key and token are the same logical holder, and dropping one has no
//! effect on the store.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use latchkey_common::{LockSettings, lease_millis, random_token};
use latchkey_store::{Script, ScriptKind, Store};
use tracing::debug;

use crate::error::{LockError, LockResult};

/// Acquire-or-renew script.
/// `KEYS[1]` = lock key, `ARGV[1]` = token, `ARGV[2]` = lease in milliseconds.
pub const ACQUIRE_SCRIPT: &str = r#"if redis.call("GET", KEYS[1]) == ARGV[1] then
    redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
    return "OK"
else
    return redis.call("SET", KEYS[1], ARGV[1], "NX", "PX", ARGV[2])
end"#;

/// Owner-checked delete script.
/// Replies `-1` when the key is absent, `0` when another token holds it and
/// the delete count otherwise.
pub const RELEASE_SCRIPT: &str = r#"local val = redis.call("GET", KEYS[1])
if val then
    if val == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
else
    return -1
end"#;

static ACQUIRE: Script = Script::new(ScriptKind::CompareAndSet, ACQUIRE_SCRIPT);
static RELEASE: Script = Script::new(ScriptKind::CompareAndDelete, RELEASE_SCRIPT);

/// Status reported for a release that failed with an error
pub const RELEASE_ERROR_STATUS: i64 = -2;

/// Outcome of [`DistributedLock::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Key held our token and was deleted
    Released(u64),
    /// Key is held by a different token and was left alone
    NotOwner,
    /// Key did not exist (expired or already released)
    NotHeld,
}

impl ReleaseOutcome {
    /// Integer form: delete count, `0` or `-1`.
    pub fn status(&self) -> i64 {
        match self {
            ReleaseOutcome::Released(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            ReleaseOutcome::NotOwner => 0,
            ReleaseOutcome::NotHeld => -1,
        }
    }

    pub fn from_status(status: i64) -> LockResult<Self> {
        match status {
            -1 => Ok(ReleaseOutcome::NotHeld),
            0 => Ok(ReleaseOutcome::NotOwner),
            n if n > 0 => Ok(ReleaseOutcome::Released(n as u64)),
            other => Err(LockError::UnexpectedStatus(other)),
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released(_))
    }
}

/// Map a release result onto the integer contract: `1` released, `0` not
/// ours, `-1` already gone, `-2` any error.
pub fn release_status(result: &LockResult<ReleaseOutcome>) -> i64 {
    match result {
        Ok(outcome) => outcome.status(),
        Err(_) => RELEASE_ERROR_STATUS,
    }
}

/// Token-owned mutual exclusion lock
pub struct DistributedLock {
    store: Arc<dyn Store>,
    key: String,
    token: String,
    ttl_seconds: AtomicU32,
}

impl DistributedLock {
    pub fn new(
        store: Arc<dyn Store>,
        key: impl Into<String>,
        token: impl Into<String>,
        ttl_seconds: u32,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            token: token.into(),
            ttl_seconds: AtomicU32::new(ttl_seconds),
        }
    }

    /// Create a lock with a freshly generated holder token.
    pub fn with_random_token(store: Arc<dyn Store>, key: impl Into<String>, ttl_seconds: u32) -> Self {
        Self::new(store, key, random_token(), ttl_seconds)
    }

    /// Create a lock using the configured default lease.
    pub fn from_settings(
        store: Arc<dyn Store>,
        key: impl Into<String>,
        token: impl Into<String>,
        settings: &LockSettings,
    ) -> Self {
        Self::new(store, key, token, settings.ttl_seconds)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn ttl_seconds(&self) -> u32 {
        self.ttl_seconds.load(Ordering::Relaxed)
    }

    /// Change the lease used by subsequent `acquire` calls.
    /// Does not touch the store.
    pub fn set_expire(&self, seconds: u32) {
        self.ttl_seconds.store(seconds, Ordering::Relaxed);
    }

    /// Try once to take the lock, or extend it if this token already holds it.
    ///
    /// Returns `Ok(false)` when another token holds the key. There is no
    /// internal retry.
    pub async fn acquire(&self) -> LockResult<bool> {
        let seconds = self.ttl_seconds();
        let args = [self.token.clone(), lease_millis(seconds).to_string()];
        let reply = self
            .store
            .eval_script(&ACQUIRE, std::slice::from_ref(&self.key), &args)
            .await?;

        let acquired = reply.is_ok_marker();
        debug!(
            "Lock acquire key={} acquired={} lease_secs={}",
            self.key, acquired, seconds
        );
        Ok(acquired)
    }

    /// Delete the key if it still holds this token.
    pub async fn release(&self) -> LockResult<ReleaseOutcome> {
        let reply = self
            .store
            .eval_script(
                &RELEASE,
                std::slice::from_ref(&self.key),
                std::slice::from_ref(&self.token),
            )
            .await?;

        let outcome = ReleaseOutcome::from_status(reply.as_int()?)?;
        debug!("Lock release key={} outcome={:?}", self.key, outcome);
        Ok(outcome)
    }
}

impl fmt::Display for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key={}, v={}, seconds={}",
            self.key,
            self.token,
            self.ttl_seconds()
        )
    }
}

impl fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("ttl_seconds", &self.ttl_seconds())
            .finish()
    }
}
