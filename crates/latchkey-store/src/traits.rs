//! The store contract consumed by coordination primitives

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::reply::ScriptReply;
use crate::script::Script;

/// Whole milliseconds of `ttl`, the precision every backend writes with.
///
/// A TTL under one millisecond would become `PX 0`, which Redis rejects, so
/// it is refused here for every backend alike.
pub fn ttl_millis(ttl: Duration) -> StoreResult<u64> {
    match u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX) {
        0 => Err(StoreError::Backend(format!(
            "invalid expire time {:?}, must be at least 1ms",
            ttl
        ))),
        millis => Ok(millis),
    }
}

/// A shared key-value store with atomic scripts and per-key TTL.
///
/// Implementations must execute each script as one indivisible unit: no other
/// client may observe or modify `keys` between the script's first read and
/// its last write.
#[async_trait]
pub trait Store: Send + Sync {
    /// Execute `script` atomically against `keys` with `args`.
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply>;

    /// Set `key` to `value`, expiring after `ttl` (millisecond precision).
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Delete `key`, returning the number of keys removed.
    async fn delete_key(&self, key: &str) -> StoreResult<u64>;

    /// Read the current value of `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remaining lifetime of `key`; `None` if absent or without expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        (**self).eval_script(script, keys, args).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        (**self).set_with_ttl(key, value, ttl).await
    }

    async fn delete_key(&self, key: &str) -> StoreResult<u64> {
        (**self).delete_key(key).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        (**self).ttl(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_floors_to_whole_milliseconds() {
        assert_eq!(ttl_millis(Duration::from_micros(1500)).unwrap(), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)).unwrap(), 2000);
        assert!(matches!(ttl_millis(Duration::ZERO), Err(StoreError::Backend(_))));
        assert!(matches!(
            ttl_millis(Duration::from_micros(999)),
            Err(StoreError::Backend(_))
        ));
    }
}
