//! Redis store implementation
//!
//! Scripts go through `redis::Script`, which issues `EVALSHA` and falls back to
//! `EVAL` when the server has not cached the script yet. Every command is
//! bounded by the configured response timeout so a hung connection surfaces
//! as [`StoreError::Timeout`] instead of blocking a heartbeat tick forever.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use latchkey_common::RedisSettings;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult, Value};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::prefixed::PrefixedStore;
use crate::reply::ScriptReply;
use crate::script::Script;
use crate::traits::{Store, ttl_millis};

/// Prepared scripts keyed by Lua source, so each source is hashed once
#[derive(Default)]
struct ScriptCache {
    scripts: Mutex<HashMap<String, Arc<redis::Script>>>,
}

impl ScriptCache {
    fn get(&self, source: &str) -> Arc<redis::Script> {
        let mut scripts = self.scripts.lock();
        if let Some(script) = scripts.get(source) {
            return Arc::clone(script);
        }
        let script = Arc::new(redis::Script::new(source));
        scripts.insert(source.to_string(), Arc::clone(&script));
        script
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.scripts.lock().len()
    }
}

/// Redis-backed [`Store`]
#[derive(Clone)]
pub struct RedisStore {
    /// Reconnecting multiplexed connection
    manager: ConnectionManager,
    response_timeout: Duration,
    scripts: Arc<ScriptCache>,
}

impl RedisStore {
    /// Connect to the server described by `settings`.
    ///
    /// The key prefix in `settings` is not applied here; use [`connect_store`]
    /// to get a prefixed handle.
    pub async fn connect(settings: &RedisSettings) -> StoreResult<Self> {
        let client = Client::open(settings.url.as_str())
            .map_err(|e| StoreError::Connection(format!("invalid redis url: {}", e)))?;
        let manager = ConnectionManager::new(client).await?;

        info!("Connected to redis at {}", settings.url);

        Ok(Self {
            manager,
            response_timeout: settings.response_timeout(),
            scripts: Arc::new(ScriptCache::default()),
        })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.response_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(format!(
                "{} exceeded {}ms",
                op,
                self.response_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        let lua = self.scripts.get(script.source());
        let mut invocation = lua.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.manager.clone();
        let value: Value = self
            .bounded("EVALSHA", invocation.invoke_async(&mut conn))
            .await
            .map_err(|e| match e {
                StoreError::Backend(msg) => StoreError::Script(msg),
                other => other,
            })?;

        debug!("Script {} on {:?} replied {:?}", script.kind(), keys, value);
        ScriptReply::try_from(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let millis = ttl_millis(ttl)?;
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(millis);
        self.bounded("SET", cmd.query_async::<()>(&mut conn)).await
    }

    async fn delete_key(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.bounded("DEL", cmd.query_async::<u64>(&mut conn)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.bounded("GET", cmd.query_async::<Option<String>>(&mut conn))
            .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let millis = self.bounded("PTTL", cmd.query_async::<i64>(&mut conn)).await?;
        // -2: no such key, -1: no expiry
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}

/// Connect to Redis and wrap the handle in the configured key prefix.
pub async fn connect_store(settings: &RedisSettings) -> StoreResult<Arc<dyn Store>> {
    let store = RedisStore::connect(settings).await?;
    if settings.key_prefix.is_empty() {
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(PrefixedStore::new(store, settings.key_prefix.clone())))
}
