//! Key-prefixing store decorator

use std::time::Duration;

use async_trait::async_trait;
use latchkey_common::ensure_start_with;

use crate::error::StoreResult;
use crate::reply::ScriptReply;
use crate::script::Script;
use crate::traits::Store;

/// Namespaces every key passed to the inner store.
///
/// Keys that already carry the prefix are passed through unchanged, so callers
/// may use either the short or the fully-qualified name.
pub struct PrefixedStore<S> {
    inner: S,
    prefix: String,
}

impl<S: Store> PrefixedStore<S> {
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn key(&self, key: &str) -> String {
        ensure_start_with(key, &self.prefix)
    }
}

#[async_trait]
impl<S: Store> Store for PrefixedStore<S> {
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        let keys: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
        self.inner.eval_script(script, &keys, args).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.inner.set_with_ttl(&self.key(key), value, ttl).await
    }

    async fn delete_key(&self, key: &str) -> StoreResult<u64> {
        self.inner.delete_key(&self.key(key)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(&self.key(key)).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.inner.ttl(&self.key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::script::ScriptKind;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_keys_are_prefixed_once() {
        let inner = Arc::new(MemoryStore::new());
        let store = PrefixedStore::new(inner.clone(), "app:");

        store.set_with_ttl("alive", "ok", Duration::from_secs(1)).await.unwrap();
        assert_eq!(inner.get("app:alive").await.unwrap().as_deref(), Some("ok"));
        assert_eq!(inner.get("alive").await.unwrap(), None);

        // Already-qualified names are not double-prefixed
        assert_eq!(store.get("app:alive").await.unwrap().as_deref(), Some("ok"));
        assert_eq!(store.delete_key("alive").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_script_keys_are_prefixed() {
        let inner = Arc::new(MemoryStore::new());
        let store = PrefixedStore::new(inner.clone(), "app:");
        let script = Script::new(ScriptKind::CompareAndSet, "-- cas");

        let reply = store
            .eval_script(&script, &["job".to_string()], &["t".to_string(), "1000".to_string()])
            .await
            .unwrap();
        assert!(reply.is_ok_marker());
        assert_eq!(inner.get("app:job").await.unwrap().as_deref(), Some("t"));
    }
}
