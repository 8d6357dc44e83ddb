//! In-memory store implementation
//!
//! Emulates the store for tests and single-process deployments. All keys live
//! behind one mutex, so each built-in script runs as a single critical
//! section and is atomic with respect to every other operation, the same
//! guarantee Redis gives by running scripts on its command thread.
//! Expiry is lazy: a key past its deadline is dropped the next time anything
//! touches it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::reply::ScriptReply;
use crate::script::{Script, ScriptKind};
use crate::traits::{Store, ttl_millis};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Mutex-guarded map with per-key deadlines
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    /// Remaining operations that fail with an injected connection error
    failures: AtomicU32,
    /// Successful `set_with_ttl` calls
    set_count: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with [`StoreError::Connection`].
    pub fn inject_failures(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful `set_with_ttl` calls so far.
    pub fn set_count(&self) -> u64 {
        self.set_count.load(Ordering::SeqCst)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| !e.is_expired(now));
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_failure(&self) -> StoreResult<()> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Connection("injected failure".to_string()));
        }
        Ok(())
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn compare_and_set(&self, keys: &[String], args: &[String]) -> StoreResult<ScriptReply> {
        let key = single_key(keys)?;
        let (token, lease_ms) = match args {
            [token, lease, ..] => (token, parse_millis(lease)?),
            _ => return Err(StoreError::Script("compare-and-set expects 2 arguments".to_string())),
        };

        let now = Instant::now();
        let expires_at = Some(now + Duration::from_millis(lease_ms));
        let mut entries = self.entries.lock();

        match Self::live(&mut entries, key, now) {
            Some(entry) if &entry.value == token => {
                entry.expires_at = expires_at;
                Ok(ScriptReply::Status("OK".to_string()))
            }
            Some(_) => Ok(ScriptReply::Nil),
            None => {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: token.clone(),
                        expires_at,
                    },
                );
                Ok(ScriptReply::Okay)
            }
        }
    }

    fn compare_and_delete(&self, keys: &[String], args: &[String]) -> StoreResult<ScriptReply> {
        let key = single_key(keys)?;
        let Some(token) = args.first() else {
            return Err(StoreError::Script("compare-and-delete expects 1 argument".to_string()));
        };

        let now = Instant::now();
        let mut entries = self.entries.lock();

        let held_by_token = Self::live(&mut entries, key, now).map(|e| &e.value == token);
        let reply = match held_by_token {
            None => ScriptReply::Int(-1),
            Some(true) => {
                entries.remove(key);
                ScriptReply::Int(1)
            }
            Some(false) => ScriptReply::Int(0),
        };
        Ok(reply)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn eval_script(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<ScriptReply> {
        self.check_failure()?;
        match script.kind() {
            ScriptKind::CompareAndSet => self.compare_and_set(keys, args),
            ScriptKind::CompareAndDelete => self.compare_and_delete(keys, args),
            ScriptKind::Custom => {
                debug!("Memory store cannot evaluate custom scripts");
                Err(StoreError::UnsupportedScript(script.kind().to_string()))
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check_failure()?;
        let millis = ttl_millis(ttl)?;
        let expires_at = Some(Instant::now() + Duration::from_millis(millis));
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        self.set_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> StoreResult<u64> {
        self.check_failure()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let removed = match entries.remove(key) {
            Some(entry) if !entry.is_expired(now) => 1,
            _ => 0,
        };
        Ok(removed)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_failure()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(Self::live(&mut entries, key, now).map(|e| e.value.clone()))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        self.check_failure()?;
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(Self::live(&mut entries, key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }
}

fn single_key(keys: &[String]) -> StoreResult<&String> {
    match keys {
        [key] => Ok(key),
        _ => Err(StoreError::Script(format!(
            "expected exactly 1 key, got {}",
            keys.len()
        ))),
    }
}

fn parse_millis(raw: &str) -> StoreResult<u64> {
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(StoreError::Script(format!("invalid expire time '{}'", raw))),
    }
}
