//! Latchkey Store - the key-value store seen by coordination primitives
//!
//! This crate provides:
//! - The [`Store`] trait: atomic script execution, TTL writes and deletes
//! - [`RedisStore`]: production backend over a reconnecting Redis connection
//! - [`MemoryStore`]: in-process backend emulating the built-in scripts
//! - [`PrefixedStore`]: decorator namespacing every key

pub mod error;
pub mod memory;
pub mod prefixed;
pub mod redis_backend;
pub mod reply;
pub mod script;
pub mod traits;

// Re-export commonly used types
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use prefixed::PrefixedStore;
pub use redis_backend::{RedisStore, connect_store};
pub use reply::ScriptReply;
pub use script::{Script, ScriptKind};
pub use traits::{Store, ttl_millis};
