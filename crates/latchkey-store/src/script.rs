//! Atomic scripts executed by a store

use std::borrow::Cow;
use std::fmt;

/// What a script does, so that backends without a Lua interpreter can run the
/// built-in shapes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// `KEYS[1]`, `ARGV[1]` = token, `ARGV[2]` = lease in ms.
    /// If the key holds the token, refresh its lease and reply `"OK"`;
    /// otherwise `SET NX PX` and reply with its result (`OK` or nil).
    CompareAndSet,
    /// `KEYS[1]`, `ARGV[1]` = token.
    /// Reply `-1` if absent, the delete count if the key holds the token,
    /// `0` otherwise.
    CompareAndDelete,
    /// Anything else; only Lua-capable backends can run it.
    Custom,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptKind::CompareAndSet => "compare-and-set",
            ScriptKind::CompareAndDelete => "compare-and-delete",
            ScriptKind::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}

/// A Lua script plus the kind it implements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    kind: ScriptKind,
    source: Cow<'static, str>,
}

impl Script {
    pub const fn new(kind: ScriptKind, source: &'static str) -> Self {
        Self {
            kind,
            source: Cow::Borrowed(source),
        }
    }

    /// A script only Lua-capable backends can run.
    pub fn custom(source: impl Into<String>) -> Self {
        Self {
            kind: ScriptKind::Custom,
            source: Cow::Owned(source.into()),
        }
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
