//! Token, key and lease-time helpers

use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of tokens produced by [`random_token`]
pub const TOKEN_LEN: usize = 16;

/// Extra lease time added to every lock TTL to absorb network and script latency
pub const LEASE_TOLERANCE_MS: u64 = 500;

pub const MILLIS_PER_SECOND: u64 = 1000;

/// 30 minutes
pub const TTL_30_MINUTES: Duration = Duration::from_secs(30 * 60);

/// 24 hours
pub const TTL_24_HOURS: Duration = Duration::from_secs(24 * 60 * 60);

/// 30 days
pub const TTL_MONTH: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Marker for keys written without an expiry
pub const NO_EXPIRATION: Option<Duration> = None;

/// Generate an opaque holder token of [`TOKEN_LEN`] alphanumeric characters.
///
/// # Examples
///
/// ```
/// use latchkey_common::random_token;
///
/// let token = random_token();
/// assert_eq!(token.len(), 16);
/// assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Lease duration sent to the store for a lock TTL of `seconds`.
///
/// # Examples
///
/// ```
/// use latchkey_common::lease_millis;
///
/// assert_eq!(lease_millis(0), 500);
/// assert_eq!(lease_millis(30), 30_500);
/// ```
pub fn lease_millis(seconds: u32) -> u64 {
    u64::from(seconds) * MILLIS_PER_SECOND + LEASE_TOLERANCE_MS
}

/// Return `s` with `prefix` prepended unless it already starts with it.
/// An empty prefix leaves `s` unchanged.
///
/// # Examples
///
/// ```
/// use latchkey_common::ensure_start_with;
///
/// assert_eq!(ensure_start_with("lock", "app:"), "app:lock");
/// assert_eq!(ensure_start_with("app:lock", "app:"), "app:lock");
/// assert_eq!(ensure_start_with("lock", ""), "lock");
/// ```
pub fn ensure_start_with(s: &str, prefix: &str) -> String {
    if prefix.is_empty() || s.starts_with(prefix) {
        return s.to_string();
    }
    format!("{}{}", prefix, s)
}
