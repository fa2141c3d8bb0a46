//! Sign-in state tokens
//!
//! Every sign-in attempt gets a random state value that round-trips through
//! the provider redirect. On the wire it is `raw` optionally followed by
//! `|redirect` or `|json`, which tells the callback how to complete.

use dashmap::DashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How a callback hands its result back to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// 302 to the completion page with the result in the query
    Redirect,

    /// Inline JSON body
    Json,
}

impl CompletionMode {
    fn as_str(self) -> &'static str {
        match self {
            CompletionMode::Redirect => "redirect",
            CompletionMode::Json => "json",
        }
    }
}

/// Decoded `state` query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthAttemptState {
    /// Value issued by the provider's state store
    pub raw: String,

    /// Mode requested at initiation, if the suffix was present
    pub mode: Option<CompletionMode>,
}

impl AuthAttemptState {
    pub fn new(raw: impl Into<String>, mode: CompletionMode) -> Self {
        Self {
            raw: raw.into(),
            mode: Some(mode),
        }
    }

    /// Effective mode: explicit suffix, then the pending-redirect marker, then JSON
    pub fn resolve_mode(&self, redirect_marker_present: bool) -> CompletionMode {
        match self.mode {
            Some(mode) => mode,
            None if redirect_marker_present => CompletionMode::Redirect,
            None => CompletionMode::Json,
        }
    }
}

impl fmt::Display for AuthAttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Some(mode) => write!(f, "{}|{}", self.raw, mode.as_str()),
            None => f.write_str(&self.raw),
        }
    }
}

impl FromStr for AuthAttemptState {
    type Err = Infallible;

    /// Anything after the first `|` is the mode; only `redirect` selects
    /// redirect mode, every other suffix means JSON.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('|');
        let raw = parts.next().unwrap_or_default().to_string();
        let mode = parts.next().map(|suffix| match suffix {
            "redirect" => CompletionMode::Redirect,
            _ => CompletionMode::Json,
        });
        Ok(Self { raw, mode })
    }
}

/// Generate a cryptographically secure random token
///
/// 32 random bytes, base64url without padding (43 chars). Used for state
/// values, session tokens and signup tokens alike.
pub fn generate_token() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    base64_url_encode(&bytes)
}

/// Base64 URL-safe encoding without padding
fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Default cap on outstanding state values per provider
pub const MAX_OUTSTANDING_STATES: usize = 10_000;

/// Issued state values for one provider
///
/// A value verifies at most once and only within `ttl` of being issued. At
/// most `capacity` values are outstanding; issuing past that evicts the
/// oldest.
#[derive(Debug)]
pub struct StateStore {
    issued: DashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl StateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            issued: DashMap::new(),
            ttl,
            capacity: MAX_OUTSTANDING_STATES,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Issue and remember a fresh state value
    pub fn issue(&self) -> String {
        self.purge_expired();
        if self.issued.len() >= self.capacity {
            self.evict_oldest();
        }
        let state = generate_token();
        self.issued.insert(state.clone(), Instant::now());
        state
    }

    /// Consume a state value; false if unknown, already used or expired
    pub fn verify(&self, raw: &str) -> bool {
        if raw.is_empty() {
            return false;
        }
        match self.issued.remove(raw) {
            Some((_, issued_at)) => issued_at.elapsed() <= self.ttl,
            None => false,
        }
    }

    /// Number of outstanding state values
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.issued.retain(|_, issued_at| issued_at.elapsed() <= ttl);
    }

    fn evict_oldest(&self) {
        let excess = (self.issued.len() + 1).saturating_sub(self.capacity);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(Instant, String)> = self
            .issued
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        by_age.sort_unstable();

        for (_, state) in by_age.into_iter().take(excess) {
            self.issued.remove(&state);
        }
        tracing::warn!(
            capacity = self.capacity,
            evicted = excess,
            "Outstanding sign-in states at capacity; evicted oldest"
        );
    }
}
