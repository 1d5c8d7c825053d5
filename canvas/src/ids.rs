//! Object id generation.
//!
//! Ids have the form `obj_<creation-ms>_<session-token>_<counter>`. The
//! session token is random per engine instance, so two clients creating
//! objects in the same millisecond with the same counter still differ.

#[cfg(test)]
#[path = "ids_test.rs"]
mod ids_test;

use std::time::{SystemTime, UNIX_EPOCH};

use actions::ObjectId;
use uuid::Uuid;

const PREFIX: &str = "obj";
const TOKEN_LEN: usize = 8;

/// Per-session id allocator.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    token: String,
    counter: u64,
}

impl IdGenerator {
    /// Generator with a fresh random session token.
    #[must_use]
    pub fn new() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self::with_token(&simple[..TOKEN_LEN])
    }

    /// Generator with a fixed session token. Underscores are stripped so the
    /// token stays a single id segment.
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self { token: token.replace('_', ""), counter: 0 }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Allocate the next id stamped with the current wall-clock time.
    pub fn next_id(&mut self) -> ObjectId {
        self.next_id_at(now_ms())
    }

    /// Allocate the next id stamped with `ms`.
    pub fn next_id_at(&mut self, ms: u64) -> ObjectId {
        self.counter += 1;
        ObjectId::new(format!("{PREFIX}_{ms}_{}_{}", self.token, self.counter))
    }

    /// True if `id` was allocated by a generator with this session token.
    #[must_use]
    pub fn is_own(&self, id: &ObjectId) -> bool {
        session_token_of(id) == Some(self.token.as_str())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the session token segment of a well-formed id.
#[must_use]
pub fn session_token_of(id: &ObjectId) -> Option<&str> {
    let mut parts = id.as_str().split('_');
    let (Some(PREFIX), Some(ms), Some(token), Some(counter), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    (numeric(ms) && numeric(counter) && !token.is_empty()).then_some(token)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
