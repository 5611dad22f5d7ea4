//! # Correlation ids
//!
//! Every outbound call is tagged with a fresh id so its reply can be matched
//! regardless of arrival order. Ids are 128 random bits rendered as 32 lowercase
//! hex digits. They are correlation tokens, not secrets, so a plain PRNG is enough.

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

/// Correlation token for one call.
///
/// Any string is accepted off the wire (ids minted by a foreign peer still have
/// to round-trip); ids minted here are always well formed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Number of hex digits in a generated id.
    pub const LEN: usize = 32;

    /// Draws a fresh id.
    pub fn generate() -> Self {
        let bits: u128 = rand::thread_rng().r#gen();
        Self(format!("{:032x}", bits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this id has the shape of a generated one.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == Self::LEN
            && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
