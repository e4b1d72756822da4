//! API key authentication.
//!
//! Keys are opaque bearer tokens loaded once at startup. Verification
//! compares against every configured key in constant time so response
//! latency does not reveal how much of a guess was correct.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// Number of v4 UUIDs drawn per generated key (122 random bits each).
const KEY_UUIDS: usize = 3;

/// Validates bearer credentials against a fixed key set.
#[derive(Clone, Default)]
pub struct Authenticator {
    keys: Vec<String>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("key_count", &self.keys.len())
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Creates an authenticator accepting `keys`. Empty keys are discarded.
    #[must_use]
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(Into::into)
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Number of accepted keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Generates a fresh URL-safe API key.
    ///
    /// The key carries 366 bits of OS-sourced randomness (three v4 UUIDs),
    /// encoded as unpadded URL-safe base64.
    #[must_use]
    pub fn generate_key() -> String {
        let mut bytes = Vec::with_capacity(KEY_UUIDS * 16);
        for _ in 0..KEY_UUIDS {
            bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        }
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Returns `true` if `candidate` matches one of the accepted keys.
    ///
    /// An empty candidate never verifies. All keys are compared even after a
    /// match is found.
    #[must_use]
    pub fn verify(&self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        self.keys.iter().fold(false, |matched, key| {
            matched | constant_time_eq(key.as_bytes(), candidate.as_bytes())
        })
    }

    /// Extracts the token from an `Authorization` header value.
    ///
    /// The header must be exactly two whitespace-separated parts, the first
    /// being `Bearer` in any case. The token is not verified here.
    #[must_use]
    pub fn extract_bearer(header: &str) -> Option<&str> {
        let mut parts = header.split_whitespace();
        let scheme = parts.next()?;
        let token = parts.next()?;
        if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        Some(token)
    }
}

/// Compares two byte strings without branching on their contents.
///
/// Runs over the longer of the two inputs and folds the length difference
/// into the result, so unequal lengths take the same path as unequal bytes.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = u8::from(a.len() != b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= x ^ y;
    }
    std::hint::black_box(diff) == 0
}
