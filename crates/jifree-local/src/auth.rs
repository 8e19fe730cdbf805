use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Shared-secret and origin checks for incoming requests.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    shared_secret: String,
    allowed_origin: String,
}

impl Authenticator {
    pub fn new(shared_secret: impl Into<String>, allowed_origin: impl Into<String>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            allowed_origin: allowed_origin.into(),
        }
    }

    /// Read `JIFREE_SHARED_SECRET` / `JIFREE_ALLOWED_ORIGIN`, falling back to the
    /// unprefixed `SHARED_SECRET` / `ALLOWED_ORIGIN`.
    pub fn from_env() -> Self {
        Self::new(
            env_any(&["JIFREE_SHARED_SECRET", "SHARED_SECRET"]).unwrap_or_default(),
            env_any(&["JIFREE_ALLOWED_ORIGIN", "ALLOWED_ORIGIN"]).unwrap_or_default(),
        )
    }

    pub fn has_secret(&self) -> bool {
        !self.shared_secret.is_empty()
    }

    /// Fails closed when no secret is configured.
    ///
    /// Both sides are hashed to fixed-length digests and compared without an early exit,
    /// so timing does not depend on where the inputs first differ.
    pub fn validate_secret(&self, secret: &str) -> bool {
        if self.shared_secret.is_empty() {
            return false;
        }
        let want = Sha256::digest(self.shared_secret.as_bytes());
        let got = Sha256::digest(secret.as_bytes());
        want.iter().zip(got.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }

    /// Empty or `*` allows any origin (including none).
    pub fn validate_origin(&self, origin: Option<&str>) -> bool {
        if self.allowed_origin.is_empty() || self.allowed_origin == "*" {
            return true;
        }
        origin == Some(self.allowed_origin.as_str())
    }

    /// Headers an HTTP front end attaches to every response.
    pub fn cors_headers(&self) -> BTreeMap<&'static str, String> {
        let origin = if self.allowed_origin.is_empty() {
            "*".to_string()
        } else {
            self.allowed_origin.clone()
        };
        BTreeMap::from([
            ("Access-Control-Allow-Origin", origin),
            ("Access-Control-Allow-Methods", "POST, OPTIONS".to_string()),
            ("Access-Control-Allow-Headers", "Content-Type".to_string()),
        ])
    }
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        std::env::var(k)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}
