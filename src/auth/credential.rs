//! API key credential.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

pub const MIN_CREDENTIAL_LEN: usize = 20;

/// A validated API key.
#[derive(Clone, Debug)]
pub struct Credential {
    key: SecretString,
}

impl Credential {
    /// Validate and wrap an API key: at least 20 characters drawn from
    /// `[A-Za-z0-9_-]`. Surrounding whitespace is ignored.
    pub fn new(key: impl AsRef<str>) -> Result<Self> {
        let key = key.as_ref().trim();

        if key.is_empty() {
            return Err(Error::auth("API key is empty"));
        }
        if key.len() < MIN_CREDENTIAL_LEN {
            return Err(Error::auth(format!(
                "API key must be at least {} characters",
                MIN_CREDENTIAL_LEN
            )));
        }
        if let Some(bad) = key
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(Error::auth(format!(
                "API key contains invalid character {:?}",
                bad
            )));
        }

        Ok(Self {
            key: SecretString::from(key.to_string()),
        })
    }

    pub fn expose(&self) -> &str {
        self.key.expose_secret()
    }

    /// Leading characters of the key, safe enough for request fingerprints.
    pub fn prefix(&self, len: usize) -> String {
        self.expose().chars().take(len).collect()
    }

    /// Non-reversible identifier for keying durable caches: the first 16 hex
    /// digits of the key's SHA-256, identical across builds and platforms.
    pub fn cache_key(&self) -> String {
        let digest = Sha256::digest(self.expose().as_bytes());
        let mut hex = format!("{digest:x}");
        hex.truncate(16);
        hex
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

impl std::str::FromStr for Credential {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AIzaSyD-test_key_0123456789";

    #[test]
    fn test_valid_key() {
        let cred = Credential::new(format!("  {KEY}\n")).unwrap();
        assert_eq!(cred.expose(), KEY);
        assert_eq!(cred.prefix(8), "AIzaSyD-");
    }

    #[test]
    fn test_rejects_short_or_malformed() {
        assert!(matches!(Credential::new(""), Err(Error::Auth { .. })));
        assert!(Credential::new("short-key").is_err());
        assert!(Credential::new("AIzaSyD test key 0123456789").is_err());
        assert!(Credential::new("AIzaSyD.test.key.0123456789").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let cred = Credential::new(KEY).unwrap();
        assert!(!format!("{cred:?}").contains(KEY));
    }

    #[test]
    fn test_cache_key_is_stable_and_opaque() {
        let a = Credential::new(KEY).unwrap();
        let b: Credential = KEY.parse().unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "36d62d599417ac19");
        assert!(!a.cache_key().contains("AIza"));

        let other = Credential::new("AIzaSyD-test_key_9876543210").unwrap();
        assert_ne!(a.cache_key(), other.cache_key());
    }
}
