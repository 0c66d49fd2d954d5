//! Explicit credential provider.

use async_trait::async_trait;

use crate::Result;
use crate::auth::{Credential, CredentialProvider};

/// Provider with an explicitly supplied key. Validation is deferred to
/// `resolve` so construction never fails.
pub struct ExplicitProvider {
    key: String,
}

impl ExplicitProvider {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl CredentialProvider for ExplicitProvider {
    fn name(&self) -> &str {
        "explicit"
    }

    async fn resolve(&self) -> Result<Credential> {
        Credential::new(&self.key)
    }
}
