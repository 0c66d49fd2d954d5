//! Ordered credential fallback.

use async_trait::async_trait;

use crate::auth::{Credential, CredentialProvider, EnvironmentProvider};
use crate::{Error, Result};

/// Resolves from the first source that yields a well-formed key.
pub struct ChainProvider {
    sources: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(sources: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { sources }
    }

    pub fn with<P: CredentialProvider + 'static>(mut self, source: P) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

/// Environment variables only.
impl Default for ChainProvider {
    fn default() -> Self {
        Self::new(vec![Box::new(EnvironmentProvider::new())])
    }
}

#[async_trait]
impl CredentialProvider for ChainProvider {
    fn name(&self) -> &str {
        "chain"
    }

    async fn resolve(&self) -> Result<Credential> {
        let mut failures = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.resolve().await {
                Ok(credential) => {
                    tracing::debug!(source = source.name(), "credential resolved");
                    return Ok(credential);
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), error = %e, "credential source skipped");
                    failures.push(format!("{} ({e})", source.name()));
                }
            }
        }

        if failures.is_empty() {
            return Err(Error::auth("No credential sources configured"));
        }
        Err(Error::auth(format!(
            "No usable API key; tried {}",
            failures.join(", ")
        )))
    }
}
