//! Environment variable credential provider.

use async_trait::async_trait;

use crate::auth::{Credential, CredentialProvider};
use crate::{Error, Result};

const DEFAULT_ENV_VARS: &[&str] = &["MODEL_SCOUT_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Provider that reads the API key from the first set environment variable.
pub struct EnvironmentProvider {
    env_vars: Vec<String>,
}

impl EnvironmentProvider {
    pub fn new() -> Self {
        Self {
            env_vars: DEFAULT_ENV_VARS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_var(env_var: impl Into<String>) -> Self {
        Self {
            env_vars: vec![env_var.into()],
        }
    }
}

impl Default for EnvironmentProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for EnvironmentProvider {
    fn name(&self) -> &str {
        "environment"
    }

    async fn resolve(&self) -> Result<Credential> {
        for var in &self.env_vars {
            if let Ok(value) = std::env::var(var)
                && !value.trim().is_empty()
            {
                tracing::debug!(var = %var, "credential found in environment");
                return Credential::new(value);
            }
        }
        Err(Error::auth(format!("{} not set", self.env_vars.join(" / "))))
    }
}
