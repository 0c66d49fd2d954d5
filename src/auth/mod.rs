//! Credential handling.
//!
//! A [`Credential`] wraps the API key in a [`secrecy::SecretString`] so it is
//! redacted from `Debug` output and zeroized on drop. Providers resolve one
//! from explicit input or the environment.

mod credential;
mod provider;
mod providers;

pub use credential::{Credential, MIN_CREDENTIAL_LEN};
pub use provider::CredentialProvider;
pub use providers::{ChainProvider, EnvironmentProvider, ExplicitProvider};
