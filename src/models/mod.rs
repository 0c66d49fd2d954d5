//! Model capability enrichment.
//!
//! Turns a raw model identifier into a [`ModelDescriptor`]. Known ids come
//! straight from the builtin table, near misses are matched after stripping
//! volatile suffixes, and anything else is classified from its name.

mod builtin;
mod family;
mod registry;
mod spec;

pub use builtin::TABLE_VERSION;
pub use family::{ModelFamily, ModelTier};
pub use registry::{ModelRegistry, normalize_model_id, registry};
pub use spec::{Capability, EnrichmentSource, ModelDescriptor};

pub mod context_window {
    use super::registry;

    /// Used when nothing is known about a model.
    pub const CONSERVATIVE: u64 = 32_768;
    pub const STANDARD: u64 = 1_048_576;
    pub const EXTENDED: u64 = 2_097_152;

    pub fn for_model(model: &str) -> u64 {
        registry().enrich(model).context_window
    }
}

pub mod output_tokens {
    use super::registry;

    pub const DEFAULT: u64 = 8_192;

    pub fn for_model(model: &str) -> u64 {
        registry().enrich(model).max_output_tokens
    }
}
