use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use super::builtin;
use super::context_window;
use super::family::{ModelFamily, ModelTier};
use super::output_tokens;
use super::spec::{Capability, EnrichmentSource, ModelDescriptor, display_name_for};
use crate::client::api::RemoteModel;

static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// Process-wide registry of builtin models.
pub fn registry() -> &'static ModelRegistry {
    REGISTRY.get_or_init(ModelRegistry::builtins)
}

fn volatile_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(-latest|-preview.*|-exp.*|-\d{3}|-\d{2}-\d{2}|-\d{2}-\d{4}|-\d{4,8})$")
            .expect("valid suffix regex")
    })
}

/// Lowercase, drop the `models/` prefix and strip volatile suffixes such as
/// `-latest`, `-001`, `-preview-05-20`, `-exp-0827` and date stamps.
pub fn normalize_model_id(raw: &str) -> String {
    let mut id = strip_prefix(raw).to_lowercase();
    loop {
        let stripped = volatile_suffix_regex().replace(&id, "").into_owned();
        if stripped == id || stripped.is_empty() {
            return id;
        }
        id = stripped;
    }
}

fn strip_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix("models/").unwrap_or(trimmed)
}

fn prefixes(id: &str, prefix: &str) -> bool {
    id == prefix
        || id
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('-'))
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) {
        self.models.insert(descriptor.id.clone(), descriptor);
    }

    pub fn add_alias(&mut self, alias: impl Into<String>, id: impl Into<String>) {
        self.aliases.insert(alias.into(), id.into());
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.get(strip_prefix(id))
    }

    pub fn all(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Describe a raw identifier. Never fails: exact match, then fuzzy
    /// match, then a name-based guess.
    pub fn enrich(&self, raw_id: &str) -> ModelDescriptor {
        let id = strip_prefix(raw_id);

        if let Some(known) = self.models.get(id) {
            return known.clone();
        }

        if let Some(matched) = self.fuzzy_match(id) {
            tracing::debug!(model = id, matched = %matched.id, "model enriched via fuzzy match");
            return ModelDescriptor {
                id: id.to_string(),
                display_name: display_name_for(id),
                source: EnrichmentSource::Fuzzy,
                ..matched.clone()
            };
        }

        tracing::debug!(model = id, "model enriched via heuristics");
        Self::heuristic(id)
    }

    /// Like [`enrich`](Self::enrich), but heuristic results adopt the limits
    /// and text the catalog reported for the model.
    pub fn enrich_remote(&self, remote: &RemoteModel) -> ModelDescriptor {
        let mut descriptor = self.enrich(remote.id());
        if descriptor.source != EnrichmentSource::Heuristic {
            return descriptor;
        }

        if let Some(limit) = remote.input_token_limit {
            descriptor.context_window = limit;
        }
        if let Some(limit) = remote.output_token_limit {
            descriptor.max_output_tokens = limit;
        }
        if let Some(ref name) = remote.display_name
            && !name.is_empty()
        {
            descriptor.display_name = name.clone();
        }
        if let Some(ref description) = remote.description {
            descriptor.description = description.clone();
        }
        descriptor
    }

    fn fuzzy_match(&self, id: &str) -> Option<&ModelDescriptor> {
        let normalized = normalize_model_id(id);

        let by_prefix = self
            .models
            .keys()
            .filter(|known| prefixes(&normalized, known))
            .max_by_key(|known| known.len());
        if let Some(known) = by_prefix {
            return self.models.get(known);
        }

        self.aliases
            .iter()
            .filter(|(alias, _)| prefixes(&normalized, alias))
            .max_by_key(|(alias, _)| alias.len())
            .and_then(|(_, target)| self.models.get(target))
    }

    fn heuristic(id: &str) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            display_name: display_name_for(id),
            family: ModelFamily::infer(id),
            tier: ModelTier::infer(id),
            capabilities: [Capability::Text, Capability::Streaming]
                .into_iter()
                .collect(),
            context_window: context_window::CONSERVATIVE,
            max_output_tokens: output_tokens::DEFAULT,
            description: String::new(),
            source: EnrichmentSource::Heuristic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str) -> RemoteModel {
        RemoteModel {
            name: format!("models/{name}"),
            display_name: Some("Remote Name".into()),
            description: Some("From the catalog".into()),
            input_token_limit: Some(500_000),
            output_token_limit: Some(4_096),
            supported_generation_methods: vec!["generateContent".into()],
        }
    }

    #[test]
    fn test_builtin_exact_lookup() {
        let registry = ModelRegistry::builtins();
        let descriptor = registry.enrich("gemini-2.5-flash");
        assert_eq!(&descriptor, registry.get("gemini-2.5-flash").unwrap());
        assert_eq!(descriptor.source, EnrichmentSource::Builtin);
        assert_eq!(descriptor.tier, ModelTier::Flash);
        assert_eq!(descriptor.context_window, 1_048_576);

        let prefixed = registry.enrich("models/gemini-2.5-pro");
        assert_eq!(prefixed.source, EnrichmentSource::Builtin);
        assert_eq!(prefixed.id, "gemini-2.5-pro");
    }

    #[test]
    fn test_normalize_strips_volatile_suffixes() {
        assert_eq!(normalize_model_id("gemini-2.0-flash-001"), "gemini-2.0-flash");
        assert_eq!(normalize_model_id("models/gemini-1.5-pro-latest"), "gemini-1.5-pro");
        assert_eq!(
            normalize_model_id("gemini-2.5-flash-preview-05-20"),
            "gemini-2.5-flash"
        );
        assert_eq!(normalize_model_id("gemini-2.0-flash-exp"), "gemini-2.0-flash");
        assert_eq!(normalize_model_id("gemini-1.5-flash-8b"), "gemini-1.5-flash-8b");
    }

    #[test]
    fn test_fuzzy_match_keeps_raw_id() {
        let registry = ModelRegistry::builtins();

        let descriptor = registry.enrich("gemini-2.5-flash-lite-preview-06-17");
        assert_eq!(descriptor.source, EnrichmentSource::Fuzzy);
        assert_eq!(descriptor.id, "gemini-2.5-flash-lite-preview-06-17");
        assert_eq!(descriptor.tier, ModelTier::Lite);

        let descriptor = registry.enrich("gemini-2.0-flash-001");
        assert_eq!(descriptor.source, EnrichmentSource::Fuzzy);
        assert_eq!(descriptor.max_output_tokens, 8_192);
    }

    #[test]
    fn test_fuzzy_alias_fragment() {
        let registry = ModelRegistry::builtins();
        let descriptor = registry.enrich("gemini-flash-latest");
        assert_eq!(descriptor.source, EnrichmentSource::Fuzzy);
        assert_eq!(descriptor.family, ModelFamily::Gemini("2.5".into()));
        assert_eq!(descriptor.tier, ModelTier::Flash);
    }

    #[test]
    fn test_heuristic_fallback() {
        let registry = ModelRegistry::builtins();
        let descriptor = registry.enrich("gemini-9.1-ultra-experimental");
        assert_eq!(descriptor.source, EnrichmentSource::Heuristic);
        assert_eq!(descriptor.family, ModelFamily::Gemini("9.1".into()));
        assert_eq!(descriptor.tier, ModelTier::Ultra);
        assert_eq!(descriptor.context_window, context_window::CONSERVATIVE);
        assert_eq!(
            descriptor.capabilities,
            [Capability::Text, Capability::Streaming].into_iter().collect()
        );
    }

    #[test]
    fn test_enrich_never_fails_on_garbage() {
        let registry = ModelRegistry::builtins();
        for raw in ["", "models/", "???", "-latest"] {
            let descriptor = registry.enrich(raw);
            assert_eq!(descriptor.source, EnrichmentSource::Heuristic);
        }
    }

    #[test]
    fn test_enrich_remote_only_overrides_heuristics() {
        let registry = ModelRegistry::builtins();

        let unknown = registry.enrich_remote(&remote("learnlm-2.0-flash-experimental"));
        assert_eq!(unknown.source, EnrichmentSource::Heuristic);
        assert_eq!(unknown.context_window, 500_000);
        assert_eq!(unknown.max_output_tokens, 4_096);
        assert_eq!(unknown.display_name, "Remote Name");

        let known = registry.enrich_remote(&remote("gemini-2.5-pro"));
        assert_eq!(known.source, EnrichmentSource::Builtin);
        assert_eq!(known.context_window, 1_048_576);
    }

    #[test]
    fn test_registry_global() {
        assert!(registry().get("gemini-2.5-flash").is_some());
        assert!(!registry().is_empty());
        assert_eq!(context_window::for_model("gemini-1.5-pro"), 2_097_152);
        assert_eq!(output_tokens::for_model("mystery-model"), output_tokens::DEFAULT);
    }
}
