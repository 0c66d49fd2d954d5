use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::family::{ModelFamily, ModelTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Image,
    Audio,
    Video,
    Streaming,
    FunctionCalling,
    CodeExecution,
    Thinking,
}

/// Which enrichment step produced a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentSource {
    Builtin,
    Fuzzy,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub family: ModelFamily,
    pub tier: ModelTier,
    pub capabilities: BTreeSet<Capability>,
    pub context_window: u64,
    pub max_output_tokens: u64,
    #[serde(default)]
    pub description: String,
    pub source: EnrichmentSource,
}

impl ModelDescriptor {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_multimodal(&self) -> bool {
        self.capabilities
            .iter()
            .any(|c| matches!(c, Capability::Image | Capability::Audio | Capability::Video))
    }
}

/// Title-case an identifier for display: `gemini-2.5-flash` → `Gemini 2.5 Flash`.
pub(super) fn display_name_for(id: &str) -> String {
    id.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name_for("gemini-2.5-flash"), "Gemini 2.5 Flash");
        assert_eq!(display_name_for("gemma-3-27b-it"), "Gemma 3 27b It");
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let descriptor = ModelDescriptor {
            id: "gemini-2.5-flash".into(),
            display_name: "Gemini 2.5 Flash".into(),
            family: ModelFamily::Gemini("2.5".into()),
            tier: ModelTier::Flash,
            capabilities: [Capability::Text, Capability::Streaming].into_iter().collect(),
            context_window: 1_048_576,
            max_output_tokens: 65_536,
            description: String::new(),
            source: EnrichmentSource::Builtin,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["contextWindow"], 1_048_576);
        assert_eq!(json["capabilities"], serde_json::json!(["text", "streaming"]));
        assert_eq!(json["source"], "builtin");
        assert!(!descriptor.is_multimodal());
        assert!(descriptor.supports(Capability::Streaming));
    }
}
