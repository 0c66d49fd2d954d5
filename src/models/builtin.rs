//! Known model table. Revised when the provider ships new stable ids.

use super::family::{ModelFamily, ModelTier};
use super::registry::ModelRegistry;
use super::spec::{Capability, EnrichmentSource, ModelDescriptor};

pub const TABLE_VERSION: &str = "2025-10";

use Capability::*;

const MULTIMODAL_THINKING: &[Capability] = &[
    Text,
    Image,
    Audio,
    Video,
    Streaming,
    FunctionCalling,
    CodeExecution,
    Thinking,
];
const MULTIMODAL: &[Capability] = &[
    Text,
    Image,
    Audio,
    Video,
    Streaming,
    FunctionCalling,
    CodeExecution,
];
const OPEN_WEIGHTS: &[Capability] = &[Text, Image, Streaming];

struct Entry {
    id: &'static str,
    display_name: &'static str,
    version: &'static str,
    tier: ModelTier,
    capabilities: &'static [Capability],
    context_window: u64,
    max_output_tokens: u64,
    description: &'static str,
    aliases: &'static [&'static str],
}

const ENTRIES: &[Entry] = &[
    Entry {
        id: "gemini-2.5-pro",
        display_name: "Gemini 2.5 Pro",
        version: "2.5",
        tier: ModelTier::Pro,
        capabilities: MULTIMODAL_THINKING,
        context_window: 1_048_576,
        max_output_tokens: 65_536,
        description: "Most capable 2.5 model for complex reasoning and coding",
        aliases: &["gemini-pro"],
    },
    Entry {
        id: "gemini-2.5-flash",
        display_name: "Gemini 2.5 Flash",
        version: "2.5",
        tier: ModelTier::Flash,
        capabilities: MULTIMODAL_THINKING,
        context_window: 1_048_576,
        max_output_tokens: 65_536,
        description: "Fast thinking model with a balance of price and performance",
        aliases: &["gemini-flash"],
    },
    Entry {
        id: "gemini-2.5-flash-lite",
        display_name: "Gemini 2.5 Flash-Lite",
        version: "2.5",
        tier: ModelTier::Lite,
        capabilities: MULTIMODAL_THINKING,
        context_window: 1_048_576,
        max_output_tokens: 65_536,
        description: "Lowest-latency 2.5 model for high-volume tasks",
        aliases: &["gemini-flash-lite"],
    },
    Entry {
        id: "gemini-2.0-flash",
        display_name: "Gemini 2.0 Flash",
        version: "2.0",
        tier: ModelTier::Flash,
        capabilities: MULTIMODAL,
        context_window: 1_048_576,
        max_output_tokens: 8_192,
        description: "Second-generation multimodal workhorse",
        aliases: &[],
    },
    Entry {
        id: "gemini-2.0-flash-lite",
        display_name: "Gemini 2.0 Flash-Lite",
        version: "2.0",
        tier: ModelTier::Lite,
        capabilities: &[Text, Image, Audio, Video, Streaming, FunctionCalling],
        context_window: 1_048_576,
        max_output_tokens: 8_192,
        description: "Cost-efficient 2.0 model",
        aliases: &[],
    },
    Entry {
        id: "gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        version: "1.5",
        tier: ModelTier::Pro,
        capabilities: MULTIMODAL,
        context_window: 2_097_152,
        max_output_tokens: 8_192,
        description: "Long-context 1.5 model",
        aliases: &[],
    },
    Entry {
        id: "gemini-1.5-flash",
        display_name: "Gemini 1.5 Flash",
        version: "1.5",
        tier: ModelTier::Flash,
        capabilities: MULTIMODAL,
        context_window: 1_048_576,
        max_output_tokens: 8_192,
        description: "Fast 1.5 model",
        aliases: &[],
    },
    Entry {
        id: "gemini-1.5-flash-8b",
        display_name: "Gemini 1.5 Flash-8B",
        version: "1.5",
        tier: ModelTier::Lite,
        capabilities: &[Text, Image, Audio, Video, Streaming, FunctionCalling],
        context_window: 1_048_576,
        max_output_tokens: 8_192,
        description: "Small 1.5 model for high-volume tasks",
        aliases: &[],
    },
    Entry {
        id: "gemma-3-27b-it",
        display_name: "Gemma 3 27B",
        version: "3",
        tier: ModelTier::Standard,
        capabilities: OPEN_WEIGHTS,
        context_window: 131_072,
        max_output_tokens: 8_192,
        description: "Open-weights instruction-tuned model",
        aliases: &["gemma-3"],
    },
];

pub fn register_all(registry: &mut ModelRegistry) {
    for entry in ENTRIES {
        let family = if entry.id.starts_with("gemma") {
            ModelFamily::Gemma
        } else {
            ModelFamily::Gemini(entry.version.to_string())
        };
        let descriptor = ModelDescriptor {
            id: entry.id.to_string(),
            display_name: entry.display_name.to_string(),
            family,
            tier: entry.tier,
            capabilities: entry.capabilities.iter().copied().collect(),
            context_window: entry.context_window,
            max_output_tokens: entry.max_output_tokens,
            description: entry.description.to_string(),
            source: EnrichmentSource::Builtin,
        };
        registry.register(descriptor);
        for alias in entry.aliases {
            registry.add_alias(*alias, entry.id);
        }
    }
}
