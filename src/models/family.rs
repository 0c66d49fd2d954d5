use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Version lineage a model belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    /// Gemini generation, e.g. `"2.5"` or `"3"`.
    Gemini(String),
    Gemma,
    Unknown,
}

fn gemini_version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"gemini-(\d+)(?:\.(\d+))?").expect("valid version regex"))
}

impl ModelFamily {
    /// Infer the lineage from an identifier's version pattern.
    pub fn infer(id: &str) -> Self {
        let lower = id.to_lowercase();
        if let Some(caps) = gemini_version_regex().captures(&lower) {
            let major = &caps[1];
            return match caps.get(2) {
                Some(minor) => Self::Gemini(format!("{}.{}", major, minor.as_str())),
                None => Self::Gemini(major.to_string()),
            };
        }
        if lower.contains("gemma") {
            return Self::Gemma;
        }
        Self::Unknown
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini(version) => write!(f, "gemini-{}", version),
            Self::Gemma => f.write_str("gemma"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Capability class within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Ultra,
    Pro,
    Flash,
    Lite,
    Nano,
    Standard,
}

impl ModelTier {
    /// Infer the tier from name tokens. `lite` wins over `flash` so that
    /// `flash-lite` variants land in [`ModelTier::Lite`].
    pub fn infer(id: &str) -> Self {
        let lower = id.to_lowercase();
        let tokens: Vec<&str> = lower.split(['-', '_', '.', '/']).collect();
        let has = |t: &str| tokens.contains(&t);

        if has("lite") {
            Self::Lite
        } else if has("flash") {
            Self::Flash
        } else if has("pro") {
            Self::Pro
        } else if has("ultra") {
            Self::Ultra
        } else if has("nano") {
            Self::Nano
        } else {
            Self::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultra => "ultra",
            Self::Pro => "pro",
            Self::Flash => "flash",
            Self::Lite => "lite",
            Self::Nano => "nano",
            Self::Standard => "standard",
        }
    }
}
