//! Per-probe results and the aggregate discovery report.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{ClassifiedError, ErrorKind};
use crate::models::Capability;

/// Outcome of probing one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub model_id: String,
    /// True for successes and for throttled probes.
    pub accessible: bool,
    pub latency: Option<Duration>,
    pub capabilities: BTreeSet<Capability>,
    pub rate_limited: bool,
    pub error: Option<ClassifiedError>,
}

impl TestResult {
    pub fn success(
        model_id: impl Into<String>,
        latency: Duration,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            accessible: true,
            latency: Some(latency),
            capabilities,
            rate_limited: false,
            error: None,
        }
    }

    /// Fold a failed probe. Throttling means the model exists and the
    /// credential may call it, so it stays accessible.
    pub fn failure(
        model_id: impl Into<String>,
        error: ClassifiedError,
        capabilities: BTreeSet<Capability>,
    ) -> Self {
        let rate_limited = error.is_rate_limited();
        Self {
            model_id: model_id.into(),
            accessible: rate_limited,
            latency: None,
            capabilities: if rate_limited {
                capabilities
            } else {
                BTreeSet::new()
            },
            rate_limited,
            error: Some(error),
        }
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedModel {
    pub model_id: String,
    pub reason: ErrorKind,
    pub is_model_scoped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    #[default]
    Ok,
    Exhausted,
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub usable_models: Vec<String>,
    pub rejected_models: Vec<RejectedModel>,
    pub provider_status: ProviderStatus,
    pub tested_at: DateTime<Utc>,
    #[serde(skip)]
    pub results: Vec<TestResult>,
    #[serde(skip)]
    pub rate_limited_count: usize,
}

impl DiscoveryReport {
    /// Fold results in probe order into a report stamped now.
    pub fn from_results(results: Vec<TestResult>) -> Self {
        let mut usable_models = Vec::new();
        let mut rejected_models = Vec::new();
        let mut rate_limited_count = 0;

        for result in &results {
            if result.rate_limited {
                rate_limited_count += 1;
            }
            if result.accessible {
                usable_models.push(result.model_id.clone());
            } else if let Some(error) = &result.error {
                rejected_models.push(RejectedModel {
                    model_id: result.model_id.clone(),
                    reason: error.kind,
                    is_model_scoped: error.is_model_scoped(),
                });
            }
        }

        let provider_status = provider_status(&usable_models, &rejected_models, rate_limited_count);

        Self {
            usable_models,
            rejected_models,
            provider_status,
            tested_at: Utc::now(),
            results,
            rate_limited_count,
        }
    }

    pub fn is_usable(&self, model_id: &str) -> bool {
        self.usable_models.iter().any(|m| m == model_id)
    }

    pub fn result_for(&self, model_id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.model_id == model_id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn provider_status(
    usable: &[String],
    rejected: &[RejectedModel],
    rate_limited_count: usize,
) -> ProviderStatus {
    if !usable.is_empty() {
        return ProviderStatus::Ok;
    }
    if rate_limited_count > 0 {
        ProviderStatus::RateLimited
    } else if rejected.iter().any(|r| r.reason == ErrorKind::QuotaExhausted) {
        ProviderStatus::Exhausted
    } else {
        ProviderStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_only() -> BTreeSet<Capability> {
        BTreeSet::from([Capability::Text])
    }

    fn ok(id: &str) -> TestResult {
        TestResult::success(id, Duration::from_millis(120), text_only())
    }

    fn failed(id: &str, kind: ErrorKind, status: Option<u16>) -> TestResult {
        TestResult::failure(id, ClassifiedError::new(kind, status, "failed"), text_only())
    }

    #[test]
    fn test_forbidden_model_rejected() {
        let report = DiscoveryReport::from_results(vec![
            ok("m1"),
            failed("m2", ErrorKind::PermissionDenied, Some(403)),
            ok("m3"),
        ]);

        assert_eq!(report.usable_models, vec!["m1", "m3"]);
        assert_eq!(
            report.rejected_models,
            vec![RejectedModel {
                model_id: "m2".into(),
                reason: ErrorKind::PermissionDenied,
                is_model_scoped: true,
            }]
        );
        assert_eq!(report.provider_status, ProviderStatus::Ok);
        assert!(report.result_for("m2").unwrap().capabilities.is_empty());
    }

    #[test]
    fn test_throttled_models_are_usable() {
        let report = DiscoveryReport::from_results(vec![
            failed("m1", ErrorKind::RateLimited, Some(429)),
            failed("m2", ErrorKind::RateLimited, Some(429)),
        ]);

        assert_eq!(report.usable_models, vec!["m1", "m2"]);
        assert!(report.rejected_models.is_empty());
        assert_eq!(report.rate_limited_count, 2);
        assert_eq!(report.provider_status, ProviderStatus::Ok);
        assert!(report.result_for("m1").unwrap().rate_limited);
    }

    #[test]
    fn test_exhausted_when_nothing_usable() {
        let report = DiscoveryReport::from_results(vec![
            failed("m1", ErrorKind::QuotaExhausted, None),
            failed("m2", ErrorKind::NotFound, Some(404)),
        ]);
        assert!(report.usable_models.is_empty());
        assert_eq!(report.provider_status, ProviderStatus::Exhausted);

        let report = DiscoveryReport::from_results(vec![failed(
            "m1",
            ErrorKind::NetworkError,
            Some(503),
        )]);
        assert_eq!(report.provider_status, ProviderStatus::Ok);
    }

    #[test]
    fn test_status_rules() {
        let rejected = vec![RejectedModel {
            model_id: "m".into(),
            reason: ErrorKind::QuotaExhausted,
            is_model_scoped: false,
        }];
        assert_eq!(provider_status(&[], &rejected, 1), ProviderStatus::RateLimited);
        assert_eq!(provider_status(&[], &rejected, 0), ProviderStatus::Exhausted);
        assert_eq!(
            provider_status(&["m2".to_string()], &rejected, 0),
            ProviderStatus::Ok
        );
    }

    #[test]
    fn test_serialized_shape() {
        let report = DiscoveryReport::from_results(vec![
            ok("gemini-2.5-flash"),
            failed("gemini-2.5-pro", ErrorKind::PermissionDenied, Some(403)),
        ]);
        let json = serde_json::to_value(&report).unwrap();

        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys.len(),
            4,
            "only the documented fields are serialized: {keys:?}"
        );
        assert_eq!(json["usableModels"][0], "gemini-2.5-flash");
        assert_eq!(json["rejectedModels"][0]["reason"], "permission_denied");
        assert_eq!(json["rejectedModels"][0]["isModelScoped"], true);
        assert_eq!(json["providerStatus"], "ok");
        assert!(json["testedAt"].is_string());

        let parsed: DiscoveryReport = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.usable_models, report.usable_models);
        assert!(parsed.results.is_empty());
    }
}
