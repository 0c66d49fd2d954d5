//! Scan lifecycle and progress events.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DiscoveryState {
    #[default]
    Idle,
    DiscoveringCandidates,
    Testing {
        current: usize,
        total: usize,
    },
    Completed,
}

impl DiscoveryState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::DiscoveringCandidates | Self::Testing { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// A probe is about to start.
    Started,
    /// A probe finished, whatever its outcome.
    Finished,
    /// The scan is over. Emitted exactly once, last.
    Completed,
}

/// One progress event. `current` counts finished probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    /// Empty on the final event.
    pub model_id: String,
    pub phase: ProgressPhase,
}

impl Progress {
    pub(crate) fn started(index: usize, total: usize, model_id: &str) -> Self {
        Self {
            current: index,
            total,
            model_id: model_id.to_string(),
            phase: ProgressPhase::Started,
        }
    }

    pub(crate) fn finished(index: usize, total: usize, model_id: &str) -> Self {
        Self {
            current: index + 1,
            total,
            model_id: model_id.to_string(),
            phase: ProgressPhase::Finished,
        }
    }

    pub(crate) fn completed(total: usize) -> Self {
        Self {
            current: total,
            total,
            model_id: String::new(),
            phase: ProgressPhase::Completed,
        }
    }

    pub fn is_final(&self) -> bool {
        self.phase == ProgressPhase::Completed
    }

    /// Share of finished probes in `0.0..=1.0`; `1.0` for an empty scan.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.current as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_constructors() {
        let started = Progress::started(0, 3, "gemini-2.5-flash");
        assert_eq!(started.current, 0);
        assert_eq!(started.phase, ProgressPhase::Started);

        let finished = Progress::finished(0, 3, "gemini-2.5-flash");
        assert_eq!(finished.current, 1);
        assert!(!finished.is_final());

        let done = Progress::completed(3);
        assert!(done.is_final());
        assert_eq!(done.current, done.total);
        assert_eq!(done.fraction(), 1.0);
        assert_eq!(Progress::completed(0).fraction(), 1.0);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(DiscoveryState::Testing {
            current: 2,
            total: 5,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "testing", "current": 2, "total": 5})
        );
        assert!(DiscoveryState::Testing { current: 0, total: 1 }.is_running());
        assert!(!DiscoveryState::Completed.is_running());
    }
}
