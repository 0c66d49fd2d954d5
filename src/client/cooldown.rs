//! Per-model cooldowns after throttling.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::api::MAX_RETRY_HINT;
use crate::{Error, Result};

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// How discovery probes interact with runtime cooldowns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// Probes neither consult nor set cooldowns.
    #[default]
    Ignore,
    /// Throttled probes start a cooldown; probing itself is never blocked.
    Record,
    /// Throttled probes start a cooldown and cooling models are reported as
    /// throttled without being probed.
    Enforce,
}

impl CooldownPolicy {
    pub fn records(&self) -> bool {
        matches!(self, Self::Record | Self::Enforce)
    }

    pub fn enforces(&self) -> bool {
        matches!(self, Self::Enforce)
    }
}

/// Models that were recently throttled and should be left alone for a while.
#[derive(Debug)]
pub struct CooldownTracker {
    default_cooldown: Duration,
    until: Mutex<HashMap<String, Instant>>,
}

impl CooldownTracker {
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            default_cooldown,
            until: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.until.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start (or extend) a cooldown. The server's hint wins when present.
    pub fn mark(&self, model: &str, retry_after: Option<Duration>) {
        let duration = retry_after
            .unwrap_or(self.default_cooldown)
            .min(MAX_RETRY_HINT);
        let now = Instant::now();
        let until = now.checked_add(duration).unwrap_or(now);
        let mut map = self.lock();
        let entry = map.entry(model.to_string()).or_insert(until);
        if *entry < until {
            *entry = until;
        }
        tracing::debug!(
            model,
            cooldown_ms = duration.as_millis() as u64,
            "model cooling down"
        );
    }

    pub fn remaining(&self, model: &str) -> Option<Duration> {
        let mut map = self.lock();
        let until = *map.get(model)?;
        let now = Instant::now();
        if until <= now {
            map.remove(model);
            return None;
        }
        Some(until - now)
    }

    pub fn is_cooling(&self, model: &str) -> bool {
        self.remaining(model).is_some()
    }

    pub fn check(&self, model: &str) -> Result<()> {
        match self.remaining(model) {
            Some(remaining) => Err(Error::CoolingDown {
                model: model.to_string(),
                remaining,
            }),
            None => Ok(()),
        }
    }

    pub fn clear(&self, model: &str) {
        self.lock().remove(model);
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
