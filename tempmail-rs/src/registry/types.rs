use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DomainSeed;

/// A receiving domain with its listener port and quota counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    /// Domain name, e.g. `example.com`
    pub name: String,
    /// Whether a listener is started for it and addresses are allocated on it
    pub enabled: bool,
    /// SMTP port of this domain's listener
    pub port: u16,
    /// Quota: maximum number of stored messages
    pub max_accepted: u64,
    /// Messages currently counted against the quota
    pub accepted: u64,
    /// Last time an address was allocated or a message counted
    pub last_used_at: Option<DateTime<Utc>>,
}

impl Domain {
    pub fn new(name: impl Into<String>, port: u16, max_accepted: u64) -> Self {
        Domain {
            name: name.into(),
            enabled: true,
            port,
            max_accepted,
            accepted: 0,
            last_used_at: None,
        }
    }

    /// Enabled and below quota
    pub fn is_healthy(&self) -> bool {
        self.enabled && !self.is_quota_reached()
    }

    pub fn is_quota_reached(&self) -> bool {
        self.accepted >= self.max_accepted
    }

    /// Apply a signed delta, clamping at zero
    pub(crate) fn apply_delta(&mut self, delta: i64) {
        if delta >= 0 {
            self.accepted = self.accepted.saturating_add(delta as u64);
        } else {
            self.accepted = self.accepted.saturating_sub(delta.unsigned_abs());
        }
    }
}

impl From<&DomainSeed> for Domain {
    fn from(seed: &DomainSeed) -> Self {
        Domain {
            enabled: seed.enabled,
            ..Domain::new(seed.name.clone(), seed.port, seed.max_accepted)
        }
    }
}

/// Aggregate registry counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    pub total: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub total_accepted: u64,
}

/// On-disk layout of the registry snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RegistrySnapshot {
    pub domains: Vec<Domain>,
}
