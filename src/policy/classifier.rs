use crate::models::transfer::{RatioSource, Transfer};
use serde::Deserialize;

/// Sharing policy thresholds, immutable for the duration of a pass
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Policy {
    #[serde(default = "default_max_ratio_complete")]
    pub max_ratio_complete: f64,
    #[serde(default = "default_max_ratio_incomplete")]
    pub max_ratio_incomplete: f64,
    #[serde(default = "default_dead_swarm_ratio")]
    pub dead_swarm_ratio: f64,
    #[serde(default = "default_dead_swarm_min_availability")]
    pub dead_swarm_min_availability: f64,
    #[serde(default = "default_notify_ratio")]
    pub notify_ratio: f64,
    #[serde(default)]
    pub ratio_source: RatioSource,
}

fn default_max_ratio_complete() -> f64 {
    7.5
}

fn default_max_ratio_incomplete() -> f64 {
    5.0
}

fn default_dead_swarm_ratio() -> f64 {
    10.0
}

fn default_dead_swarm_min_availability() -> f64 {
    0.5
}

fn default_notify_ratio() -> f64 {
    3.0
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_ratio_complete: default_max_ratio_complete(),
            max_ratio_incomplete: default_max_ratio_incomplete(),
            dead_swarm_ratio: default_dead_swarm_ratio(),
            dead_swarm_min_availability: default_dead_swarm_min_availability(),
            notify_ratio: default_notify_ratio(),
            ratio_source: RatioSource::default(),
        }
    }
}

/// Why a transfer was left out of classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Share limit already forced to 0
    SeedingDisabled,
    /// Paused or stopped by someone else
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Skip(SkipReason),
    Compliant,
    Warn { ratio: f64 },
    OverLimit { ratio: f64 },
    /// Always over the limit as well; the strongest verdict
    DeadSwarm { ratio: f64 },
}

impl Verdict {
    /// True for both OverLimit and DeadSwarm
    pub fn is_over_limit(&self) -> bool {
        matches!(self, Verdict::OverLimit { .. } | Verdict::DeadSwarm { .. })
    }

    pub fn is_dead_swarm(&self) -> bool {
        matches!(self, Verdict::DeadSwarm { .. })
    }
}

/// Classify one transfer against the sharing policy. First matching rule wins.
pub fn classify(transfer: &Transfer, policy: &Policy) -> Verdict {
    if transfer.share_limit.is_seeding_disabled() {
        return Verdict::Skip(SkipReason::SeedingDisabled);
    }

    if transfer.state.is_inactive() {
        return Verdict::Skip(SkipReason::Inactive);
    }

    let ratio = transfer.ratio_for(policy.ratio_source);
    let complete = transfer.is_complete();
    let threshold = if complete {
        policy.max_ratio_complete
    } else {
        policy.max_ratio_incomplete
    };

    if ratio > threshold {
        let starved = transfer
            .availability
            .known()
            .is_some_and(|avail| avail < policy.dead_swarm_min_availability);

        if !complete && ratio > policy.dead_swarm_ratio && starved {
            return Verdict::DeadSwarm { ratio };
        }
        return Verdict::OverLimit { ratio };
    }

    if ratio > policy.notify_ratio {
        return Verdict::Warn { ratio };
    }

    Verdict::Compliant
}
