//! Host personalities - a ranked one-word read of the latest host list.
//!
//! Each host gets the first label whose threshold it crosses, checked in
//! order: error rate, then p95 latency, then in-flight load. Hosts are ranked
//! by a combined score and only the top few are shown.

use std::fmt;

use shared_types::HostTelemetry;

/// Hosts kept by [`rank_hosts`] for display
pub const TOP_HOSTS: usize = 3;

const FLAKY_ERROR_RATE: f64 = 0.2;
const SLOW_P95_MS: u64 = 1500;
const BUSY_INFLIGHT: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Personality {
    Flaky,
    Slow,
    Busy,
    Steady,
}

impl Personality {
    pub fn classify(host: &HostTelemetry) -> Self {
        if host.error_rate > FLAKY_ERROR_RATE {
            Self::Flaky
        } else if host.p95_ms > SLOW_P95_MS {
            Self::Slow
        } else if host.inflight >= BUSY_INFLIGHT {
            Self::Busy
        } else {
            Self::Steady
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flaky => "flaky",
            Self::Slow => "slow",
            Self::Busy => "busy",
            Self::Steady => "steady",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::Flaky => "high error rates",
            Self::Slow => "p95 latency spikes",
            Self::Busy => "high inflight load",
            Self::Steady => "stable performance",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostPersonality {
    pub host: String,
    pub personality: Personality,
    pub score: f64,
}

impl HostPersonality {
    pub fn of(host: &HostTelemetry) -> Self {
        Self {
            host: host.host.clone(),
            personality: Personality::classify(host),
            score: score(host),
        }
    }
}

/// Higher means more attention-worthy.
pub fn score(host: &HostTelemetry) -> f64 {
    host.error_rate * 3.0 + host.p95_ms as f64 / 2000.0 + host.inflight as f64 / 5.0
}

/// Highest score first, at most `limit` entries. Ties keep input order.
pub fn rank_hosts(hosts: &[HostTelemetry], limit: usize) -> Vec<HostPersonality> {
    let mut ranked: Vec<HostPersonality> = hosts.iter().map(HostPersonality::of).collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(limit);
    ranked
}
