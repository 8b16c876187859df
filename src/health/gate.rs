// ABOUTME: Turns probe outcomes into an immutable health verdict.
// ABOUTME: ANY needs one successful probe, ALL needs every probe; no probes is never healthy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::poll::ProbeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePolicy {
    /// At least one probe succeeded.
    #[default]
    Any,
    /// Every probe succeeded.
    All,
}

impl fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatePolicy::Any => f.write_str("any"),
            GatePolicy::All => f.write_str("all"),
        }
    }
}

/// What the verdict remembers about one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeRecord {
    pub name: String,
    pub success: bool,
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    pub last_error: Option<String>,
}

impl From<&ProbeResult> for ProbeRecord {
    fn from(result: &ProbeResult) -> Self {
        Self {
            name: result.name.clone(),
            success: result.success(),
            attempts: result.attempts,
            latency: result.elapsed,
            last_error: result.last_error.clone(),
        }
    }
}

/// Healthy or not, and why. Cannot be changed once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    healthy: bool,
    policy: GatePolicy,
    probes: Vec<ProbeRecord>,
}

impl Verdict {
    pub fn healthy(&self) -> bool {
        self.healthy
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    pub fn probes(&self) -> &[ProbeRecord] {
        &self.probes
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self.probes.iter().filter(|p| p.success).count();
        write!(
            f,
            "{} ({}/{} probes passed, policy {})",
            if self.healthy { "healthy" } else { "unhealthy" },
            passed,
            self.probes.len(),
            self.policy
        )
    }
}

pub struct HealthGate;

impl HealthGate {
    pub fn evaluate(results: &[ProbeResult], policy: GatePolicy) -> Verdict {
        let probes: Vec<ProbeRecord> = results.iter().map(ProbeRecord::from).collect();
        let healthy = !probes.is_empty()
            && match policy {
                GatePolicy::Any => probes.iter().any(|p| p.success),
                GatePolicy::All => probes.iter().all(|p| p.success),
            };
        Verdict {
            healthy,
            policy,
            probes,
        }
    }
}
