//! Diagnostics report types.

use serde::Serialize;

use crate::constants::{STABLE_MAX_DROPS, UNSTABLE_MAX_DROPS};

/// Status of the resolution and connectivity probes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    #[default]
    Pending,
    Checking,
    Healthy,
    Issue,
}

/// Outcome of one named connectivity check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Success,
    Failed,
}

/// One itemised connectivity check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckDetail {
    pub name: String,
    pub status: CheckStatus,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckDetail {
    #[must_use]
    pub fn success(name: &str, latency_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Success,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Failed,
            latency_ms: None,
            error: Some(error),
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == CheckStatus::Success
    }
}

/// Result of the resolution or connectivity probe.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub latency_ms: Option<u64>,
    pub details: Vec<CheckDetail>,
}

impl ProbeResult {
    /// Builds the connectivity result: healthy only if every check passed.
    #[must_use]
    pub fn from_checks(details: Vec<CheckDetail>) -> Self {
        let status = if details.iter().all(CheckDetail::succeeded) {
            ProbeStatus::Healthy
        } else {
            ProbeStatus::Issue
        };
        Self {
            status,
            latency_ms: None,
            details,
        }
    }

    fn checking(&self) -> Self {
        Self {
            status: ProbeStatus::Checking,
            ..self.clone()
        }
    }
}

/// Classification of the stability probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityStatus {
    #[default]
    Pending,
    Checking,
    Stable,
    Unstable,
    Poor,
}

impl StabilityStatus {
    /// `<= 1` drop is stable, `2` unstable, anything more poor.
    #[must_use]
    pub const fn from_drops(drops: usize) -> Self {
        if drops <= STABLE_MAX_DROPS {
            Self::Stable
        } else if drops <= UNSTABLE_MAX_DROPS {
            Self::Unstable
        } else {
            Self::Poor
        }
    }
}

/// Result of the sequential latency sampling.
///
/// `drop_count` always equals the number of `None` samples and
/// `average_latency_ms` is taken over the `Some` samples only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StabilityResult {
    pub status: StabilityStatus,
    pub samples: Vec<Option<u64>>,
    pub drop_count: usize,
    pub average_latency_ms: Option<u64>,
}

impl StabilityResult {
    #[must_use]
    pub fn from_samples(samples: Vec<Option<u64>>) -> Self {
        let drop_count = samples.iter().filter(|s| s.is_none()).count();
        let received: Vec<u64> = samples.iter().flatten().copied().collect();
        Self {
            status: StabilityStatus::from_drops(drop_count),
            average_latency_ms: rounded_mean(&received),
            samples,
            drop_count,
        }
    }

    fn checking(&self) -> Self {
        Self {
            status: StabilityStatus::Checking,
            ..self.clone()
        }
    }
}

/// Rounded arithmetic mean; `None` for an empty slice.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn rounded_mean(values: &[u64]) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    let sum: u64 = values.iter().sum();
    Some((sum as f64 / values.len() as f64).round() as u64)
}

/// Combined output of one diagnostics run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsReport {
    pub dns: ProbeResult,
    pub connectivity: ProbeResult,
    pub stability: StabilityResult,
}

impl DiagnosticsReport {
    /// Copy of this report with every section marked as checking.
    #[must_use]
    pub fn checking(&self) -> Self {
        Self {
            dns: self.dns.checking(),
            connectivity: self.connectivity.checking(),
            stability: self.stability.checking(),
        }
    }

    #[must_use]
    pub fn is_checking(&self) -> bool {
        self.dns.status == ProbeStatus::Checking
    }

    /// Status triple used to compare runs regardless of latency.
    #[must_use]
    pub fn classification(&self) -> (ProbeStatus, ProbeStatus, StabilityStatus) {
        (self.dns.status, self.connectivity.status, self.stability.status)
    }
}
