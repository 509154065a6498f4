//! Per-service outcomes of an orchestration run.

use crate::launch::StartFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a single service ended up after `run`.
///
/// Transitions within one run:
/// `probe ok → AlreadyRunning`,
/// `probe fail → start → (poll ok → StartedAndHealthy | exhausted → StartedButUnhealthy)`,
/// `start error | failed dependency → StartFailed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    AlreadyRunning,
    StartedAndHealthy,
    StartedButUnhealthy { attempts: u32 },
    StartFailed { cause: StartFailure },
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::AlreadyRunning => "already_running",
            Outcome::StartedAndHealthy => "started_and_healthy",
            Outcome::StartedButUnhealthy { .. } => "started_but_unhealthy",
            Outcome::StartFailed { .. } => "start_failed",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Outcome::AlreadyRunning | Outcome::StartedAndHealthy)
    }

    pub fn is_start_failure(&self) -> bool {
        matches!(self, Outcome::StartFailed { .. })
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::AlreadyRunning => write!(f, "already running"),
            Outcome::StartedAndHealthy => write!(f, "started"),
            Outcome::StartedButUnhealthy { attempts } => {
                write!(f, "not healthy after {attempts} attempts")
            }
            Outcome::StartFailed { cause } => write!(f, "failed: {cause}"),
        }
    }
}

// ---------------------------------------------------------------------------
// DerivedValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedValue {
    pub key: String,
    pub value: String,
    /// True when the extractor found nothing and the declared placeholder
    /// was written instead.
    #[serde(default)]
    pub placeholder: bool,
}

// ---------------------------------------------------------------------------
// ServiceReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceReport {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedValue>,
    pub optional: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ServiceReport {
    /// A start failure on a service the run cannot do without.
    pub fn is_fatal(&self) -> bool {
        !self.optional && self.outcome.is_start_failure()
    }
}

/// True when any non-optional service failed to start.
pub fn has_fatal_failure(reports: &[ServiceReport]) -> bool {
    reports.iter().any(ServiceReport::is_fatal)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
