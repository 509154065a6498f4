//! Sequential service readiness orchestration.
//!
//! Services are brought up one at a time in declared order. Each one is
//! probed once; if it is not already healthy its start command is issued and
//! the probe is polled at a fixed interval until it answers or the attempt
//! budget runs out. Values derived from a healthy response (the tunnel's
//! public URL) are written to the env file before the next service starts,
//! so later start commands can reference them as `${KEY}`.

pub mod report;

pub use report::{has_fatal_failure, DerivedValue, Outcome, ServiceReport};

use crate::env_file::EnvFile;
use crate::error::DevstackError;
use crate::launch::StartFailure;
use crate::service::ServiceSpec;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on a single sleep slice, so cancellation is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// CancelFlag
// ---------------------------------------------------------------------------

/// Shared interruption flag, set from a signal handler and checked between
/// poll attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first. Returns false when the
    /// flag was set before or during the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

/// Conditions that stop the whole run. Each carries the reports of the
/// services handled before the stop.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("invalid service plan: {0}")]
    InvalidPlan(String),

    #[error("could not persist {key} while bringing up '{service}': {source}")]
    ConfigPersistenceFailed {
        service: String,
        key: String,
        #[source]
        source: DevstackError,
        reports: Vec<ServiceReport>,
    },

    #[error("interrupted while bringing up '{service}'")]
    Interrupted {
        service: String,
        reports: Vec<ServiceReport>,
    },
}

impl RunError {
    pub fn reports(&self) -> &[ServiceReport] {
        match self {
            RunError::InvalidPlan(_) => &[],
            RunError::ConfigPersistenceFailed { reports, .. }
            | RunError::Interrupted { reports, .. } => reports,
        }
    }
}

/// Check names are unique and dependencies point backwards. Requiring every
/// dependency to be declared earlier also rules out cycles.
pub fn validate_plan(specs: &[ServiceSpec]) -> Result<(), RunError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for spec in specs {
        for dep in &spec.depends_on {
            if !seen.contains(dep.as_str()) {
                let detail = if specs.iter().any(|s| &s.name == dep) {
                    "is declared later; list dependencies first"
                } else {
                    "does not exist"
                };
                return Err(RunError::InvalidPlan(format!(
                    "service '{}' depends on '{}', which {}",
                    spec.name, dep, detail
                )));
            }
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(RunError::InvalidPlan(format!(
                "duplicate service name '{}'",
                spec.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

enum Halt {
    Interrupted,
    Persist { key: String, source: DevstackError },
}

pub struct Orchestrator<'a> {
    cancel: &'a CancelFlag,
    /// Services whose dependents must not start.
    blocked: HashSet<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(cancel: &'a CancelFlag) -> Self {
        Self {
            cancel,
            blocked: HashSet::new(),
        }
    }

    /// Bring up `specs` in order, writing derived values into `config`.
    pub fn run(
        mut self,
        specs: &[ServiceSpec],
        config: &mut EnvFile,
    ) -> Result<Vec<ServiceReport>, RunError> {
        validate_plan(specs)?;

        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            if self.cancel.is_cancelled() {
                return Err(RunError::Interrupted {
                    service: spec.name.clone(),
                    reports,
                });
            }

            let started_at = Utc::now();
            let clock = Instant::now();

            let result = match spec.depends_on.iter().find(|d| self.blocked.contains(*d)) {
                Some(dep) => {
                    tracing::warn!(service = %spec.name, dependency = %dep, "skipped: dependency did not start");
                    Ok((
                        Outcome::StartFailed {
                            cause: StartFailure::DependencyFailed {
                                dependency: dep.clone(),
                            },
                        },
                        None,
                    ))
                }
                None => self.bring_up(spec, config),
            };

            let (outcome, derived) = match result {
                Ok(r) => r,
                Err(Halt::Interrupted) => {
                    tracing::warn!(service = %spec.name, "interrupted");
                    return Err(RunError::Interrupted {
                        service: spec.name.clone(),
                        reports,
                    });
                }
                Err(Halt::Persist { key, source }) => {
                    tracing::error!(service = %spec.name, %key, "env file write failed: {source}");
                    return Err(RunError::ConfigPersistenceFailed {
                        service: spec.name.clone(),
                        key,
                        source,
                        reports,
                    });
                }
            };

            let blocks = match &outcome {
                Outcome::StartFailed { .. } => true,
                Outcome::StartedButUnhealthy { .. } => spec.require_healthy,
                _ => false,
            };
            if blocks {
                self.blocked.insert(spec.name.clone());
            }

            reports.push(ServiceReport {
                name: spec.name.clone(),
                outcome,
                derived,
                optional: spec.optional,
                started_at,
                elapsed_ms: clock.elapsed().as_millis() as u64,
            });
        }
        Ok(reports)
    }

    fn bring_up(
        &self,
        spec: &ServiceSpec,
        config: &mut EnvFile,
    ) -> Result<(Outcome, Option<DerivedValue>), Halt> {
        let name = spec.name.as_str();

        if let Ok(body) = spec.health.check(config) {
            tracing::info!(service = name, target = %spec.health.target(), "already running");
            let derived = derive(spec, &body, config)?;
            return Ok((Outcome::AlreadyRunning, derived));
        }

        tracing::info!(service = name, command = %spec.start.describe(), "starting");
        if let Err(cause) = spec.start.start(config) {
            tracing::error!(service = name, "{cause}");
            return Ok((Outcome::StartFailed { cause }, None));
        }

        // Last healthy response that a required derive rule found nothing in.
        let mut valueless: Option<String> = None;
        for attempt in 1..=spec.max_attempts {
            if !self.cancel.sleep(spec.poll_interval) {
                return Err(Halt::Interrupted);
            }
            match spec.health.check(config) {
                Ok(body) if awaits_value(spec, &body) => {
                    tracing::debug!(service = name, attempt, max = spec.max_attempts, "healthy, no value yet");
                    valueless = Some(body);
                }
                Ok(body) => {
                    tracing::info!(service = name, attempt, "healthy");
                    let derived = derive(spec, &body, config)?;
                    return Ok((Outcome::StartedAndHealthy, derived));
                }
                Err(e) => {
                    tracing::debug!(service = name, attempt, max = spec.max_attempts, "waiting: {e}");
                }
            }
        }

        if let Some(body) = valueless {
            tracing::warn!(
                service = name,
                attempts = spec.max_attempts,
                "healthy but no value to derive after all attempts"
            );
            let derived = derive(spec, &body, config)?;
            return Ok((Outcome::StartedAndHealthy, derived));
        }

        tracing::warn!(
            service = name,
            attempts = spec.max_attempts,
            "did not become healthy; continuing"
        );
        Ok((
            Outcome::StartedButUnhealthy {
                attempts: spec.max_attempts,
            },
            None,
        ))
    }
}

/// True when the spec's derive rule is required and `body` does not yield a
/// value yet.
fn awaits_value(spec: &ServiceSpec, body: &str) -> bool {
    spec.derive
        .as_ref()
        .is_some_and(|rule| rule.required && (rule.extract)(body).is_none())
}

/// Apply the spec's derive rule to a healthy response and persist the
/// result.
fn derive(
    spec: &ServiceSpec,
    body: &str,
    config: &mut EnvFile,
) -> Result<Option<DerivedValue>, Halt> {
    let Some(rule) = &spec.derive else {
        return Ok(None);
    };

    let (value, placeholder) = match (rule.extract)(body) {
        Some(v) => (v, false),
        None => match &rule.placeholder {
            Some(p) => {
                tracing::warn!(service = %spec.name, key = %rule.key, "no value in response; writing placeholder");
                (p.clone(), true)
            }
            None => {
                tracing::warn!(service = %spec.name, key = %rule.key, "no value in response");
                return Ok(None);
            }
        },
    };

    config
        .upsert(&rule.key, &value)
        .map_err(|source| Halt::Persist {
            key: rule.key.clone(),
            source,
        })?;
    tracing::info!(service = %spec.name, key = %rule.key, %value, "derived value saved");

    Ok(Some(DerivedValue {
        key: rule.key.clone(),
        value,
        placeholder,
    }))
}

/// Convenience wrapper for callers that do not need to keep the
/// orchestrator around.
pub fn run(
    specs: &[ServiceSpec],
    config: &mut EnvFile,
    cancel: &CancelFlag,
) -> Result<Vec<ServiceReport>, RunError> {
    Orchestrator::new(cancel).run(specs, config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
