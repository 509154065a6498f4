use crate::launch::StartAction;
use crate::probe::HealthCheck;
use std::time::Duration;

/// Turns a raw health-check response into a derived value.
pub type Extractor = fn(&str) -> Option<String>;

/// Where a service's derived value goes in the env file.
#[derive(Clone)]
pub struct DeriveRule {
    pub key: String,
    pub extract: Extractor,
    /// Written instead when the extractor finds nothing.
    pub placeholder: Option<String>,
    /// While polling after a start, a healthy response the extractor finds
    /// nothing in counts as not ready yet. The placeholder is only written
    /// when the service was already running or the attempts run out.
    pub required: bool,
}

impl std::fmt::Debug for DeriveRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeriveRule")
            .field("key", &self.key)
            .field("placeholder", &self.placeholder)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// One external service in start order.
pub struct ServiceSpec {
    pub name: String,
    pub start: Box<dyn StartAction>,
    pub health: Box<dyn HealthCheck>,
    pub poll_interval: Duration,
    /// Number of polls after the start command; the pre-start probe is not
    /// counted.
    pub max_attempts: u32,
    pub derive: Option<DeriveRule>,
    /// Services declared earlier that must not have failed.
    pub depends_on: Vec<String>,
    /// A failure of this service does not fail the run.
    pub optional: bool,
    /// Treat exhausted polling as a failure for dependents.
    pub require_healthy: bool,
}

impl ServiceSpec {
    pub fn new(
        name: impl Into<String>,
        start: impl StartAction + 'static,
        health: impl HealthCheck + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            start: Box::new(start),
            health: Box::new(health),
            poll_interval: Duration::from_secs(2),
            max_attempts: 30,
            derive: None,
            depends_on: Vec::new(),
            optional: false,
            require_healthy: false,
        }
    }

    pub fn poll(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts;
        self
    }

    pub fn derive(mut self, rule: DeriveRule) -> Self {
        self.derive = Some(rule);
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn require_healthy(mut self, require: bool) -> Self {
        self.require_healthy = require;
        self
    }
}

impl std::fmt::Debug for ServiceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSpec")
            .field("name", &self.name)
            .field("start", &self.start.describe())
            .field("health", &self.health.target())
            .field("poll_interval", &self.poll_interval)
            .field("max_attempts", &self.max_attempts)
            .field("depends_on", &self.depends_on)
            .field("optional", &self.optional)
            .finish()
    }
}
