use crate::env_file::EnvFile;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("{target} unreachable: {message}")]
    Unreachable { target: String, message: String },

    #[error("{target} answered with status {status}")]
    Status { target: String, status: u16 },

    #[error("{target} not ready: {message}")]
    NotReady { target: String, message: String },
}

// ---------------------------------------------------------------------------
// HealthCheck
// ---------------------------------------------------------------------------

/// A side-effect-free readiness probe.
///
/// `check` returns the raw response body when the service counts as healthy;
/// the orchestrator hands that body to the service's derive rule. `config`
/// is the env file as it stands at probe time, so `${KEY}` references see
/// values derived earlier in the same run.
pub trait HealthCheck: Send + Sync {
    fn check(&self, config: &EnvFile) -> Result<String, ProbeError>;

    /// Human-readable probe target for logs and tables.
    fn target(&self) -> String;
}

/// What an HTTP answer has to look like to count as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// Any HTTP response. Only transport errors count as unhealthy.
    #[default]
    Reachable,
    /// A 2xx response.
    Success,
}

// ---------------------------------------------------------------------------
// HttpProbe
// ---------------------------------------------------------------------------

pub struct HttpProbe {
    /// May contain `${KEY}` references, resolved on every check.
    url: String,
    expect: Expect,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, expect: Expect, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            expect,
            timeout,
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl HealthCheck for HttpProbe {
    fn check(&self, config: &EnvFile) -> Result<String, ProbeError> {
        let url = config.interpolate(&self.url);
        let unreachable = |e: reqwest::Error| ProbeError::Unreachable {
            target: url.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .map_err(unreachable)?;

        let status = response.status();
        if self.expect == Expect::Success && !status.is_success() {
            return Err(ProbeError::Status {
                target: url.clone(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(unreachable)
    }

    fn target(&self) -> String {
        self.url.clone()
    }
}

// ---------------------------------------------------------------------------
// PredicateProbe
// ---------------------------------------------------------------------------

/// A probe backed by an arbitrary function, for services that are not
/// reachable over HTTP.
pub struct PredicateProbe<F> {
    name: String,
    predicate: F,
}

impl<F> PredicateProbe<F>
where
    F: Fn() -> Result<String, ProbeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> HealthCheck for PredicateProbe<F>
where
    F: Fn() -> Result<String, ProbeError> + Send + Sync,
{
    fn check(&self, _config: &EnvFile) -> Result<String, ProbeError> {
        (self.predicate)()
    }

    fn target(&self) -> String {
        self.name.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> EnvFile {
        EnvFile::parse(".env", "")
    }

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/ping")
    }

    #[test]
    fn reachable_returns_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/api/tunnels")
            .with_status(200)
            .with_body(r#"{"tunnels":[]}"#)
            .create();

        let probe = HttpProbe::new(
            format!("{}/api/tunnels", server.url()),
            Expect::Reachable,
            Duration::from_secs(2),
        );
        assert_eq!(probe.check(&empty()).unwrap(), r#"{"tunnels":[]}"#);
        mock.assert();
    }

    #[test]
    fn reachable_ignores_status_code() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/").with_status(401).create();

        let probe = HttpProbe::new(server.url(), Expect::Reachable, Duration::from_secs(2));
        assert!(probe.check(&empty()).is_ok());
    }

    #[test]
    fn success_rejects_non_2xx() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/health").with_status(503).create();

        let probe = HttpProbe::new(
            format!("{}/health", server.url()),
            Expect::Success,
            Duration::from_secs(2),
        );
        match probe.check(&empty()) {
            Err(ProbeError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn closed_port_is_unreachable() {
        let probe = HttpProbe::new(closed_port_url(), Expect::Reachable, Duration::from_secs(2));
        assert!(matches!(
            probe.check(&empty()),
            Err(ProbeError::Unreachable { .. })
        ));
    }

    #[test]
    fn url_is_resolved_from_env_at_check_time() {
        let mut server = mockito::Server::new();
        let mock = server.mock("GET", "/").with_status(200).create();
        let port = server.host_with_port().rsplit(':').next().unwrap().to_string();

        let probe = HttpProbe::new(
            "http://127.0.0.1:${PORT}/",
            Expect::Success,
            Duration::from_secs(2),
        );
        let before = EnvFile::parse(".env", "PORT=1\n");
        assert!(probe.check(&before).is_err());

        let after = EnvFile::parse(".env", &format!("PORT={port}\n"));
        assert!(probe.check(&after).is_ok());
        assert_eq!(probe.target(), "http://127.0.0.1:${PORT}/");
        mock.assert();
    }

    #[test]
    fn predicate_probe_delegates() {
        let probe = PredicateProbe::new("socket", || Ok("up".to_string()));
        assert_eq!(probe.check(&empty()).unwrap(), "up");
        assert_eq!(probe.target(), "socket");
    }

    #[test]
    fn expect_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Expect::Reachable).unwrap(), "\"reachable\"");
        let parsed: Expect = serde_yaml::from_str("success").unwrap();
        assert_eq!(parsed, Expect::Success);
    }
}
