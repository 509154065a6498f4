use crate::error::{DevstackError, Result};
use crate::launch::ProcessCommand;
use crate::probe::{Expect, HttpProbe};
use crate::service::{DeriveRule, Extractor, ServiceSpec};
use crate::tunnel::{self, TUNNEL_URL_KEY, TUNNEL_URL_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MANIFEST_FILE: &str = "devstack.yaml";

// ---------------------------------------------------------------------------
// ManifestWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// HealthConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// May reference env values, e.g. `http://localhost:${PORT}/`. They are
    /// resolved on every probe, so a value derived earlier in the same run
    /// is seen by later health checks.
    pub url: String,
    #[serde(default)]
    pub expect: Expect,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl HealthConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expect: Expect::default(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn probe(&self) -> HttpProbe {
        HttpProbe::new(
            self.url.clone(),
            self.expect,
            Duration::from_millis(self.timeout_ms),
        )
    }
}

// ---------------------------------------------------------------------------
// DeriveConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// First `https` entry of a tunnel client's `/api/tunnels` response.
    #[default]
    HttpsTunnel,
}

impl ExtractorKind {
    pub fn extractor(self) -> Extractor {
        match self {
            ExtractorKind::HttpsTunnel => tunnel::extract_https_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeriveConfig {
    pub key: String,
    #[serde(default)]
    pub extractor: ExtractorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Keep polling after start until the response yields a value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

impl DeriveConfig {
    pub fn rule(&self) -> DeriveRule {
        DeriveRule {
            key: self.key.clone(),
            extract: self.extractor.extractor(),
            placeholder: self.placeholder.clone(),
            required: self.required,
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: ProcessCommand,
    pub health: HealthConfig,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub require_healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<DeriveConfig>,
    /// Pages to open in the browser once the service is healthy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub open: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    30
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, start: ProcessCommand, health: HealthConfig) -> Self {
        Self {
            name: name.into(),
            description: None,
            start,
            health,
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            depends_on: Vec::new(),
            optional: false,
            require_healthy: false,
            derive: None,
            open: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Env keys that must hold a generated API key before anything starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

fn default_version() -> u32 {
    1
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".devstack/logs")
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: default_version(),
            env_file: default_env_file(),
            log_dir: default_log_dir(),
            secrets: Vec::new(),
            services: Vec::new(),
        }
    }
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

impl Manifest {
    pub fn load(root: &Path) -> Result<Self> {
        let path = manifest_path(root);
        if !path.exists() {
            return Err(DevstackError::ManifestNotFound(path));
        }
        let data = std::fs::read_to_string(&path)?;
        let manifest: Manifest = serde_yaml::from_str(&data)?;
        Ok(manifest)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&manifest_path(root), data.as_bytes())
    }

    pub fn env_path(&self, root: &Path) -> PathBuf {
        root.join(&self.env_file)
    }

    pub fn log_path(&self, root: &Path, service: &str) -> PathBuf {
        root.join(&self.log_dir).join(format!("{service}.log"))
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// The first service whose derive rule reads a tunnel descriptor.
    pub fn tunnel_service(&self) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| {
            s.derive
                .as_ref()
                .is_some_and(|d| d.extractor == ExtractorKind::HttpsTunnel)
        })
    }

    /// Restrict the manifest to `names` plus everything they depend on,
    /// keeping the declared order.
    pub fn subset(&self, names: &[String]) -> Result<Manifest> {
        let mut wanted: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        for name in names {
            if self.service(name).is_none() {
                return Err(DevstackError::ServiceNotFound(name.clone()));
            }
            stack.push(name);
        }
        while let Some(name) = stack.pop() {
            if !wanted.insert(name) {
                continue;
            }
            if let Some(svc) = self.service(name) {
                stack.extend(svc.depends_on.iter().map(String::as_str));
            }
        }
        Ok(Manifest {
            services: self
                .services
                .iter()
                .filter(|s| wanted.contains(s.name.as_str()))
                .cloned()
                .collect(),
            ..self.clone()
        })
    }

    /// Build the runtime specs. `${KEY}` references in health URLs and start
    /// commands stay unresolved until the orchestrator uses them.
    pub fn service_specs(&self, root: &Path) -> Result<Vec<ServiceSpec>> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(DevstackError::InvalidManifest(errors.join("; ")));
        }

        let specs = self
            .services
            .iter()
            .map(|svc| {
                let mut start = svc.start.clone();
                start.cwd = Some(match &start.cwd {
                    Some(dir) => root.join(dir),
                    None => root.to_path_buf(),
                });
                start.log_file = Some(self.log_path(root, &svc.name));

                let mut spec = ServiceSpec::new(svc.name.clone(), start, svc.health.probe())
                    .poll(
                        Duration::from_millis(svc.poll_interval_ms),
                        svc.max_attempts,
                    )
                    .depends_on(svc.depends_on.iter().cloned())
                    .optional(svc.optional)
                    .require_healthy(svc.require_healthy);
                if let Some(d) = &svc.derive {
                    spec = spec.derive(d.rule());
                }
                spec
            })
            .collect();
        Ok(specs)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ManifestWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ManifestWarning {
            level: WarnLevel::Error,
            message,
        };
        let warning = |message: String| ManifestWarning {
            level: WarnLevel::Warning,
            message,
        };

        if self.services.is_empty() {
            warnings.push(warning("no services declared".to_string()));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for svc in &self.services {
            if svc.name.trim().is_empty() {
                warnings.push(error("service with an empty name".to_string()));
            }

            // Dependencies must be declared earlier; this also rules out cycles.
            for dep in &svc.depends_on {
                if seen.contains(dep.as_str()) {
                    continue;
                }
                if self.service(dep).is_some() {
                    warnings.push(error(format!(
                        "service '{}' depends on '{}', which is declared later",
                        svc.name, dep
                    )));
                } else {
                    warnings.push(error(format!(
                        "service '{}' depends on unknown service '{}'",
                        svc.name, dep
                    )));
                }
            }

            if !seen.insert(svc.name.as_str()) {
                warnings.push(error(format!("duplicate service name '{}'", svc.name)));
            }

            if svc.start.program.trim().is_empty() {
                warnings.push(error(format!(
                    "service '{}' has an empty start program",
                    svc.name
                )));
            }

            if svc.health.url.trim().is_empty() {
                warnings.push(error(format!(
                    "service '{}' has an empty health url",
                    svc.name
                )));
            }

            if svc.max_attempts == 0 {
                warnings.push(error(format!(
                    "service '{}' has max_attempts=0; it could never become healthy",
                    svc.name
                )));
            } else if svc.max_attempts > 300 {
                warnings.push(warning(format!(
                    "service '{}' has max_attempts={} (>300 is unusual)",
                    svc.name, svc.max_attempts
                )));
            }

            if svc.poll_interval_ms == 0 {
                warnings.push(warning(format!(
                    "service '{}' polls without a pause (poll_interval_ms=0)",
                    svc.name
                )));
            }

            if let Some(d) = &svc.derive {
                if crate::env_file::validate_key(&d.key).is_err() {
                    warnings.push(error(format!(
                        "service '{}' derives into invalid env key '{}'",
                        svc.name, d.key
                    )));
                }
            }
        }

        for key in &self.secrets {
            if crate::env_file::validate_key(key).is_err() {
                warnings.push(error(format!("invalid secret key '{key}'")));
            }
        }

        warnings
    }

    // -----------------------------------------------------------------------
    // Default stack
    // -----------------------------------------------------------------------

    /// The WhatsApp bot development stack: local LLM server, messaging
    /// gateway container, public tunnel and the bot API.
    pub fn whatsapp_bot() -> Self {
        let mut llm = ServiceConfig::new(
            "llm",
            ProcessCommand::new("ollama").args(["serve"]),
            HealthConfig::new("http://localhost:11434/api/tags"),
        );
        llm.description = Some("Local LLM server".to_string());
        llm.max_attempts = 15;
        llm.optional = true;

        let mut gateway = ServiceConfig::new(
            "gateway",
            ProcessCommand::new("docker").args([
                "run",
                "-d",
                "--rm",
                "-p",
                "127.0.0.1:3000:3000",
                "-e",
                "WAHA_API_KEY=${WAHA_API_KEY}",
                "-e",
                "WHATSAPP_DEFAULT_ENGINE=WEBJS",
                "-e",
                "WAHA_PRINT_QR=true",
                "-e",
                "WAHA_API_KEY_EXCLUDE_PATH=health,ping,version",
                "--name",
                "waha-bot",
                "devlikeapro/waha:latest",
            ]),
            HealthConfig::new("http://localhost:3000/ping"),
        );
        gateway.description = Some("WhatsApp HTTP gateway container".to_string());
        gateway.max_attempts = 60;
        gateway.open = vec!["http://localhost:3000/dashboard".to_string()];

        let mut tunnel = ServiceConfig::new(
            "tunnel",
            ProcessCommand::new("ngrok").args(["http", "${PORT}", "--log", "stdout"]),
            HealthConfig::new("http://localhost:4040/api/tunnels"),
        );
        tunnel.description = Some("Public HTTPS tunnel to the API".to_string());
        tunnel.max_attempts = 15;
        tunnel.derive = Some(DeriveConfig {
            key: TUNNEL_URL_KEY.to_string(),
            extractor: ExtractorKind::HttpsTunnel,
            placeholder: Some(TUNNEL_URL_PLACEHOLDER.to_string()),
            required: true,
        });
        tunnel.open = vec!["http://localhost:4040".to_string()];

        let mut api = ServiceConfig::new(
            "api",
            ProcessCommand::new("python").args([
                "-m",
                "uvicorn",
                "app.main:app",
                "--host",
                "0.0.0.0",
                "--port",
                "${PORT}",
                "--reload",
            ]),
            HealthConfig::new("http://localhost:${PORT}/"),
        );
        api.description = Some("Bot API".to_string());
        api.depends_on = vec!["gateway".to_string()];
        api.open = vec!["http://localhost:${PORT}/docs".to_string()];

        Self {
            secrets: vec!["WAHA_API_KEY".to_string()],
            services: vec![llm, gateway, tunnel, api],
            ..Self::default()
        }
    }
}

/// Env values seeded by `devstack init` when absent.
pub fn default_env() -> Vec<(&'static str, &'static str)> {
    vec![
        ("PORT", "8000"),
        ("HOST", "0.0.0.0"),
        ("WAHA_BASE_URL", "http://localhost:3000"),
        ("WHATSAPP_SESSION_NAME", "default"),
        ("OLLAMA_BASE_URL", "http://localhost:11434"),
        ("LLM_MODEL", "llama3.1"),
        (TUNNEL_URL_KEY, TUNNEL_URL_PLACEHOLDER),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn svc(name: &str) -> ServiceConfig {
        ServiceConfig::new(
            name,
            ProcessCommand::new("true"),
            HealthConfig::new("http://localhost:1/"),
        )
    }

    fn errors(m: &Manifest) -> Vec<String> {
        m.validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect()
    }

    #[test]
    fn default_stack_validates_clean() {
        let m = Manifest::whatsapp_bot();
        assert!(m.validate().is_empty(), "{:?}", m.validate());
        assert_eq!(m.tunnel_service().map(|s| s.name.as_str()), Some("tunnel"));
    }

    #[test]
    fn yaml_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let m = Manifest::whatsapp_bot();
        m.save(dir.path()).unwrap();
        let loaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(loaded, m);
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let yaml = "services:\n  - name: api\n    start: { program: python }\n    health: { url: 'http://localhost:8000/' }\n";
        let m: Manifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(m.env_file, PathBuf::from(".env"));
        let api = &m.services[0];
        assert_eq!(api.poll_interval_ms, 2_000);
        assert_eq!(api.max_attempts, 30);
        assert_eq!(api.health.expect, Expect::Reachable);
        assert_eq!(api.health.timeout_ms, 5_000);
        assert!(!api.optional);
    }

    #[test]
    fn derive_yaml_tagged_snake_case() {
        let yaml = "key: NGROK_URL\nextractor: https_tunnel\n";
        let d: DeriveConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.extractor, ExtractorKind::HttpsTunnel);
        assert!(d.placeholder.is_none());
    }

    #[test]
    fn load_missing_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Manifest::load(dir.path()),
            Err(DevstackError::ManifestNotFound(_))
        ));
    }

    #[test]
    fn validate_duplicate_names() {
        let m = Manifest {
            services: vec![svc("api"), svc("api")],
            ..Manifest::default()
        };
        assert!(errors(&m).iter().any(|e| e.contains("duplicate service name 'api'")));
    }

    #[test]
    fn validate_forward_and_unknown_dependencies() {
        let mut api = svc("api");
        api.depends_on = vec!["gateway".to_string(), "db".to_string()];
        let m = Manifest {
            services: vec![api, svc("gateway")],
            ..Manifest::default()
        };
        let errs = errors(&m);
        assert!(errs.iter().any(|e| e.contains("declared later")));
        assert!(errs.iter().any(|e| e.contains("unknown service 'db'")));
    }

    #[test]
    fn validate_attempts_and_interval() {
        let mut zero = svc("zero");
        zero.max_attempts = 0;
        let mut many = svc("many");
        many.max_attempts = 1_000;
        many.poll_interval_ms = 0;
        let m = Manifest {
            services: vec![zero, many],
            ..Manifest::default()
        };
        let warnings = m.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("max_attempts=0")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains(">300")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("poll_interval_ms=0")));
    }

    #[test]
    fn validate_empty_program_and_url() {
        let mut bad = svc("bad");
        bad.start.program = " ".to_string();
        bad.health.url = String::new();
        let m = Manifest {
            services: vec![bad],
            ..Manifest::default()
        };
        let errs = errors(&m);
        assert!(errs.iter().any(|e| e.contains("empty start program")));
        assert!(errs.iter().any(|e| e.contains("empty health url")));
    }

    #[test]
    fn service_specs_keep_health_url_template_and_log_file() {
        let dir = TempDir::new().unwrap();
        let m = Manifest::whatsapp_bot();
        let specs = m.service_specs(dir.path()).unwrap();
        assert_eq!(specs.len(), 4);
        let api = specs.iter().find(|s| s.name == "api").unwrap();
        assert_eq!(api.health.target(), "http://localhost:${PORT}/");
        assert_eq!(api.depends_on, vec!["gateway".to_string()]);
        let tunnel = specs.iter().find(|s| s.name == "tunnel").unwrap();
        assert!(tunnel.derive.as_ref().unwrap().required);
        assert_eq!(
            m.log_path(dir.path(), "api"),
            dir.path().join(".devstack/logs/api.log")
        );
    }

    #[test]
    fn service_specs_refuse_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        let m = Manifest {
            services: vec![svc("api"), svc("api")],
            ..Manifest::default()
        };
        assert!(matches!(
            m.service_specs(dir.path()),
            Err(DevstackError::InvalidManifest(_))
        ));
    }

    #[test]
    fn subset_pulls_in_dependencies_in_order() {
        let m = Manifest::whatsapp_bot();
        let only = m.subset(&["api".to_string()]).unwrap();
        let names: Vec<&str> = only.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["gateway", "api"]);

        assert!(matches!(
            m.subset(&["nope".to_string()]),
            Err(DevstackError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn default_env_seeds_tunnel_placeholder() {
        let env = default_env();
        assert!(env.contains(&("PORT", "8000")));
        assert!(env.contains(&(TUNNEL_URL_KEY, TUNNEL_URL_PLACEHOLDER)));
    }
}
