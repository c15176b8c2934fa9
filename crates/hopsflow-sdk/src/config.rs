//! Bootstrap configuration.
//!
//! Read from a JSON attributes file, then patched from the environment so
//! that secrets need not live on disk next to the rest of the settings.
//!
//! ```json
//! {
//!   "registry": { "kind": "consul", "agent_url": "http://127.0.0.1:8500" },
//!   "platform": { "trust": { "mode": "network_placement" }, "read_timeout_secs": 120 },
//!   "user": { "email": "airflow@hopsworks.ai", "password": "..." },
//!   "api_key": { "file": "/srv/hops/airflow/secrets/api_key", "owner": "airflow", "group": "airflow" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hopsflow_models::{
    validate_prefix, ApiKeyScope, FileMode, PlatformScheme, RegistryQuery, ServiceCredentials,
    ServiceEndpoint, DEFAULT_KEY_PREFIX,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bootstrap::CredentialBootstrapper;
use crate::error::SdkError;
use crate::jobs::JobsClient;
use crate::key_file::KeyFileSpec;
use crate::platform::{PlatformOptions, PlatformTrust, DEFAULT_READ_TIMEOUT};
use crate::registry::{
    ConsulRegistry, ResolvedService, ServiceRegistry, StaticRegistry, DEFAULT_CONSUL_DOMAIN,
    DEFAULT_CONSUL_URL,
};

/// Where the platform's address comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RegistryConfig {
    /// Ask a Consul agent.
    Consul {
        /// Agent HTTP API.
        #[serde(default = "default_consul_url")]
        agent_url: String,
        /// DNS domain for service names.
        #[serde(default = "default_consul_domain")]
        domain: String,
        /// Lookup to perform.
        #[serde(default)]
        query: RegistryQuery,
    },
    /// Fixed host and port.
    Static {
        /// Platform host.
        host: String,
        /// Platform port.
        port: u16,
    },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::Consul {
            agent_url: default_consul_url(),
            domain: default_consul_domain(),
            query: RegistryQuery::default(),
        }
    }
}

impl RegistryConfig {
    /// Build the registry this configuration describes.
    pub fn build(&self) -> Result<ConfiguredRegistry, SdkError> {
        Ok(match self {
            Self::Consul {
                agent_url, domain, ..
            } => ConfiguredRegistry::Consul(ConsulRegistry::new(agent_url)?.with_domain(domain)),
            Self::Static { host, port } => {
                ConfiguredRegistry::Static(StaticRegistry::new(Some(host.clone()), Some(*port)))
            }
        })
    }

    /// The lookup to perform; the default platform query for static registries.
    pub fn query(&self) -> RegistryQuery {
        match self {
            Self::Consul { query, .. } => query.clone(),
            Self::Static { .. } => RegistryQuery::platform(),
        }
    }
}

/// A registry chosen at runtime from [`RegistryConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredRegistry {
    /// See [`ConsulRegistry`].
    Consul(ConsulRegistry),
    /// See [`StaticRegistry`].
    Static(StaticRegistry),
}

impl ServiceRegistry for ConfiguredRegistry {
    async fn resolve(&self, query: &RegistryQuery) -> Result<ResolvedService, SdkError> {
        match self {
            Self::Consul(r) => r.resolve(query).await,
            Self::Static(r) => r.resolve(query).await,
        }
    }
}

/// Connection settings for the platform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// URL scheme.
    #[serde(default)]
    pub scheme: PlatformScheme,
    /// Certificate verification policy.
    #[serde(default)]
    pub trust: PlatformTrust,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            scheme: PlatformScheme::default(),
            trust: PlatformTrust::default(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl PlatformConfig {
    /// As client options.
    pub fn options(&self) -> PlatformOptions {
        PlatformOptions {
            scheme: self.scheme,
            trust: self.trust.clone(),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

/// The key to request and where to keep it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyConfig {
    /// Key name prefix.
    #[serde(default = "default_key_prefix")]
    pub prefix: String,
    /// Requested scope.
    #[serde(default)]
    pub scope: ApiKeyScope,
    /// Key file path.
    #[serde(default)]
    pub file: PathBuf,
    /// Key file permission bits.
    #[serde(default)]
    pub mode: FileMode,
    /// Key file owner.
    #[serde(default)]
    pub owner: Option<String>,
    /// Key file group.
    #[serde(default)]
    pub group: Option<String>,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            prefix: default_key_prefix(),
            scope: ApiKeyScope::default(),
            file: PathBuf::new(),
            mode: FileMode::default(),
            owner: None,
            group: None,
        }
    }
}

impl ApiKeyConfig {
    /// The key file part of this section.
    pub fn key_file(&self) -> KeyFileSpec {
        KeyFileSpec {
            path: self.file.clone(),
            mode: self.mode,
            owner: self.owner.clone(),
            group: self.group.clone(),
        }
    }
}

/// Complete configuration of a bootstrap run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct HopsflowConfig {
    /// Platform discovery.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Platform connection.
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Service user.
    #[serde(default)]
    pub user: ServiceCredentials,
    /// Requested key and its file.
    #[serde(default)]
    pub api_key: ApiKeyConfig,
}

impl HopsflowConfig {
    /// Parse a JSON attributes file. Does not apply overrides or validate.
    pub fn from_file(path: &Path) -> Result<Self, SdkError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| SdkError::Config(format!("invalid configuration {}: {e}", path.display())))
    }

    /// Load `path`, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, SdkError> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    ///
    /// | Variable                 | Overrides                           |
    /// |--------------------------|-------------------------------------|
    /// | `HOPSFLOW_USER_EMAIL`    | `user.email`                        |
    /// | `HOPSFLOW_USER_PASSWORD` | `user.password`                     |
    /// | `HOPSFLOW_CONSUL_URL`    | `registry.agent_url` (consul only)  |
    /// | `HOPSFLOW_API_KEY_FILE`  | `api_key.file`                      |
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(email) = lookup("HOPSFLOW_USER_EMAIL") {
            debug!("user.email overridden from environment");
            self.user.email = email;
        }
        if let Some(password) = lookup("HOPSFLOW_USER_PASSWORD") {
            debug!("user.password overridden from environment");
            self.user.set_password(password);
        }
        if let Some(url) = lookup("HOPSFLOW_CONSUL_URL") {
            if let RegistryConfig::Consul { agent_url, .. } = &mut self.registry {
                debug!(%url, "registry.agent_url overridden from environment");
                *agent_url = url;
            }
        }
        if let Some(file) = lookup("HOPSFLOW_API_KEY_FILE") {
            debug!(%file, "api_key.file overridden from environment");
            self.api_key.file = PathBuf::from(file);
        }
    }

    /// Reject configurations that cannot produce a key.
    pub fn validate(&self) -> Result<(), SdkError> {
        self.user
            .validate()
            .map_err(|e| SdkError::Config(format!("user: {e}")))?;
        validate_prefix(&self.api_key.prefix)
            .map_err(|e| SdkError::Config(format!("api_key.prefix: {e}")))?;
        if self.api_key.file.as_os_str().is_empty() {
            return Err(SdkError::Config("api_key.file is not set".into()));
        }
        if self.platform.read_timeout_secs == 0 {
            return Err(SdkError::Config(
                "platform.read_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Bootstrapper wired to the configured registry, user and key settings.
    pub fn bootstrapper(&self) -> Result<CredentialBootstrapper<ConfiguredRegistry>, SdkError> {
        Ok(CredentialBootstrapper::new(
            self.registry.build()?,
            self.user.clone(),
            self.platform.options(),
        )
        .with_query(self.registry.query())
        .with_scope(self.api_key.scope)
        .with_key_prefix(&self.api_key.prefix))
    }

    /// Locate the platform through the configured registry.
    pub async fn resolve_platform(&self) -> Result<ServiceEndpoint, SdkError> {
        let query = self.registry.query();
        self.registry
            .build()?
            .resolve(&query)
            .await?
            .into_endpoint(&query)
    }

    /// Jobs client for the resolved platform using the stored key.
    pub async fn jobs_client(&self) -> Result<JobsClient, SdkError> {
        let endpoint = self.resolve_platform().await?;
        JobsClient::from_key_file(&endpoint, &self.platform.options(), &self.api_key.file)
    }
}

fn default_consul_url() -> String {
    DEFAULT_CONSUL_URL.to_string()
}

fn default_consul_domain() -> String {
    DEFAULT_CONSUL_DOMAIN.to_string()
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT.as_secs()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const MINIMAL: &str = r#"{
        "user": { "email": "airflow@hopsworks.ai", "password": "pw" },
        "api_key": { "file": "/srv/hops/airflow/secrets/api_key" }
    }"#;

    fn parse(json: &str) -> HopsflowConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = parse(MINIMAL);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.registry, RegistryConfig::default());
        assert_eq!(cfg.platform.read_timeout_secs, 120);
        assert_eq!(cfg.platform.scheme, PlatformScheme::Https);
        assert_eq!(cfg.platform.trust, PlatformTrust::NetworkPlacement);
        assert_eq!(cfg.api_key.prefix, "airflow");
        assert_eq!(cfg.api_key.scope, ApiKeyScope::Job);
        assert_eq!(cfg.api_key.mode, FileMode::OWNER_RW);
    }

    #[test]
    fn static_registry_section() {
        let cfg = parse(
            r#"{"registry": {"kind": "static", "host": "10.0.0.4", "port": 8181}}"#,
        );
        assert_eq!(
            cfg.registry,
            RegistryConfig::Static {
                host: "10.0.0.4".into(),
                port: 8181
            }
        );
        assert_eq!(cfg.registry.query(), RegistryQuery::platform());
    }

    #[test]
    fn full_api_key_section() {
        let cfg = parse(
            r#"{"api_key": {
                "prefix": "dags", "scope": "DATASET_VIEW", "file": "/tmp/k",
                "mode": "0640", "owner": "airflow", "group": "hadoop"
            }}"#,
        );
        let spec = cfg.api_key.key_file();
        assert_eq!(cfg.api_key.scope, ApiKeyScope::DatasetView);
        assert_eq!(spec.mode.bits(), 0o640);
        assert_eq!(spec.owner.as_deref(), Some("airflow"));
        assert_eq!(spec.group.as_deref(), Some("hadoop"));
    }

    #[test]
    fn scope_label_is_case_insensitive() {
        let cfg = parse(r#"{"api_key": {"scope": "featurestore"}}"#);
        assert_eq!(cfg.api_key.scope, ApiKeyScope::Featurestore);

        let res: Result<HopsflowConfig, _> = serde_json::from_str(r#"{"api_key": {"scope": "root"}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn overrides_replace_values() {
        let env: HashMap<&str, &str> = [
            ("HOPSFLOW_USER_EMAIL", "other@hopsworks.ai"),
            ("HOPSFLOW_USER_PASSWORD", "from-env"),
            ("HOPSFLOW_CONSUL_URL", "http://consul:8500"),
            ("HOPSFLOW_API_KEY_FILE", "/run/api_key"),
        ]
        .into_iter()
        .collect();

        let mut cfg = parse(MINIMAL);
        cfg.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(cfg.user.email, "other@hopsworks.ai");
        assert_eq!(cfg.user.password(), "from-env");
        assert_eq!(cfg.api_key.file, PathBuf::from("/run/api_key"));
        match cfg.registry {
            RegistryConfig::Consul { agent_url, .. } => assert_eq!(agent_url, "http://consul:8500"),
            RegistryConfig::Static { .. } => panic!("expected consul"),
        }
    }

    #[test]
    fn password_can_come_only_from_overrides() {
        let mut cfg = parse(r#"{"user": {"email": "a@b"}, "api_key": {"file": "/k"}}"#);
        assert!(cfg.validate().is_err());
        cfg.apply_overrides(|name| (name == "HOPSFLOW_USER_PASSWORD").then(|| "pw".to_string()));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_failures() {
        let mut cfg = parse(MINIMAL);
        cfg.api_key.prefix = "has space".into();
        assert!(matches!(cfg.validate(), Err(SdkError::Config(_))));

        let mut cfg = parse(MINIMAL);
        cfg.platform.read_timeout_secs = 0;
        assert!(matches!(cfg.validate(), Err(SdkError::Config(_))));

        let mut cfg = parse(MINIMAL);
        cfg.api_key.file = PathBuf::new();
        assert!(matches!(cfg.validate(), Err(SdkError::Config(_))));
    }

    #[test]
    fn serialized_config_hides_password() {
        let json = serde_json::to_string(&parse(MINIMAL)).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("\"pw\""));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = HopsflowConfig::load(Path::new("/nonexistent/hopsflow.json")).unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hopsflow.json");
        fs::write(&path, MINIMAL).unwrap();
        let cfg = HopsflowConfig::from_file(&path).unwrap();
        assert_eq!(cfg.user.email, "airflow@hopsworks.ai");
    }
}
