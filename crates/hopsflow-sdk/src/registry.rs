//! Service registry lookups.
//!
//! The platform's address is discovered through a registry rather than
//! configured directly. [`ConsulRegistry`] talks to the local Consul agent;
//! [`StaticRegistry`] returns fixed values and is used when an operator
//! pins the endpoint (and by tests).
//!
//! A lookup yields a [`ResolvedService`] whose halves may each be missing.
//! [`ResolvedService::into_endpoint`] turns that into a hard
//! [`SdkError::ConfigurationUnresolved`]: a missing host or port means the
//! platform is not running or is misregistered, so nobody retries it.

use std::future::Future;
use std::time::Duration;

use hopsflow_models::{RegistryQuery, ServiceEndpoint, ServiceName, ServiceTag};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::error::SdkError;

/// Address of the local Consul agent's HTTP API.
pub const DEFAULT_CONSUL_URL: &str = "http://127.0.0.1:8500";

/// DNS domain Consul serves services under.
pub const DEFAULT_CONSUL_DOMAIN: &str = "consul";

/// Partial result of a registry lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedService {
    /// Host name, if the registry knows one.
    pub host: Option<String>,
    /// Port, if a matching catalog entry exists.
    pub port: Option<u16>,
}

impl ResolvedService {
    /// Require both halves, or fail with [`SdkError::ConfigurationUnresolved`].
    pub fn into_endpoint(self, query: &RegistryQuery) -> Result<ServiceEndpoint, SdkError> {
        match (self.host, self.port) {
            (Some(host), Some(port)) if !host.is_empty() => Ok(ServiceEndpoint { host, port }),
            (host, port) => Err(SdkError::ConfigurationUnresolved(format!(
                "registry returned host={} port={} for {query}; \
                 verify the platform is running and registered with that service name and tags",
                host.as_deref().unwrap_or("<none>"),
                port.map_or_else(|| "<none>".to_string(), |p| p.to_string()),
            ))),
        }
    }
}

/// Something that can locate a service by name and tags.
pub trait ServiceRegistry {
    /// Look up `query`. Missing host/port is reported in the result, not as
    /// an error; errors are reserved for a registry that cannot be asked.
    fn resolve(
        &self,
        query: &RegistryQuery,
    ) -> impl Future<Output = Result<ResolvedService, SdkError>> + Send;
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// A registry that always answers with the same values.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    host: Option<String>,
    port: Option<u16>,
}

impl StaticRegistry {
    /// Answer every query with `host`/`port`.
    pub fn new(host: Option<String>, port: Option<u16>) -> Self {
        Self { host, port }
    }

    /// Answer every query with a fully known endpoint.
    pub fn endpoint(endpoint: &ServiceEndpoint) -> Self {
        Self::new(Some(endpoint.host.clone()), Some(endpoint.port))
    }
}

impl ServiceRegistry for StaticRegistry {
    async fn resolve(&self, _query: &RegistryQuery) -> Result<ResolvedService, SdkError> {
        Ok(ResolvedService {
            host: self.host.clone(),
            port: self.port,
        })
    }
}

// ---------------------------------------------------------------------------
// Consul
// ---------------------------------------------------------------------------

/// One row of `GET /v1/catalog/service/{name}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogEntry {
    service_port: u16,
    // older agents send `null` for untagged services
    #[serde(default)]
    service_tags: Option<Vec<String>>,
}

impl CatalogEntry {
    fn has_tags(&self, tags: &[ServiceTag]) -> bool {
        let own = self.service_tags.as_deref().unwrap_or_default();
        tags.iter().all(|tag| own.iter().any(|t| t == tag.as_str()))
    }
}

/// Port of the first entry carrying every tag of `query`.
fn matching_port(entries: &[CatalogEntry], query: &RegistryQuery) -> Option<u16> {
    entries
        .iter()
        .find(|entry| entry.has_tags(&query.tags))
        .map(|entry| entry.service_port)
}

/// Registry backed by a Consul agent.
///
/// The host is the service's Consul DNS name
/// (`{fqdn_service}.service.{domain}`); the port is read from the agent's
/// catalog.
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    http: reqwest::Client,
    agent_url: String,
    domain: String,
}

impl ConsulRegistry {
    /// Registry talking to the agent at `agent_url`.
    pub fn new(agent_url: &str) -> Result<Self, SdkError> {
        Url::parse(agent_url)
            .map_err(|e| SdkError::Config(format!("invalid Consul URL {agent_url:?}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            agent_url: agent_url.trim_end_matches('/').to_string(),
            domain: DEFAULT_CONSUL_DOMAIN.to_string(),
        })
    }

    /// Use a DNS domain other than `consul`.
    #[must_use]
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.trim_matches('.').to_string();
        self
    }

    /// Consul DNS name of `service`.
    ///
    /// ```
    /// use hopsflow_models::ServiceName;
    /// use hopsflow_sdk::ConsulRegistry;
    ///
    /// let consul = ConsulRegistry::new("http://127.0.0.1:8500").unwrap();
    /// assert_eq!(
    ///     consul.service_fqdn(&ServiceName::new("hopsworks.glassfish")),
    ///     "hopsworks.glassfish.service.consul",
    /// );
    /// ```
    pub fn service_fqdn(&self, service: &ServiceName) -> String {
        format!("{service}.service.{}", self.domain)
    }

    fn catalog_url(&self, query: &RegistryQuery) -> Result<Url, SdkError> {
        let mut url = Url::parse(&format!(
            "{}/v1/catalog/service/{}",
            self.agent_url, query.service
        ))
        .map_err(|e| SdkError::Config(format!("invalid catalog URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for tag in &query.tags {
                pairs.append_pair("tag", tag.as_str());
            }
        }
        Ok(url)
    }

    async fn catalog_port(&self, query: &RegistryQuery) -> Result<Option<u16>, SdkError> {
        let url = self.catalog_url(query)?;
        debug!(%url, "querying Consul catalog");

        let res = self.http.get(url.clone()).send().await.map_err(|e| {
            SdkError::ConfigurationUnresolved(format!("Consul agent unreachable at {url}: {e}"))
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(SdkError::ConfigurationUnresolved(format!(
                "Consul catalog lookup {url} returned {status}: {text}"
            )));
        }

        let entries: Vec<CatalogEntry> = res.json().await.map_err(|e| {
            SdkError::ConfigurationUnresolved(format!("unreadable Consul catalog response: {e}"))
        })?;

        // the agent already filters by tag; re-check in case it is too old to
        // honour repeated `tag` parameters
        Ok(matching_port(&entries, query))
    }
}

impl ServiceRegistry for ConsulRegistry {
    async fn resolve(&self, query: &RegistryQuery) -> Result<ResolvedService, SdkError> {
        let host = Some(self.service_fqdn(&query.fqdn_service));
        let port = self.catalog_port(query).await?;
        debug!(?host, ?port, %query, "Consul lookup finished");
        Ok(ResolvedService { host, port })
    }
}
