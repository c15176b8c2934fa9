//! The credential bootstrap flow.
//!
//! Resolve the platform, log in, mint a scoped API key, write it to disk.
//! Every step runs to completion before the next starts and every failure
//! is final: there are no retries and nothing is written unless a key was
//! actually issued.

use hopsflow_models::{ApiKey, ApiKeyName, ApiKeyScope, RegistryQuery, ServiceCredentials, DEFAULT_KEY_PREFIX};
use tracing::info;

use crate::error::SdkError;
use crate::key_file::{write_key_file, KeyFileSpec};
use crate::platform::{PlatformClient, PlatformOptions};
use crate::registry::ServiceRegistry;

/// Mints an API key for the orchestrator's service user.
///
/// # Typical usage
///
/// ```rust,no_run
/// use hopsflow_models::{ApiKeyScope, ServiceCredentials};
/// use hopsflow_sdk::{ConsulRegistry, CredentialBootstrapper, KeyFileSpec, PlatformOptions};
///
/// # async fn run() -> Result<(), hopsflow_sdk::SdkError> {
/// let registry = ConsulRegistry::new("http://127.0.0.1:8500")?;
/// let creds = ServiceCredentials::new("airflow@hopsworks.ai", "secret")?;
/// let bootstrapper = CredentialBootstrapper::new(registry, creds, PlatformOptions::default());
///
/// bootstrapper
///     .run(&KeyFileSpec::new("/srv/hops/airflow/secrets/api_key"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CredentialBootstrapper<R> {
    registry: R,
    query: RegistryQuery,
    credentials: ServiceCredentials,
    scope: ApiKeyScope,
    key_prefix: String,
    options: PlatformOptions,
}

impl<R: ServiceRegistry> CredentialBootstrapper<R> {
    /// Bootstrapper using the default platform lookup, `JOB` scope and the
    /// `airflow` key prefix.
    pub fn new(registry: R, credentials: ServiceCredentials, options: PlatformOptions) -> Self {
        Self {
            registry,
            query: RegistryQuery::platform(),
            credentials,
            scope: ApiKeyScope::Job,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            options,
        }
    }

    /// Look the platform up with a different query.
    #[must_use]
    pub fn with_query(mut self, query: RegistryQuery) -> Self {
        self.query = query;
        self
    }

    /// Request a different scope.
    #[must_use]
    pub fn with_scope(mut self, scope: ApiKeyScope) -> Self {
        self.scope = scope;
        self
    }

    /// Use a different key name prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    /// Run the exchange and return the key without touching the filesystem.
    ///
    /// The key name gets a fresh random suffix on every call.
    pub async fn mint_api_key(&self) -> Result<ApiKey, SdkError> {
        let name = ApiKeyName::generate(&self.key_prefix)?;
        self.mint_api_key_named(&name).await
    }

    /// Run the exchange with a caller-chosen key name.
    pub async fn mint_api_key_named(&self, name: &ApiKeyName) -> Result<ApiKey, SdkError> {
        let endpoint = self
            .registry
            .resolve(&self.query)
            .await?
            .into_endpoint(&self.query)?;
        info!(%endpoint, "platform endpoint resolved");

        let client = PlatformClient::new(endpoint, &self.options)?;
        let session = client.login(&self.credentials).await?;
        client.create_api_key(&session, name, self.scope).await
    }

    /// Mint a key and write it to `key_file`.
    ///
    /// The file is only created once a key has been issued; on any error it
    /// is left exactly as it was.
    pub async fn run(&self, key_file: &KeyFileSpec) -> Result<ApiKey, SdkError> {
        let key = self.mint_api_key().await?;
        write_key_file(key_file, &key)?;
        Ok(key)
    }
}
