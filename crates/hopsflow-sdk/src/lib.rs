//! # hopsflow SDK
//!
//! Issues the workflow orchestrator's credential for the Hopsworks platform
//! and uses it to drive platform jobs.
//!
//! The SDK provides:
//!
//! * [`CredentialBootstrapper`]: registry lookup, service login, API key
//!   issuance and the atomic key file write, in that order.
//! * [`ConsulRegistry`] / [`StaticRegistry`]: where the platform lives.
//! * [`PlatformClient`] and [`Session`]: the two authentication calls and
//!   the cookies/token carried between them.
//! * [`CookieStore`]: the session cookie jar.
//! * [`JobsClient`]: launches and monitors jobs with the issued key.
//! * [`HopsflowConfig`]: the JSON configuration file and its overrides.
//! * [`SdkError`]: unified error type for all SDK operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use hopsflow_sdk::HopsflowConfig;
//!
//! # async fn run() -> Result<(), hopsflow_sdk::SdkError> {
//! let config = HopsflowConfig::load(Path::new("/srv/hops/airflow/hopsflow.json"))?;
//! config.bootstrapper()?.run(&config.api_key.key_file()).await?;
//!
//! let jobs = config.jobs_client().await?;
//! let project = jobs.project_by_name("demo").await?;
//! let execution = jobs.launch_job(project.project_id, "etl", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod cookies;
pub mod error;
pub mod jobs;
pub mod key_file;
pub mod platform;
pub mod registry;

pub use bootstrap::CredentialBootstrapper;
pub use config::{ApiKeyConfig, ConfiguredRegistry, HopsflowConfig, PlatformConfig, RegistryConfig};
pub use cookies::{Cookie, CookieStore};
pub use error::SdkError;
pub use jobs::{CompletionMode, JobsClient, WaitOptions};
pub use key_file::{read_key_file, write_key_file, KeyFileSpec};
pub use platform::{PlatformClient, PlatformOptions, PlatformTrust, Session};
pub use registry::{ConsulRegistry, ResolvedService, ServiceRegistry, StaticRegistry};
