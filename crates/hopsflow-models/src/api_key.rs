//! API key request and result types.
//!
//! A key request carries a generated [`ApiKeyName`] and an [`ApiKeyScope`].
//! The platform answers with an opaque [`ApiKey`] string.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::credentials::REDACTED;
use crate::error::ModelError;

/// Prefix used for generated key names unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "airflow";

/// Number of random bytes in a key name suffix (24 hex characters).
pub const SUFFIX_BYTES: usize = 12;

// ---------------------------------------------------------------------------
// ApiKeyName
// ---------------------------------------------------------------------------

/// Name under which a key is registered: `<prefix>_<24 lowercase hex>`.
///
/// The random suffix keeps repeated runs from colliding with keys minted
/// earlier under the same prefix.
///
/// # Examples
///
/// ```
/// use hopsflow_models::ApiKeyName;
///
/// let name = ApiKeyName::generate("airflow").unwrap();
/// assert!(name.to_string().starts_with("airflow_"));
/// assert_eq!(name.suffix().len(), 24);
///
/// let parsed: ApiKeyName = name.to_string().parse().unwrap();
/// assert_eq!(parsed, name);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct ApiKeyName {
    prefix: String,
    suffix: String,
}

impl ApiKeyName {
    /// Generate a name with a suffix drawn from the thread-local RNG.
    pub fn generate(prefix: &str) -> Result<Self, ModelError> {
        Self::generate_with(prefix, &mut rand::thread_rng())
    }

    /// Generate a name with a suffix drawn from `rng`.
    pub fn generate_with<R: RngCore + ?Sized>(
        prefix: &str,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        validate_prefix(prefix)?;
        let mut bytes = [0u8; SUFFIX_BYTES];
        rng.fill_bytes(&mut bytes);
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: hex::encode(bytes),
        })
    }

    /// The configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The random hex suffix.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

impl fmt::Display for ApiKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.prefix, self.suffix)
    }
}

impl FromStr for ApiKeyName {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ModelError::InvalidKeyName {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, suffix) = s
            .rsplit_once('_')
            .ok_or_else(|| invalid("expected <prefix>_<suffix>"))?;
        validate_prefix(prefix)?;

        let is_lower_hex = suffix
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if suffix.len() != SUFFIX_BYTES * 2 || !is_lower_hex {
            return Err(invalid("suffix must be 24 lowercase hex characters"));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }
}

impl TryFrom<String> for ApiKeyName {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ApiKeyName> for String {
    fn from(name: ApiKeyName) -> Self {
        name.to_string()
    }
}

/// Check that a key prefix is non-empty and uses only `[A-Za-z0-9_-]`.
pub fn validate_prefix(prefix: &str) -> Result<(), ModelError> {
    if prefix.is_empty() {
        return Err(ModelError::InvalidKeyPrefix {
            value: prefix.to_string(),
            reason: "must not be empty".into(),
        });
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ModelError::InvalidKeyPrefix {
            value: prefix.to_string(),
            reason: "only ASCII letters, digits, '-' and '_' are allowed".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ApiKeyScope
// ---------------------------------------------------------------------------

/// What an issued key may be used for.
///
/// Serialized in the platform's `SCREAMING_SNAKE_CASE` form; parsing
/// ignores case.
///
/// ```
/// use hopsflow_models::ApiKeyScope;
///
/// assert_eq!(ApiKeyScope::Job.to_string(), "JOB");
/// assert_eq!(ApiKeyScope::DatasetView.to_string(), "DATASET_VIEW");
/// ```
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(try_from = "String", into = "String")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ApiKeyScope {
    /// Launch and monitor jobs. The only scope the orchestrator needs.
    #[default]
    Job,
    /// Read datasets.
    DatasetView,
    /// Create datasets.
    DatasetCreate,
    /// Delete datasets.
    DatasetDelete,
    /// Model serving.
    Serving,
    /// Feature store access.
    Featurestore,
    /// Project management.
    Project,
    /// Kafka topics.
    Kafka,
    /// Platform administration.
    Admin,
}

impl ApiKeyScope {
    /// Parse a scope label, mapping failures to [`ModelError::UnknownScope`].
    pub fn from_label(label: &str) -> Result<Self, ModelError> {
        label.parse().map_err(|_| ModelError::UnknownScope {
            value: label.to_string(),
        })
    }
}

impl TryFrom<String> for ApiKeyScope {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_label(&s)
    }
}

impl From<ApiKeyScope> for String {
    fn from(scope: ApiKeyScope) -> Self {
        scope.to_string()
    }
}

// ---------------------------------------------------------------------------
// ApiKey
// ---------------------------------------------------------------------------

/// An issued API key.
///
/// Deliberately has no `Display`; `Debug` prints [`REDACTED`].
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key string returned by the platform.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The plaintext key.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("ApiKey {}", self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&REDACTED).finish()
    }
}
