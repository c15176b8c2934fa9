//! Service discovery types.
//!
//! The platform is never addressed by a hard-coded host. Its location is
//! looked up in a service registry with a [`RegistryQuery`]: one service
//! name provides the fully-qualified host name, a second (catalog) name plus
//! a tag set provides the port. The two halves are combined into a
//! [`ServiceEndpoint`].

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServiceName / ServiceTag
// ---------------------------------------------------------------------------

/// Logical name of a service in the registry (e.g. `"glassfish"`).
///
/// # Examples
///
/// ```
/// use hopsflow_models::ServiceName;
///
/// let name = ServiceName::new("hopsworks.glassfish");
/// assert_eq!(name.to_string(), "hopsworks.glassfish");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a new service name from a string slice.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Return the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl FromStr for ServiceName {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

/// A tag attached to a registered service instance (e.g. `"http"`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceTag(String);

impl ServiceTag {
    /// Create a new tag from a string slice.
    pub fn new(tag: &str) -> Self {
        Self(tag.to_string())
    }

    /// Return the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// RegistryQuery
// ---------------------------------------------------------------------------

/// What to ask the registry in order to locate the platform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryQuery {
    /// Service whose fully-qualified domain name becomes the endpoint host.
    pub fqdn_service: ServiceName,
    /// Catalog service whose registered port becomes the endpoint port.
    pub service: ServiceName,
    /// Tags every matching catalog entry must carry.
    pub tags: Vec<ServiceTag>,
}

impl RegistryQuery {
    /// The lookup used to find the platform's HTTP API.
    ///
    /// ```
    /// use hopsflow_models::RegistryQuery;
    ///
    /// let q = RegistryQuery::platform();
    /// assert_eq!(q.fqdn_service.as_str(), "hopsworks.glassfish");
    /// assert_eq!(q.service.as_str(), "glassfish");
    /// assert_eq!(q.tags.len(), 2);
    /// ```
    pub fn platform() -> Self {
        Self {
            fqdn_service: ServiceName::new("hopsworks.glassfish"),
            service: ServiceName::new("glassfish"),
            tags: vec![ServiceTag::new("http"), ServiceTag::new("hopsworks")],
        }
    }
}

impl Default for RegistryQuery {
    fn default() -> Self {
        Self::platform()
    }
}

impl fmt::Display for RegistryQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.tags.iter().map(ServiceTag::as_str).collect();
        write!(
            f,
            "{} / {} [{}]",
            self.fqdn_service,
            self.service,
            tags.join(", ")
        )
    }
}

// ---------------------------------------------------------------------------
// ServiceEndpoint
// ---------------------------------------------------------------------------

/// URL scheme used to talk to the platform.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlatformScheme {
    /// TLS; the only scheme used in deployments.
    #[default]
    Https,
    /// Plain HTTP, for local mocks.
    Http,
}

/// A fully resolved host and port of the platform.
///
/// # Examples
///
/// ```
/// use hopsflow_models::{PlatformScheme, ServiceEndpoint};
///
/// let ep = ServiceEndpoint::new("hopsworks.glassfish.service.consul", 8181);
/// assert_eq!(
///     ep.origin(PlatformScheme::Https),
///     "https://hopsworks.glassfish.service.consul:8181",
/// );
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServiceEndpoint {
    /// Create an endpoint from its parts.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }

    /// `scheme://host:port`, without a trailing slash.
    pub fn origin(&self, scheme: PlatformScheme) -> String {
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_query_display() {
        assert_eq!(
            RegistryQuery::platform().to_string(),
            "hopsworks.glassfish / glassfish [http, hopsworks]"
        );
    }

    #[test]
    fn scheme_round_trips_through_str() {
        assert_eq!(PlatformScheme::Https.to_string(), "https");
        assert_eq!("http".parse::<PlatformScheme>().unwrap(), PlatformScheme::Http);
        assert!("ftp".parse::<PlatformScheme>().is_err());
    }

    #[test]
    fn scheme_deserializes_lowercase() {
        let scheme: PlatformScheme = serde_json::from_str("\"http\"").unwrap();
        assert_eq!(scheme, PlatformScheme::Http);
    }

    #[test]
    fn endpoint_origin_for_ip() {
        let ep = ServiceEndpoint::new("127.0.0.1", 9000);
        assert_eq!(ep.origin(PlatformScheme::Http), "http://127.0.0.1:9000");
        assert_eq!(ep.to_string(), "127.0.0.1:9000");
    }
}
