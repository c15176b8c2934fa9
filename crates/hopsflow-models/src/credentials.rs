//! Service user credentials.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::ModelError;

/// Placeholder written instead of secret values.
pub const REDACTED: &str = "[REDACTED]";

/// Email/password pair of the service user that mints the API key.
///
/// The password never leaves this struct through `Debug` or `Serialize`;
/// both print [`REDACTED`]. Use [`password`](Self::password) to read it.
///
/// ```
/// use hopsflow_models::ServiceCredentials;
///
/// let creds = ServiceCredentials::new("airflow@hopsworks.ai", "s3cret").unwrap();
/// assert!(!format!("{creds:?}").contains("s3cret"));
/// assert_eq!(creds.password(), "s3cret");
/// ```
///
/// Both fields default to empty when deserialized so that a configuration
/// file may leave them to environment overrides; [`validate`](Self::validate)
/// catches whatever is still missing.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredentials {
    /// Login email of the service user.
    #[serde(default)]
    pub email: String,
    #[serde(default, serialize_with = "serialize_redacted")]
    password: String,
}

impl ServiceCredentials {
    /// Build credentials, rejecting empty fields.
    pub fn new(email: &str, password: &str) -> Result<Self, ModelError> {
        let creds = Self {
            email: email.to_string(),
            password: password.to_string(),
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Check that neither field is empty.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.email.trim().is_empty() {
            return Err(ModelError::MissingField {
                field: "email".into(),
            });
        }
        if self.password.is_empty() {
            return Err(ModelError::MissingField {
                field: "password".into(),
            });
        }
        Ok(())
    }

    /// The plaintext password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Replace the password, e.g. from an environment override.
    pub fn set_password(&mut self, password: String) {
        self.password = password;
    }
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("email", &self.email)
            .field("password", &REDACTED)
            .finish()
    }
}

fn serialize_redacted<S: Serializer>(_: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(REDACTED)
}
