//! SDK error types.
//!
//! [`SdkError`] is the single error type returned by every fallible
//! operation in the SDK. The first four variants are the bootstrap flow's
//! terminal failures; none of them is ever retried.

use hopsflow_models::ModelError;
use reqwest::StatusCode;

/// Error type for all SDK operations.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// The registry did not yield a host and a port for the platform.
    #[error("could not resolve platform endpoint: {0}")]
    ConfigurationUnresolved(String),

    /// The login request returned a non-success status.
    #[error("platform login failed with status {status}: {body}")]
    AuthenticationFailed {
        /// HTTP status of the login response.
        status: StatusCode,
        /// Response body, for diagnosis.
        body: String,
    },

    /// The API key request returned a non-success status.
    #[error("API key creation failed for {uri} with status {status}: {body}")]
    KeyIssuanceFailed {
        /// Full request URI, including the query.
        uri: String,
        /// HTTP status of the key response.
        status: StatusCode,
        /// Response body, for diagnosis.
        body: String,
    },

    /// A response body was not the JSON shape the platform documents.
    #[error("malformed platform response: {0}")]
    ResponseMalformed(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A jobs API call kept failing after all attempts.
    #[error("platform API call to {url} failed with status {status}: {body}")]
    Api {
        /// Request URL.
        url: String,
        /// Last HTTP status seen.
        status: StatusCode,
        /// Last response body.
        body: String,
    },

    /// A job execution ended in a failed state.
    #[error("job {job} failed with application state {state} and final status {final_status}")]
    JobFailed {
        /// Job name.
        job: String,
        /// Application state.
        state: String,
        /// Application master final status.
        final_status: String,
    },

    /// A job execution did not reach a final state in time.
    #[error("timed out waiting for job {job} to finish")]
    WaitTimeout {
        /// Job name.
        job: String,
    },

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization / deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A model value failed validation.
    #[error(transparent)]
    Model(#[from] ModelError),
}
