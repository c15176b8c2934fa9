//! Jobs API client authenticated with an issued key.
//!
//! This is how the orchestrator uses the key file written by the bootstrap
//! flow: every request carries `Authorization: ApiKey <key>`. Unlike the
//! bootstrap calls, jobs calls are retried a few times, because a DAG task
//! polling a long-running job should survive a platform restart. TLS
//! failures are the exception and surface on the first attempt.
//!
//! Two ways to wait are offered: [`JobsClient::wait_for_execution`] follows
//! one execution the caller launched, and
//! [`JobsClient::wait_for_last_execution`] follows whatever execution of a
//! job was submitted last, for DAGs that only observe a job.

use std::error::Error as _;
use std::io;
use std::path::Path;
use std::time::Duration;

use hopsflow_models::{ApiKey, ExecutionId, ExecutionState, ProjectId, ProjectInfo, ServiceEndpoint};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::SdkError;
use crate::key_file::read_key_file;
use crate::platform::{build_http_client, endpoint_url, PlatformOptions};

/// Total attempts per call, first try included.
pub const MAX_ATTEMPTS: u32 = 4;

/// Pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shortest pause between polls.
const MIN_POKE_INTERVAL: Duration = Duration::from_secs(1);

/// How the wait operations poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    /// Pause before the first poll of [`JobsClient::wait_for_execution`],
    /// giving the platform time to register the execution.
    pub initial_delay: Duration,
    /// Pause between polls. Zero is raised to one second.
    pub poke_interval: Duration,
    /// Give up after roughly this long; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Return failed executions instead of raising [`SdkError::JobFailed`].
    pub ignore_failure: bool,
    /// Application states that end the wait, compared case-insensitively.
    /// `None` means any final state.
    pub wait_for_states: Option<Vec<String>>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            poke_interval: Duration::from_secs(1),
            timeout: None,
            ignore_failure: false,
            wait_for_states: None,
        }
    }
}

impl WaitOptions {
    /// `state` ends the wait.
    pub fn is_reached(&self, state: &ExecutionState) -> bool {
        match &self.wait_for_states {
            Some(states) => state.is_in(states.as_slice()),
            None => state.is_final(),
        }
    }
}

/// What [`JobsClient::wait_for_last_execution`] waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Any state accepted by [`WaitOptions::is_reached`]; failures are
    /// returned, not raised.
    #[default]
    Finished,
    /// A successful finish. A failed execution ends the wait with
    /// [`SdkError::JobFailed`]; `ignore_failure` and `wait_for_states` are
    /// not consulted.
    Succeeded,
}

/// Which execution a wait polls.
#[derive(Debug, Clone, Copy)]
enum Target {
    Execution(ExecutionId),
    Last,
}

/// Client for the project and jobs endpoints.
#[derive(Debug, Clone)]
pub struct JobsClient {
    http: reqwest::Client,
    origin: Url,
    api_key: ApiKey,
    retry_delay: Duration,
}

impl JobsClient {
    /// Client for `endpoint` authenticating with `api_key`.
    pub fn new(
        endpoint: &ServiceEndpoint,
        options: &PlatformOptions,
        api_key: ApiKey,
    ) -> Result<Self, SdkError> {
        Ok(Self {
            http: build_http_client(options)?,
            origin: endpoint_url(endpoint, options.scheme, "/")?,
            api_key,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Client whose key is read from a key file.
    pub fn from_key_file(
        endpoint: &ServiceEndpoint,
        options: &PlatformOptions,
        path: &Path,
    ) -> Result<Self, SdkError> {
        Self::new(endpoint, options, read_key_file(path)?)
    }

    /// Override the pause between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Look a project up by name.
    pub async fn project_by_name(&self, name: &str) -> Result<ProjectInfo, SdkError> {
        let url = self.url(&["project", "getProjectInfo", name], &[])?;
        self.get_as(url).await
    }

    /// Look a project up by id.
    pub async fn project_by_id(&self, id: ProjectId) -> Result<ProjectInfo, SdkError> {
        let url = self.url(&["project", &id.to_string()], &[])?;
        self.get_as(url).await
    }

    // ------------------------------------------------------------------
    // Executions
    // ------------------------------------------------------------------

    /// Start `job` and return the new execution's id.
    ///
    /// Does not wait; see [`wait_for_execution`](Self::wait_for_execution).
    pub async fn launch_job(
        &self,
        project: ProjectId,
        job: &str,
        args: Option<&str>,
    ) -> Result<ExecutionId, SdkError> {
        let url = self.executions_url(project, job, &[])?;
        debug!(%url, "launching job");
        let body = self.call(Method::POST, url, args).await?;
        let id = body
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| SdkError::ResponseMalformed("missing `id` in execution response".into()))?;
        info!(project, job, execution = id, "job launched");
        Ok(id)
    }

    /// Current state of one execution.
    pub async fn execution_state(
        &self,
        project: ProjectId,
        job: &str,
        execution: ExecutionId,
    ) -> Result<ExecutionState, SdkError> {
        let url = self.url(
            &["project", &project.to_string(), "jobs", job, "executions", &execution.to_string()],
            &[],
        )?;
        self.get_as(url).await
    }

    /// State of the most recently submitted execution of `job`.
    pub async fn last_execution_state(
        &self,
        project: ProjectId,
        job: &str,
    ) -> Result<ExecutionState, SdkError> {
        let url = self.executions_url(
            project,
            job,
            &[("sort_by", "submissiontime:desc"), ("limit", "1")],
        )?;
        let body = self.call(Method::GET, url, None).await?;
        let item = body
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .cloned()
            .ok_or_else(|| SdkError::ResponseMalformed(format!("job {job} has no executions")))?;
        decode(item)
    }

    /// Poll an execution until it reaches a state accepted by
    /// [`WaitOptions::is_reached`].
    ///
    /// Sleeps `initial_delay`, then a poke interval before every poll.
    /// Unless `options.ignore_failure` is set, a failed execution is reported
    /// as [`SdkError::JobFailed`], even when it is in `wait_for_states`.
    pub async fn wait_for_execution(
        &self,
        project: ProjectId,
        job: &str,
        execution: ExecutionId,
        options: &WaitOptions,
    ) -> Result<ExecutionState, SdkError> {
        tokio::time::sleep(options.initial_delay).await;
        self.poll_until(project, job, Target::Execution(execution), options, true, |state| {
            if !options.ignore_failure && state.has_failed() {
                return Err(job_failed(job, state));
            }
            Ok(options.is_reached(state))
        })
        .await
    }

    /// Poll the most recently submitted execution of `job` until `mode` is
    /// satisfied.
    ///
    /// The first poll is immediate; `initial_delay` is not used. A job with
    /// no executions fails with [`SdkError::ResponseMalformed`].
    pub async fn wait_for_last_execution(
        &self,
        project: ProjectId,
        job: &str,
        mode: CompletionMode,
        options: &WaitOptions,
    ) -> Result<ExecutionState, SdkError> {
        self.poll_until(project, job, Target::Last, options, false, |state| match mode {
            CompletionMode::Finished => Ok(options.is_reached(state)),
            CompletionMode::Succeeded if state.has_failed() => Err(job_failed(job, state)),
            CompletionMode::Succeeded => Ok(state.has_succeeded()),
        })
        .await
    }

    /// Poll `target` until `done` accepts a state or the timeout runs out.
    ///
    /// The remaining timeout shrinks by one poke interval after every poll
    /// that did not end the wait.
    async fn poll_until(
        &self,
        project: ProjectId,
        job: &str,
        target: Target,
        options: &WaitOptions,
        sleep_first: bool,
        done: impl Fn(&ExecutionState) -> Result<bool, SdkError>,
    ) -> Result<ExecutionState, SdkError> {
        let poke = options.poke_interval.max(MIN_POKE_INTERVAL);
        let mut remaining = options.timeout;
        let mut first = true;

        loop {
            if sleep_first || !first {
                tokio::time::sleep(poke).await;
            }
            first = false;

            let state = match target {
                Target::Execution(id) => self.execution_state(project, job, id).await?,
                Target::Last => self.last_execution_state(project, job).await?,
            };
            if done(&state)? {
                info!(job, ?target, %state, "job finished");
                return Ok(state);
            }
            debug!(job, ?target, %state, "job has not finished yet");

            if let Some(left) = remaining {
                remaining = Some(left.checked_sub(poke).ok_or_else(|| SdkError::WaitTimeout {
                    job: job.to_string(),
                })?);
            }
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn executions_url(
        &self,
        project: ProjectId,
        job: &str,
        query: &[(&str, &str)],
    ) -> Result<Url, SdkError> {
        self.url(&["project", &project.to_string(), "jobs", job, "executions"], query)
    }

    /// `/hopsworks-api/api/<segments...>?<query>`, each segment escaped.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, SdkError> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|()| SdkError::Config(format!("{} cannot be a base URL", self.origin)))?
            .clear()
            .extend(["hopsworks-api", "api"])
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_as<T: DeserializeOwned>(&self, url: Url) -> Result<T, SdkError> {
        decode(self.call(Method::GET, url, None).await?)
    }

    async fn call(&self, method: Method, url: Url, body: Option<&str>) -> Result<Value, SdkError> {
        let mut attempt = 1;
        loop {
            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, self.api_key.authorization_header());
            if let Some(body) = body {
                req = req.header(CONTENT_TYPE, "text/plain").body(body.to_string());
            }

            let err = match req.send().await {
                Ok(res) if res.status().is_success() => {
                    let text = res.text().await?;
                    return Ok(parse_body(&text));
                }
                Ok(res) => {
                    let status = res.status();
                    let body = res.text().await.unwrap_or_default();
                    SdkError::Api {
                        url: url.to_string(),
                        status,
                        body,
                    }
                }
                Err(e) if is_tls_failure(&e) => return Err(SdkError::Http(e)),
                Err(e) => SdkError::Http(e),
            };

            if attempt >= MAX_ATTEMPTS {
                return Err(err);
            }
            warn!(attempt, %method, %url, error = %err, "platform API call failed, retrying");
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

/// A success body that is empty or not JSON (e.g. `201 Created` without
/// content) decodes to `null`. Callers needing a field then report it missing.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!(error = %e, "response body is not JSON");
        Value::Null
    })
}

/// Handshake and certificate errors reach us as `InvalidData` (or, for a
/// peer that hangs up mid-handshake, `UnexpectedEof`) I/O errors somewhere
/// in the source chain.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            if matches!(io.kind(), io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn job_failed(job: &str, state: &ExecutionState) -> SdkError {
    SdkError::JobFailed {
        job: job.to_string(),
        state: state.state.clone(),
        final_status: state.final_status.clone(),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, SdkError> {
    serde_json::from_value(value).map_err(|e| SdkError::ResponseMalformed(e.to_string()))
}
