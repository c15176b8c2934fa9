//! Job execution types.
//!
//! The platform reports two strings per execution: the application `state`
//! and the application master's `finalStatus`. A job can finish with a
//! `FINISHED` state and still have failed, which is why both are needed to
//! decide the outcome.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Application states that mean the job completed successfully.
pub const SUCCESS_APP_STATES: &[&str] = &["FINISHED"];

/// Application states that mean the job failed.
pub const FAILED_APP_STATES: &[&str] = &[
    "FAILED",
    "KILLED",
    "FRAMEWORK_FAILURE",
    "APP_MASTER_START_FAILED",
    "INITIALIZATION_FAILED",
];

/// Application master statuses that mean the job failed.
pub const FAILED_AM_STATUSES: &[&str] = &["FAILED", "KILLED"];

/// Numeric project identifier.
pub type ProjectId = i64;

/// Numeric execution identifier.
pub type ExecutionId = i64;

/// A project as returned by the project info endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    /// Project id.
    pub project_id: ProjectId,
    /// Project name.
    pub project_name: String,
}

/// State of a single job execution.
///
/// ```
/// use hopsflow_models::ExecutionState;
///
/// let st = ExecutionState::new("FINISHED", "KILLED");
/// assert!(st.is_final());
/// assert!(st.has_failed());
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    /// Application state (e.g. `RUNNING`, `FINISHED`).
    pub state: String,
    /// Application master final status (e.g. `UNDEFINED`, `SUCCEEDED`).
    pub final_status: String,
}

impl ExecutionState {
    /// Build a state from its two labels.
    pub fn new(state: &str, final_status: &str) -> Self {
        Self {
            state: state.to_string(),
            final_status: final_status.to_string(),
        }
    }

    /// The application state ended successfully.
    pub fn has_succeeded(&self) -> bool {
        contains(SUCCESS_APP_STATES, &self.state) && !self.am_failed()
    }

    /// The application state is failed, or it is successful but the
    /// application master reported a failure.
    pub fn has_failed(&self) -> bool {
        contains(FAILED_APP_STATES, &self.state)
            || (contains(SUCCESS_APP_STATES, &self.state) && self.am_failed())
    }

    /// No further transitions are expected.
    pub fn is_final(&self) -> bool {
        self.is_in(SUCCESS_APP_STATES) || self.is_in(FAILED_APP_STATES)
    }

    /// The application state is one of `states` (case-insensitive).
    ///
    /// ```
    /// use hopsflow_models::ExecutionState;
    ///
    /// let st = ExecutionState::new("killed", "UNDEFINED");
    /// assert!(st.is_in(&["FINISHED", "KILLED"]));
    /// assert!(!st.is_in(&[String::from("RUNNING")]));
    /// ```
    pub fn is_in<S: AsRef<str>>(&self, states: &[S]) -> bool {
        states.iter().any(|s| s.as_ref().eq_ignore_ascii_case(&self.state))
    }

    fn am_failed(&self) -> bool {
        contains(FAILED_AM_STATUSES, &self.final_status)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.state, self.final_status)
    }
}

fn contains(set: &[&str], value: &str) -> bool {
    set.iter().any(|s| s.eq_ignore_ascii_case(value))
}
