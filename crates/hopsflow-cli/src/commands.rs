//! Subcommand implementations. Each returns the text to print on stdout.

use anyhow::Context;
use hopsflow_sdk::{CompletionMode, HopsflowConfig, WaitOptions};
use tracing::info;

/// Mint a key and write the key file.
pub async fn bootstrap(config: &HopsflowConfig) -> anyhow::Result<String> {
    let spec = config.api_key.key_file();
    config
        .bootstrapper()?
        .run(&spec)
        .await
        .context("API key bootstrap failed")?;
    Ok(format!("API key written to {}", spec.path.display()))
}

/// Launch `job` in `project`; wait for it when `wait` is given.
pub async fn launch_job(
    config: &HopsflowConfig,
    project: &str,
    job: &str,
    args: Option<&str>,
    wait: Option<&WaitOptions>,
) -> anyhow::Result<String> {
    let jobs = config.jobs_client().await?;
    let project = jobs
        .project_by_name(project)
        .await
        .with_context(|| format!("looking up project {project}"))?;
    let execution = jobs
        .launch_job(project.project_id, job, args)
        .await
        .with_context(|| format!("launching {job}"))?;

    let Some(wait) = wait else {
        return Ok(format!("{job}: execution {execution} launched"));
    };
    info!(job, execution, "waiting for job to finish");
    let state = jobs
        .wait_for_execution(project.project_id, job, execution, wait)
        .await?;
    Ok(format!("{job}: execution {execution} {state}"))
}

/// Report an execution's state, the latest one when `execution` is `None`.
///
/// With `wait`, poll until `mode` is satisfied first. For a given execution
/// [`CompletionMode::Succeeded`] turns failures into errors and
/// [`CompletionMode::Finished`] reports them.
pub async fn job_state(
    config: &HopsflowConfig,
    project: &str,
    job: &str,
    execution: Option<i64>,
    wait: Option<(&WaitOptions, CompletionMode)>,
) -> anyhow::Result<String> {
    let jobs = config.jobs_client().await?;
    let project = jobs
        .project_by_name(project)
        .await
        .with_context(|| format!("looking up project {project}"))?;
    let pid = project.project_id;

    let state = match (execution, wait) {
        (Some(id), None) => jobs.execution_state(pid, job, id).await?,
        (None, None) => jobs.last_execution_state(pid, job).await?,
        (Some(id), Some((options, mode))) => {
            info!(job, execution = id, "waiting for job to finish");
            let options = WaitOptions {
                ignore_failure: mode == CompletionMode::Finished,
                ..options.clone()
            };
            jobs.wait_for_execution(pid, job, id, &options).await?
        }
        (None, Some((options, mode))) => {
            info!(job, "waiting for latest execution to finish");
            jobs.wait_for_last_execution(pid, job, mode, options).await?
        }
    };
    Ok(format!("{job}: {state}"))
}

/// The configuration as pretty JSON; the password is serialized redacted.
pub fn show_config(config: &HopsflowConfig) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hopsflow_models::PlatformScheme;
    use hopsflow_sdk::{PlatformTrust, RegistryConfig};
    use mock_hopsworks::MockHopsworks;

    use super::*;

    async fn config_for(mock: MockHopsworks, dir: &std::path::Path) -> HopsflowConfig {
        let addr = mock.spawn().await.unwrap();
        let mut config: HopsflowConfig = serde_json::from_value(serde_json::json!({
            "user": { "email": "airflow@hopsworks.ai", "password": "pw" },
        }))
        .unwrap();
        config.registry = RegistryConfig::Static {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        config.platform.scheme = PlatformScheme::Http;
        config.platform.trust = PlatformTrust::SystemRoots;
        config.api_key.file = dir.join("api_key");
        config.validate().unwrap();
        config
    }

    #[tokio::test]
    async fn bootstrap_then_launch_and_query() {
        let mock = MockHopsworks::new("airflow@hopsworks.ai", "pw").project(119, "demo");
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(mock.clone(), dir.path()).await;

        let out = bootstrap(&config).await.unwrap();
        assert!(out.contains("api_key"));
        assert_eq!(
            std::fs::read_to_string(&config.api_key.file).unwrap(),
            mock.issued_keys()[0]
        );

        let wait = WaitOptions {
            initial_delay: Duration::ZERO,
            ..WaitOptions::default()
        };
        let out = launch_job(&config, "demo", "etl", Some("--full"), Some(&wait))
            .await
            .unwrap();
        assert_eq!(out, "etl: execution 1000 FINISHED (SUCCEEDED)");
        assert_eq!(mock.launches()[0].args, "--full");

        let out = job_state(&config, "demo", "etl", None, None).await.unwrap();
        assert_eq!(out, "etl: FINISHED (SUCCEEDED)");
    }

    #[tokio::test]
    async fn job_state_waits_for_latest_execution() {
        let mock = MockHopsworks::new("airflow@hopsworks.ai", "pw")
            .project(119, "demo")
            .execution_states(&[("RUNNING", "UNDEFINED"), ("FAILED", "FAILED")]);
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(mock, dir.path()).await;
        bootstrap(&config).await.unwrap();
        launch_job(&config, "demo", "etl", None, None).await.unwrap();

        let wait = WaitOptions {
            initial_delay: Duration::ZERO,
            ..WaitOptions::default()
        };
        let out = job_state(&config, "demo", "etl", None, Some((&wait, CompletionMode::Finished)))
            .await
            .unwrap();
        assert_eq!(out, "etl: FAILED (FAILED)");
    }

    #[tokio::test]
    async fn job_state_require_success_reports_failure() {
        let mock = MockHopsworks::new("airflow@hopsworks.ai", "pw")
            .project(119, "demo")
            .execution_states(&[("FINISHED", "KILLED")]);
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(mock, dir.path()).await;
        bootstrap(&config).await.unwrap();
        launch_job(&config, "demo", "etl", None, None).await.unwrap();

        let wait = WaitOptions {
            initial_delay: Duration::ZERO,
            ..WaitOptions::default()
        };
        let err = job_state(&config, "demo", "etl", Some(1000), Some((&wait, CompletionMode::Succeeded)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("KILLED"), "{err}");
    }

    #[tokio::test]
    async fn bootstrap_failure_has_context() {
        let mock = MockHopsworks::new("airflow@hopsworks.ai", "other");
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(mock, dir.path()).await;

        let err = bootstrap(&config).await.unwrap_err();
        assert_eq!(err.to_string(), "API key bootstrap failed");
        assert!(!config.api_key.file.exists());
    }

    #[test]
    fn show_config_redacts_password() {
        let config: HopsflowConfig = serde_json::from_str(
            r#"{"user": {"email": "a@b", "password": "hunter2"}, "api_key": {"file": "/k"}}"#,
        )
        .unwrap();
        let out = show_config(&config).unwrap();
        assert!(!out.contains("hunter2"));
        assert!(out.contains("a@b"));
    }
}
