//! hopsflow: issues the orchestrator's platform API key and drives jobs with it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hopsflow_sdk::{CompletionMode, HopsflowConfig, WaitOptions};

mod commands;

/// Default attributes file written by the deployment recipe.
const DEFAULT_CONFIG: &str = "/srv/hops/airflow/hopsflow.json";

#[derive(Parser, Debug)]
#[command(name = "hopsflow", version, about = "Hopsworks credential bootstrap and job control")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in as the service user, mint an API key and write the key file.
    Bootstrap,
    /// Launch a job, by default waiting for it to finish.
    LaunchJob(LaunchArgs),
    /// Print the state of a job execution, optionally waiting for it to finish.
    JobState(JobStateArgs),
    /// Print the effective configuration, password redacted.
    ShowConfig,
}

#[derive(Args, Debug)]
struct LaunchArgs {
    /// Project name.
    #[arg(long)]
    project: String,
    /// Job name.
    #[arg(long)]
    job: String,
    /// Arguments passed to the job.
    #[arg(long, allow_hyphen_values = true)]
    args: Option<String>,
    /// Return as soon as the job is launched.
    #[arg(long)]
    no_wait: bool,
    /// Report a failed execution instead of exiting with an error.
    #[arg(long)]
    ignore_failure: bool,
    #[command(flatten)]
    poll: PollArgs,
}

impl LaunchArgs {
    fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            ignore_failure: self.ignore_failure,
            ..self.poll.wait_options()
        }
    }
}

#[derive(Args, Debug)]
struct JobStateArgs {
    /// Project name.
    #[arg(long)]
    project: String,
    /// Job name.
    #[arg(long)]
    job: String,
    /// Execution id; the latest execution if omitted.
    #[arg(long)]
    execution: Option<i64>,
    /// Poll until the execution finishes instead of printing the current state.
    #[arg(long)]
    wait: bool,
    /// With --wait, exit with an error unless the execution succeeds.
    #[arg(long, requires = "wait")]
    require_success: bool,
    #[command(flatten)]
    poll: PollArgs,
}

impl JobStateArgs {
    /// Polling settings and mode, when waiting was asked for.
    fn wait(&self) -> Option<(WaitOptions, CompletionMode)> {
        let mode = if self.require_success {
            CompletionMode::Succeeded
        } else {
            CompletionMode::Finished
        };
        let options = WaitOptions {
            initial_delay: Duration::ZERO,
            ..self.poll.wait_options()
        };
        self.wait.then_some((options, mode))
    }
}

/// Polling flags shared by the waiting commands.
#[derive(Args, Debug)]
struct PollArgs {
    /// Seconds between state polls.
    #[arg(long, default_value_t = 1)]
    poke_interval: u64,
    /// Give up waiting after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Application state that ends the wait; repeatable. Any final state if omitted.
    #[arg(long = "wait-for-state", value_name = "STATE")]
    wait_for_states: Vec<String>,
}

impl PollArgs {
    fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            poke_interval: Duration::from_secs(self.poke_interval),
            timeout: self.timeout.map(Duration::from_secs),
            wait_for_states: (!self.wait_for_states.is_empty()).then(|| self.wait_for_states.clone()),
            ..WaitOptions::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (controlled via RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // show-config must work on configurations that fail validation
    let config = if let Command::ShowConfig = cli.command {
        HopsflowConfig::from_file(&cli.config).map(|mut config| {
            config.apply_env();
            config
        })
    } else {
        HopsflowConfig::load(&cli.config)
    }
    .with_context(|| format!("loading {}", cli.config.display()))?;

    println!("{}", run(cli.command, &config).await?);
    Ok(())
}

async fn run(command: Command, config: &HopsflowConfig) -> anyhow::Result<String> {
    match command {
        Command::Bootstrap => commands::bootstrap(config).await,
        Command::LaunchJob(args) => {
            let wait = (!args.no_wait).then(|| args.wait_options());
            commands::launch_job(config, &args.project, &args.job, args.args.as_deref(), wait.as_ref())
                .await
        }
        Command::JobState(args) => {
            let wait = args.wait();
            let wait = wait.as_ref().map(|(options, mode)| (options, *mode));
            commands::job_state(config, &args.project, &args.job, args.execution, wait).await
        }
        Command::ShowConfig => commands::show_config(config),
    }
}
