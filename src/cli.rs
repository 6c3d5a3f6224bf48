//! CLI entry point and command definitions.

use crate::aggregator::{
    aggregate_job_statuses, sorted_jobs, try_aggregate_job_statuses, AggregatedJobView,
};
use crate::aws::{AwsCli, BatchApi};
use crate::environment::{parse_key_values, parse_overrides, EnvironmentInput};
use crate::error::BatchError;
use crate::job_manager::{JobManager, SubmitOptions};
use crate::log_tailer::{LogSink, LogTailer, DEFAULT_LOG_GROUP};
use crate::model::JobStatus;
use crate::status_monitor::{StatusMonitor, WaitOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Batch Watch - submit and monitor jobs on a managed batch queue.
#[derive(Parser)]
#[command(name = "batch-watch")]
#[command(version)]
#[command(about = "Simple tool to submit and monitor AWS Batch jobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Job queue name
    #[arg(short, long, env = "BATCH_QUEUE", global = true)]
    pub queue: Option<String>,

    /// Job name
    #[arg(short, long, global = true)]
    pub job: Option<String>,

    /// Job definition name
    #[arg(short = 'd', long = "defn_name", env = "BATCH_DEFN_NAME", global = true)]
    pub defn_name: Option<String>,

    /// Comma separated name=value list of environment variables, or a JSON list/object
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// Comma separated name=value list of job parameters
    #[arg(short, long, global = true)]
    pub parameters: Option<String>,

    /// Container overrides as a JSON object
    #[arg(long, global = true)]
    pub overrides: Option<String>,

    /// Prefix log lines with their UTC timestamp
    #[arg(long, global = true)]
    pub timestamps: bool,

    /// Give up waiting on a job after this many seconds (counted per wait)
    #[arg(long, global = true, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Seconds between status polls
    #[arg(long, global = true, default_value_t = 10, value_name = "SECONDS")]
    pub poll_interval: u64,

    /// Log group holding job output
    #[arg(long, global = true, default_value = DEFAULT_LOG_GROUP)]
    pub log_group: String,

    /// AWS profile passed to the aws client
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// AWS region passed to the aws client
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Path to the aws command-line client
    #[arg(long, env = "BATCH_AWS_CLI", global = true, default_value = "aws")]
    pub aws_bin: PathBuf,

    /// Increase diagnostic output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Submit a job from the latest ACTIVE revision of a definition, then follow it
    Submit {
        /// Return after submission instead of waiting and printing the log
        #[arg(long)]
        no_watch: bool,
    },
    /// Show the latest job of every name on the queue, one column per status
    Jobs,
    /// Wait for a job to finish and print its log
    Log,
    /// Wait for a job to reach a status
    Wait {
        /// Comma separated statuses to wait for
        #[arg(long, default_value = "SUCCEEDED,FAILED")]
        until: String,
    },
}

/// Flags resolved into the values the handlers work with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub queue: String,
    pub job: Option<String>,
    pub defn_name: Option<String>,
    pub environment: Option<EnvironmentInput>,
    pub parameters: Option<std::collections::BTreeMap<String, String>>,
    pub overrides: Option<serde_json::Map<String, serde_json::Value>>,
    pub timestamps: bool,
    pub wait: WaitOptions,
    pub log_group: String,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self, BatchError> {
        let queue = cli.queue.clone().ok_or_else(|| {
            BatchError::Configuration("--queue or BATCH_QUEUE env var required".to_string())
        })?;
        let environment = cli
            .environment
            .as_deref()
            .map(EnvironmentInput::parse)
            .transpose()?;
        let overrides = cli.overrides.as_deref().map(parse_overrides).transpose()?;

        Ok(Self {
            queue,
            job: cli.job.clone(),
            defn_name: cli.defn_name.clone(),
            environment,
            parameters: cli.parameters.as_deref().map(parse_key_values),
            overrides,
            timestamps: cli.timestamps,
            wait: WaitOptions {
                poll_interval: Duration::from_secs(cli.poll_interval),
                timeout: None,
            }
            .with_timeout(cli.timeout.map(Duration::from_secs)),
            log_group: cli.log_group.clone(),
        })
    }

    fn require_job(&self) -> Result<&str, BatchError> {
        self.job
            .as_deref()
            .ok_or_else(|| BatchError::Configuration("--job required".to_string()))
    }

    /// Id of the latest job named `--job` on the queue.
    fn resolve_job_id<'v>(&self, view: &'v AggregatedJobView) -> Result<&'v str, BatchError> {
        let name = self.require_job()?;
        view.get(name)
            .map(|job| job.id.as_str())
            .ok_or_else(|| BatchError::JobNameNotFound {
                name: name.to_string(),
                queue: self.queue.clone(),
            })
    }
}

/// Run a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_cli(&cli)?;
    let api = AwsCli::new(cli.aws_bin.clone())
        .with_profile(cli.profile.clone())
        .with_region(cli.region.clone());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Submit { no_watch } => handle_submit(&api, &settings, no_watch, &mut out),
        Commands::Jobs => handle_jobs(&api, &settings, &mut out),
        Commands::Log => handle_log(&api, &settings, &mut out),
        Commands::Wait { until } => handle_wait(&api, &settings, &until, &mut out),
    }
}

fn table_row(cells: &[&str]) -> String {
    cells
        .iter()
        .map(|cell| format!("{:<15}", cell))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the jobs table: one 15-wide column per status, one row per name.
pub fn format_status_table(view: &AggregatedJobView) -> String {
    let header: Vec<&str> = JobStatus::ALL.iter().map(|s| s.as_str()).collect();
    let mut lines = vec![table_row(&header)];
    for (name, job) in sorted_jobs(view) {
        let cells: Vec<&str> = JobStatus::ALL
            .iter()
            .map(|s| if *s == job.status { name.as_str() } else { "" })
            .collect();
        lines.push(table_row(&cells));
    }
    lines.join("\n")
}

/// Handle the jobs command.
pub fn handle_jobs(api: &dyn BatchApi, settings: &Settings, out: &mut dyn Write) -> Result<()> {
    let view = aggregate_job_statuses(api, &settings.queue);
    writeln!(out, "{}", format_status_table(&view))?;
    Ok(())
}

/// Handle the submit command.
pub fn handle_submit(
    api: &dyn BatchApi,
    settings: &Settings,
    no_watch: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let job_name = settings.require_job()?;
    let definition_name = settings.defn_name.clone().ok_or_else(|| {
        BatchError::Configuration("--defn_name or BATCH_DEFN_NAME env var required".to_string())
    })?;

    let view = try_aggregate_job_statuses(api, &settings.queue)
        .context("Failed to check the queue for an existing job")?;
    if let Some(existing) = view.get(job_name) {
        return Err(BatchError::already_submitted(job_name, existing.status).into());
    }

    let options = SubmitOptions {
        definition_name,
        parameters: settings.parameters.clone(),
        overrides: settings.overrides.clone(),
        environment: settings.environment.clone(),
    };
    let job_id = JobManager::new(api)
        .submit_job(job_name, &settings.queue, options, out)
        .with_context(|| format!("Failed to submit job {}", job_name))?;

    if no_watch {
        return Ok(());
    }

    StatusMonitor::new(api, settings.wait)
        .wait_for_completion(&job_id, Some(&mut *out))?;
    LogTailer::new(api, settings.wait)
        .with_log_group(settings.log_group.clone())
        .read_log(&job_id, settings.timestamps, LogSink::Stream(&mut *out))?;
    Ok(())
}

/// Handle the log command.
pub fn handle_log(api: &dyn BatchApi, settings: &Settings, out: &mut dyn Write) -> Result<()> {
    settings.require_job()?;
    let view = aggregate_job_statuses(api, &settings.queue);
    let job_id = settings.resolve_job_id(&view)?;

    LogTailer::new(api, settings.wait)
        .with_log_group(settings.log_group.clone())
        .read_log(job_id, settings.timestamps, LogSink::Stream(out))?;
    Ok(())
}

/// Handle the wait command.
pub fn handle_wait(
    api: &dyn BatchApi,
    settings: &Settings,
    until: &str,
    out: &mut dyn Write,
) -> Result<()> {
    let statuses = JobStatus::parse_list(until).map_err(BatchError::Configuration)?;
    if statuses.is_empty() {
        return Err(BatchError::Configuration("--until needs at least one status".to_string()).into());
    }
    settings.require_job()?;
    let view = aggregate_job_statuses(api, &settings.queue);
    let job_id = settings.resolve_job_id(&view)?;

    StatusMonitor::new(api, settings.wait)
        .wait_for_status(job_id, &statuses, Some(out))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{definition, event, summary, FakeBatch};

    fn settings(job: Option<&str>) -> Settings {
        Settings {
            queue: "q".to_string(),
            job: job.map(str::to_string),
            defn_name: Some("foo".to_string()),
            environment: None,
            parameters: None,
            overrides: None,
            timestamps: false,
            wait: WaitOptions {
                poll_interval: Duration::ZERO,
                timeout: None,
            },
            log_group: DEFAULT_LOG_GROUP.to_string(),
        }
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "batch-watch",
            "submit",
            "-q",
            "main",
            "-j",
            "etl",
            "--defn_name",
            "etl-defn",
            "-e",
            "A=1,B=2",
            "--no-watch",
            "--timeout",
            "30",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Submit { no_watch: true });
        assert_eq!(cli.queue.as_deref(), Some("main"));
        assert_eq!(cli.job.as_deref(), Some("etl"));
        assert_eq!(cli.defn_name.as_deref(), Some("etl-defn"));

        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(
            settings.environment,
            Some(EnvironmentInput::Text("A=1,B=2".to_string()))
        );
        assert_eq!(settings.wait.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.wait.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_max_timeout_does_not_overflow() {
        let cli = Cli::try_parse_from([
            "batch-watch",
            "wait",
            "-q",
            "main",
            "-j",
            "etl",
            "--timeout",
            "18446744073709551615",
        ])
        .unwrap();
        let mut settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.wait.timeout, Some(Duration::from_secs(u64::MAX)));
        settings.wait.poll_interval = Duration::ZERO;

        let api = FakeBatch::new()
            .with_listing(JobStatus::Running, vec![summary("j-1", "etl", JobStatus::Running, 1)])
            .with_job("j-1", "etl", &[JobStatus::Running, JobStatus::Failed], None);
        let mut out = Vec::new();
        handle_wait(&api, &settings, "SUCCEEDED,FAILED", &mut out).unwrap();
        assert!(output(out).trim_end().ends_with("status is FAILED"));
    }

    #[test]
    fn test_wait_until_parses() {
        let cli = Cli::try_parse_from(["batch-watch", "-q", "main", "wait", "--until", "RUNNING"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Wait {
                until: "RUNNING".to_string()
            }
        );
    }

    #[test]
    fn test_missing_queue_message() {
        let cli = Cli::try_parse_from(["batch-watch", "jobs"]).unwrap();
        let cli = Cli { queue: None, ..cli };
        let err = Settings::from_cli(&cli).unwrap_err();
        assert_eq!(err.to_string(), "--queue or BATCH_QUEUE env var required");
    }

    #[test]
    fn test_status_table() {
        let api = FakeBatch::new()
            .with_listing(JobStatus::Running, vec![summary("1", "zeta", JobStatus::Running, 1)])
            .with_listing(JobStatus::Submitted, vec![summary("2", "alpha", JobStatus::Submitted, 1)]);
        let mut out = Vec::new();
        handle_jobs(&api, &settings(None), &mut out).unwrap();

        let text = output(out);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("SUBMITTED       PENDING         RUNNABLE"));
        assert!(lines[1].starts_with("alpha           "));
        assert_eq!(lines[2].find("zeta"), Some(16 * 4));
    }

    #[test]
    fn test_submit_refuses_duplicate_name() {
        let api = FakeBatch::new()
            .with_listing(JobStatus::Running, vec![summary("1", "etl", JobStatus::Running, 1)])
            .with_definition_page(vec![definition("foo", 1)]);
        let mut out = Vec::new();

        let err = handle_submit(&api, &settings(Some("etl")), true, &mut out).unwrap_err();
        assert_eq!(
            err.to_string(),
            "job 'etl' already processing with status RUNNING"
        );
        assert!(api.submitted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_submit_aborts_when_listing_fails() {
        let api = FakeBatch::new()
            .with_listing(JobStatus::Running, vec![summary("1", "etl", JobStatus::Running, 1)])
            .with_failing_status(JobStatus::Running)
            .with_definition_page(vec![definition("foo", 1)]);
        let mut out = Vec::new();

        let err = handle_submit(&api, &settings(Some("etl")), true, &mut out).unwrap_err();
        assert_eq!(err.to_string(), "Failed to check the queue for an existing job");
        assert!(api.submitted.lock().unwrap().is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn test_submit_requires_definition() {
        let api = FakeBatch::new();
        let mut s = settings(Some("etl"));
        s.defn_name = None;
        let err = handle_submit(&api, &s, true, &mut Vec::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "--defn_name or BATCH_DEFN_NAME env var required"
        );
    }

    #[test]
    fn test_submit_and_watch() {
        let api = FakeBatch::new()
            .with_definition_page(vec![definition("foo", 1), definition("foo", 3)])
            .with_job(
                "job-1",
                "etl",
                &[JobStatus::Submitted, JobStatus::Runnable, JobStatus::Succeeded],
                Some("etl/default/abc"),
            )
            .with_log_page(vec![event(0, "hello"), event(1, "bye")], Some("1"))
            .with_log_page(vec![], Some("1"));
        let mut out = Vec::new();

        handle_submit(&api, &settings(Some("etl")), false, &mut out).unwrap();

        let text = output(out);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "submitted job etl from definition ID foo:3 with ID job-1");
        assert!(lines[1].ends_with("status is SUBMITTED"));
        assert!(lines[2].ends_with("status is RUNNABLE"));
        assert!(lines[3].ends_with("status is SUCCEEDED"));
        assert_eq!(&lines[4..], ["hello", "bye"]);
    }

    #[test]
    fn test_log_unknown_job_name() {
        let api = FakeBatch::new();
        let err = handle_log(&api, &settings(Some("ghost")), &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "job ghost not found on queue q");
    }

    #[test]
    fn test_wait_requires_job() {
        let api = FakeBatch::new();
        let err = handle_wait(&api, &settings(None), "SUCCEEDED,FAILED", &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "--job required");
    }

    #[test]
    fn test_wait_resolves_latest_job() {
        let api = FakeBatch::new()
            .with_listing(JobStatus::Failed, vec![summary("old", "etl", JobStatus::Failed, 1)])
            .with_listing(JobStatus::Running, vec![summary("new", "etl", JobStatus::Running, 2)])
            .with_job("new", "etl", &[JobStatus::Running, JobStatus::Succeeded], None);
        let mut out = Vec::new();

        handle_wait(&api, &settings(Some("etl")), "SUCCEEDED,FAILED", &mut out).unwrap();
        assert!(output(out).trim_end().ends_with("status is SUCCEEDED"));
    }
}
