//! Access to the batch and log services through the `aws` command-line client.

use crate::error::{BatchError, Result};
use crate::model::{
    DescribeJobDefinitionsRequest, DescribeJobsRequest, DescribeJobsResponse,
    GetLogEventsRequest, JobDefinitionsPage, ListJobsPage, ListJobsRequest, LogEventsPage,
    SubmitJobRequest, SubmitJobResponse,
};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// The calls this tool makes against the external services.
///
/// Every method is a single request; pagination is driven by the caller
/// through the `next_token` fields of the request types.
pub trait BatchApi: Send + Sync {
    fn list_jobs(&self, request: &ListJobsRequest) -> Result<ListJobsPage>;

    fn describe_jobs(&self, request: &DescribeJobsRequest) -> Result<DescribeJobsResponse>;

    fn describe_job_definitions(
        &self,
        request: &DescribeJobDefinitionsRequest,
    ) -> Result<JobDefinitionsPage>;

    fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse>;

    fn get_log_events(&self, request: &GetLogEventsRequest) -> Result<LogEventsPage>;
}

/// A service operation as addressed by the `aws` client.
#[derive(Debug, Clone, Copy)]
struct Operation {
    service: &'static str,
    command: &'static str,
    name: &'static str,
}

const LIST_JOBS: Operation = Operation {
    service: "batch",
    command: "list-jobs",
    name: "ListJobs",
};
const DESCRIBE_JOBS: Operation = Operation {
    service: "batch",
    command: "describe-jobs",
    name: "DescribeJobs",
};
const DESCRIBE_JOB_DEFINITIONS: Operation = Operation {
    service: "batch",
    command: "describe-job-definitions",
    name: "DescribeJobDefinitions",
};
const SUBMIT_JOB: Operation = Operation {
    service: "batch",
    command: "submit-job",
    name: "SubmitJob",
};
const GET_LOG_EVENTS: Operation = Operation {
    service: "logs",
    command: "get-log-events",
    name: "GetLogEvents",
};

/// Result of running an `aws` command
#[derive(Debug)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
}

/// Execute the `aws` client and capture stdout, stderr, and return code.
pub fn run_aws_command(bin: &Path, args: &[String]) -> std::io::Result<CommandResult> {
    let output = Command::new(bin).args(args).output()?;

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        return_code: output.status.code().unwrap_or(-1),
    })
}

/// Parse the service error code and message from the client's stderr.
///
/// Typical output: "An error occurred (ClientException) when calling the
/// DescribeJobs operation: Job queue does not exist."
pub fn parse_service_error(stderr: &str) -> Option<(String, String)> {
    let re = Regex::new(
        r"An error occurred \(([^)]+)\) when calling the \w+ operation(?: \([^)]*\))?: (.*)",
    )
    .ok()?;
    let caps = re.captures(stderr)?;
    Some((
        caps.get(1)?.as_str().to_string(),
        caps.get(2)?.as_str().trim().to_string(),
    ))
}

/// [`BatchApi`] backed by the `aws` command-line client.
#[derive(Debug, Clone)]
pub struct AwsCli {
    bin: PathBuf,
    profile: Option<String>,
    region: Option<String>,
}

impl AwsCli {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            profile: None,
            region: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    fn command_args(&self, op: Operation, input: String) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(profile) = &self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args.extend(
            [
                op.service,
                op.command,
                "--cli-input-json",
                input.as_str(),
                "--no-paginate",
                "--output",
                "json",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    fn call<Req, Resp>(&self, op: Operation, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let input = serde_json::to_string(request).map_err(|source| BatchError::Decode {
            operation: op.name.to_string(),
            source,
        })?;
        log::debug!("{} {} {}", op.service, op.command, input);

        let args = self.command_args(op, input);
        let result = run_aws_command(&self.bin, &args).map_err(|e| BatchError::Transport {
            operation: op.name.to_string(),
            code: None,
            message: format!("failed to execute {}: {}", self.bin.display(), e),
        })?;

        if result.return_code != 0 {
            log::debug!(
                "{} exited with {}: {}",
                op.name,
                result.return_code,
                result.stderr.trim()
            );
            let (code, message) = match parse_service_error(&result.stderr) {
                Some((code, message)) => (Some(code), message),
                None if !result.stderr.trim().is_empty() => {
                    (None, result.stderr.trim().to_string())
                }
                None => (None, format!("exit code {}", result.return_code)),
            };
            return Err(BatchError::Transport {
                operation: op.name.to_string(),
                code,
                message,
            });
        }

        serde_json::from_str(&result.stdout).map_err(|source| BatchError::Decode {
            operation: op.name.to_string(),
            source,
        })
    }
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new("aws")
    }
}

impl BatchApi for AwsCli {
    fn list_jobs(&self, request: &ListJobsRequest) -> Result<ListJobsPage> {
        self.call(LIST_JOBS, request)
    }

    fn describe_jobs(&self, request: &DescribeJobsRequest) -> Result<DescribeJobsResponse> {
        self.call(DESCRIBE_JOBS, request)
    }

    fn describe_job_definitions(
        &self,
        request: &DescribeJobDefinitionsRequest,
    ) -> Result<JobDefinitionsPage> {
        self.call(DESCRIBE_JOB_DEFINITIONS, request)
    }

    fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse> {
        self.call(SUBMIT_JOB, request)
    }

    fn get_log_events(&self, request: &GetLogEventsRequest) -> Result<LogEventsPage> {
        self.call(GET_LOG_EVENTS, request)
    }
}
