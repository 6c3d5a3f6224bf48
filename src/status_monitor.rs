//! Polling a single job until it reaches one of a set of statuses.

use crate::aws::BatchApi;
use crate::error::{BatchError, Result};
use crate::job_manager::JobManager;
use crate::model::JobStatus;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

/// Default time between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Granularity at which a pause checks its deadline.
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait between polls and when to give up.
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    /// Budget for one wait, counted from the first poll. No timeout means
    /// wait until the job reaches a requested status.
    pub timeout: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl WaitOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// UTC timestamp used on transition lines.
pub fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Polls a job's status until it reaches one of the requested statuses.
pub struct StatusMonitor<'a> {
    jobs: JobManager<'a>,
    options: WaitOptions,
}

impl<'a> StatusMonitor<'a> {
    pub fn new(api: &'a dyn BatchApi, options: WaitOptions) -> Self {
        Self {
            jobs: JobManager::new(api),
            options,
        }
    }

    /// Block until the job's status is in `statuses` and return it.
    ///
    /// When `out` is given, one `<timestamp> status is <STATUS>` line is
    /// written each time the observed status changes, including the first.
    pub fn wait_for_status(
        &self,
        job_id: &str,
        statuses: &[JobStatus],
        mut out: Option<&mut dyn Write>,
    ) -> Result<JobStatus> {
        // A timeout too large to represent as an instant is no deadline at all.
        let deadline = self
            .options
            .timeout
            .and_then(|t| Instant::now().checked_add(t));
        let mut last_status: Option<JobStatus> = None;

        loop {
            let status = self.jobs.get_job_status(job_id)?;
            if last_status != Some(status) {
                if let Some(out) = out.as_deref_mut() {
                    writeln!(out, "{} status is {}", timestamp(), status)?;
                    out.flush()?;
                }
                log::debug!("job {} is {}", job_id, status);
                last_status = Some(status);
            }
            if statuses.contains(&status) {
                return Ok(status);
            }
            self.pause(job_id, status, deadline)?;
        }
    }

    /// Wait for `SUCCEEDED` or `FAILED`.
    pub fn wait_for_completion(&self, job_id: &str, out: Option<&mut dyn Write>) -> Result<JobStatus> {
        let status = self.wait_for_status(job_id, &JobStatus::TERMINAL, out)?;
        log::info!("job {} finished with {}", job_id, status);
        Ok(status)
    }

    /// Sleep for one poll interval, checking the deadline as it goes.
    fn pause(&self, job_id: &str, last_status: JobStatus, deadline: Option<Instant>) -> Result<()> {
        let mut remaining = self.options.poll_interval;
        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(BatchError::Cancelled {
                        job_id: job_id.to_string(),
                        last_status: last_status.to_string(),
                    });
                }
            }
            if remaining.is_zero() {
                return Ok(());
            }
            let step = remaining.min(CHECK_INTERVAL);
            thread::sleep(step);
            remaining -= step;
        }
    }
}
