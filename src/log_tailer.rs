//! Reading a finished job's log stream.

use crate::aws::BatchApi;
use crate::error::{BatchError, Result};
use crate::job_manager::JobManager;
use crate::model::{GetLogEventsRequest, LogEvent};
use crate::status_monitor::{StatusMonitor, WaitOptions};
use chrono::DateTime;
use std::io::Write;

/// Log group the batch service writes container output to.
pub const DEFAULT_LOG_GROUP: &str = "/aws/batch/job";

/// Where log lines go.
pub enum LogSink<'w> {
    /// Write each line as soon as its page arrives.
    Stream(&'w mut dyn Write),
    /// Accumulate everything and return it joined by newlines.
    Collect,
}

/// Render one event, optionally prefixed with its UTC time to the second.
pub fn format_event(event: &LogEvent, with_timestamp: bool) -> String {
    if !with_timestamp {
        return event.message.clone();
    }
    let stamp = DateTime::from_timestamp_millis(event.timestamp)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| event.timestamp.to_string());
    format!("{}: {}", stamp, event.message)
}

/// Reads the log stream of a job once it has finished.
pub struct LogTailer<'a> {
    api: &'a dyn BatchApi,
    options: WaitOptions,
    log_group: String,
}

impl<'a> LogTailer<'a> {
    pub fn new(api: &'a dyn BatchApi, options: WaitOptions) -> Self {
        Self {
            api,
            options,
            log_group: DEFAULT_LOG_GROUP.to_string(),
        }
    }

    pub fn with_log_group(mut self, log_group: impl Into<String>) -> Self {
        self.log_group = log_group.into();
        self
    }

    /// Wait for the job to finish, then page through its log from the head.
    ///
    /// Returns the joined text for [`LogSink::Collect`] and `None` when
    /// streaming.
    pub fn read_log(
        &self,
        job_id: &str,
        with_timestamp: bool,
        mut sink: LogSink<'_>,
    ) -> Result<Option<String>> {
        StatusMonitor::new(self.api, self.options).wait_for_completion(job_id, None)?;

        let job = JobManager::new(self.api).get_job(job_id)?;
        let log_stream_name = job
            .log_stream_name()
            .ok_or_else(|| BatchError::LogStreamUnavailable(job_id.to_string()))?
            .to_string();

        let mut request = GetLogEventsRequest {
            log_group_name: self.log_group.clone(),
            log_stream_name,
            start_from_head: true,
            next_token: None,
        };
        let mut lines = Vec::new();

        loop {
            let page = self.api.get_log_events(&request)?;
            // The service hands back a forward token even on the last page,
            // so an empty page is the other end-of-stream signal.
            let token = match page.next_forward_token {
                Some(token) if !page.events.is_empty() => token,
                _ => break,
            };
            for event in &page.events {
                let line = format_event(event, with_timestamp);
                match &mut sink {
                    LogSink::Stream(out) => writeln!(out, "{}", line)?,
                    LogSink::Collect => lines.push(line),
                }
            }
            if let LogSink::Stream(out) = &mut sink {
                out.flush()?;
            }
            request.next_token = Some(token);
        }

        match sink {
            LogSink::Stream(_) => Ok(None),
            LogSink::Collect => Ok(Some(lines.join("\n"))),
        }
    }
}
