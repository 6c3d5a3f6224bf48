//! In-memory [`BatchApi`] used by the unit tests.

use crate::aws::BatchApi;
use crate::error::{BatchError, Result};
use crate::model::{
    ContainerDetail, DescribeJobDefinitionsRequest, DescribeJobsRequest, DescribeJobsResponse,
    GetLogEventsRequest, JobDefinition, JobDefinitionsPage, JobDetail, JobStatus, JobSummary,
    ListJobsPage, ListJobsRequest, LogEvent, LogEventsPage, SubmitJobRequest, SubmitJobResponse,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

struct FakeJob {
    name: String,
    statuses: VecDeque<JobStatus>,
    log_stream: Option<String>,
}

#[derive(Default)]
pub struct FakeBatch {
    /// Summaries per status, served `page_size` at a time.
    listings: HashMap<JobStatus, Vec<JobSummary>>,
    page_size: usize,
    failing_statuses: HashSet<JobStatus>,
    jobs: Mutex<HashMap<String, FakeJob>>,
    definitions: Vec<Vec<JobDefinition>>,
    log_pages: Vec<LogEventsPage>,
    pub list_calls: Mutex<Vec<ListJobsRequest>>,
    pub describe_calls: Mutex<usize>,
    pub log_calls: Mutex<Vec<GetLogEventsRequest>>,
    pub submitted: Mutex<Vec<SubmitJobRequest>>,
}

fn token_index(token: &Option<String>) -> usize {
    token.as_deref().and_then(|t| t.parse().ok()).unwrap_or(0)
}

pub fn summary(id: &str, name: &str, status: JobStatus, created_at: i64) -> JobSummary {
    JobSummary {
        job_id: id.to_string(),
        job_name: name.to_string(),
        status,
        created_at,
    }
}

pub fn definition(name: &str, revision: u32) -> JobDefinition {
    JobDefinition {
        job_definition_name: name.to_string(),
        revision,
        status: Some("ACTIVE".to_string()),
    }
}

pub fn event(timestamp: i64, message: &str) -> LogEvent {
    LogEvent {
        timestamp,
        message: message.to_string(),
    }
}

impl FakeBatch {
    pub fn new() -> Self {
        Self {
            page_size: 2,
            ..Default::default()
        }
    }

    pub fn with_listing(mut self, status: JobStatus, summaries: Vec<JobSummary>) -> Self {
        self.listings.entry(status).or_default().extend(summaries);
        self
    }

    pub fn with_failing_status(mut self, status: JobStatus) -> Self {
        self.failing_statuses.insert(status);
        self
    }

    /// Register a job whose status advances one step per describe call and
    /// then stays on the last value.
    pub fn with_job(self, id: &str, name: &str, statuses: &[JobStatus], log_stream: Option<&str>) -> Self {
        self.jobs.lock().unwrap().insert(
            id.to_string(),
            FakeJob {
                name: name.to_string(),
                statuses: statuses.iter().copied().collect(),
                log_stream: log_stream.map(str::to_string),
            },
        );
        self
    }

    pub fn with_definition_page(mut self, page: Vec<JobDefinition>) -> Self {
        self.definitions.push(page);
        self
    }

    pub fn with_log_page(mut self, events: Vec<LogEvent>, next_forward_token: Option<&str>) -> Self {
        self.log_pages.push(LogEventsPage {
            events,
            next_forward_token: next_forward_token.map(str::to_string),
        });
        self
    }
}

impl BatchApi for FakeBatch {
    fn list_jobs(&self, request: &ListJobsRequest) -> Result<ListJobsPage> {
        self.list_calls.lock().unwrap().push(request.clone());
        if self.failing_statuses.contains(&request.job_status) {
            return Err(BatchError::Transport {
                operation: "ListJobs".to_string(),
                code: Some("ServerException".to_string()),
                message: "unavailable".to_string(),
            });
        }
        let all = self
            .listings
            .get(&request.job_status)
            .cloned()
            .unwrap_or_default();
        let start = token_index(&request.next_token);
        let end = (start + self.page_size).min(all.len());
        let next_token = if end < all.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(ListJobsPage {
            job_summary_list: all[start.min(end)..end].to_vec(),
            next_token,
        })
    }

    fn describe_jobs(&self, request: &DescribeJobsRequest) -> Result<DescribeJobsResponse> {
        *self.describe_calls.lock().unwrap() += 1;
        let mut jobs = self.jobs.lock().unwrap();
        let mut found = Vec::new();
        for id in &request.jobs {
            if let Some(job) = jobs.get_mut(id) {
                let status = if job.statuses.len() > 1 {
                    job.statuses.pop_front()
                } else {
                    job.statuses.front().copied()
                };
                if let Some(status) = status {
                    found.push(JobDetail {
                        job_id: id.clone(),
                        job_name: job.name.clone(),
                        status,
                        created_at: Some(0),
                        container: Some(ContainerDetail {
                            log_stream_name: job.log_stream.clone(),
                        }),
                    });
                }
            }
        }
        Ok(DescribeJobsResponse { jobs: found })
    }

    fn describe_job_definitions(
        &self,
        request: &DescribeJobDefinitionsRequest,
    ) -> Result<JobDefinitionsPage> {
        let index = token_index(&request.next_token);
        let job_definitions = self
            .definitions
            .get(index)
            .map(|page| {
                page.iter()
                    .filter(|d| d.job_definition_name == request.job_definition_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let next_token = if index + 1 < self.definitions.len() {
            Some((index + 1).to_string())
        } else {
            None
        };
        Ok(JobDefinitionsPage {
            job_definitions,
            next_token,
        })
    }

    fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitJobResponse> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        Ok(SubmitJobResponse {
            job_id: format!("job-{}", submitted.len()),
        })
    }

    fn get_log_events(&self, request: &GetLogEventsRequest) -> Result<LogEventsPage> {
        self.log_calls.lock().unwrap().push(request.clone());
        Ok(self
            .log_pages
            .get(token_index(&request.next_token))
            .cloned()
            .unwrap_or_default())
    }
}
