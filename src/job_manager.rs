//! Job lookup, job-definition resolution and submission.

use crate::aws::BatchApi;
use crate::environment::{merge_environment, EnvironmentInput};
use crate::error::{BatchError, Result};
use crate::model::{
    DescribeJobDefinitionsRequest, DescribeJobsRequest, JobDetail, JobStatus, SubmitJobRequest,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;

/// Everything needed to submit a job besides its name and queue.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub definition_name: String,
    pub parameters: Option<BTreeMap<String, String>>,
    pub overrides: Option<Map<String, Value>>,
    pub environment: Option<EnvironmentInput>,
}

/// Looks up and submits jobs against the batch service.
pub struct JobManager<'a> {
    api: &'a dyn BatchApi,
}

impl<'a> JobManager<'a> {
    pub fn new(api: &'a dyn BatchApi) -> Self {
        Self { api }
    }

    /// Describe a single job, failing with `JobNotFound` when the service
    /// returns nothing for the id.
    pub fn get_job(&self, job_id: &str) -> Result<JobDetail> {
        if job_id.is_empty() {
            return Err(BatchError::Configuration("job_id required".to_string()));
        }
        let response = self.api.describe_jobs(&DescribeJobsRequest {
            jobs: vec![job_id.to_string()],
        })?;
        response
            .jobs
            .into_iter()
            .next()
            .ok_or_else(|| BatchError::JobNotFound(job_id.to_string()))
    }

    /// Get the current status of a job.
    pub fn get_job_status(&self, job_id: &str) -> Result<JobStatus> {
        Ok(self.get_job(job_id)?.status)
    }

    /// Resolve `name` to `name:revision` using its highest ACTIVE revision.
    pub fn latest_definition_id(&self, name: &str) -> Result<String> {
        let mut request = DescribeJobDefinitionsRequest {
            job_definition_name: name.to_string(),
            status: "ACTIVE".to_string(),
            next_token: None,
        };
        let mut revision = 0;

        loop {
            let page = self.api.describe_job_definitions(&request)?;
            revision = page
                .job_definitions
                .iter()
                .map(|d| d.revision)
                .fold(revision, u32::max);
            match page.next_token {
                Some(token) => request.next_token = Some(token),
                None => break,
            }
        }

        if revision == 0 {
            return Err(BatchError::DefinitionNotFound(name.to_string()));
        }
        Ok(format!("{}:{}", name, revision))
    }

    /// Build the submission request for `job_name` on `queue`.
    pub fn build_request(
        &self,
        job_name: &str,
        queue: &str,
        options: SubmitOptions,
    ) -> Result<SubmitJobRequest> {
        let job_definition = self.latest_definition_id(&options.definition_name)?;
        let container_overrides = match options.environment {
            Some(env) => Some(merge_environment(options.overrides, env.normalize())?),
            None => options.overrides,
        };

        Ok(SubmitJobRequest {
            job_name: job_name.to_string(),
            job_queue: queue.to_string(),
            job_definition,
            parameters: options.parameters,
            container_overrides,
        })
    }

    /// Submit a job and return the id assigned by the service.
    ///
    /// A confirmation line naming the resolved definition is written to `out`.
    pub fn submit_job(
        &self,
        job_name: &str,
        queue: &str,
        options: SubmitOptions,
        out: &mut dyn Write,
    ) -> Result<String> {
        let request = self.build_request(job_name, queue, options)?;
        let response = self.api.submit_job(&request)?;
        log::info!(
            "submitted {} to {} as {}",
            job_name,
            queue,
            response.job_id
        );
        writeln!(
            out,
            "submitted job {} from definition ID {} with ID {}",
            job_name, request.job_definition, response.job_id
        )?;
        Ok(response.job_id)
    }
}
