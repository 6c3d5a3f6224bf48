//! Queue-wide job view: one listing per lifecycle status, fetched
//! concurrently and merged by job name.

use crate::aws::BatchApi;
use crate::error::Result;
use crate::model::{JobStatus, JobSummary, ListJobsRequest};
use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

/// Latest job seen under a given name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedJob {
    pub id: String,
    pub status: JobStatus,
    pub created_at: i64,
}

/// Job name to the most recently created job with that name.
pub type AggregatedJobView = HashMap<String, AggregatedJob>;

/// List every job in `queue` with `status`, following continuation tokens
/// until the last page. When `job_name` is given only exact matches are kept.
pub fn fetch_jobs_by_status(
    api: &dyn BatchApi,
    queue: &str,
    status: JobStatus,
    job_name: Option<&str>,
) -> Result<Vec<JobSummary>> {
    let mut request = ListJobsRequest {
        job_queue: queue.to_string(),
        job_status: status,
        next_token: None,
    };
    let mut jobs = Vec::new();

    loop {
        let page = api.list_jobs(&request)?;
        jobs.extend(
            page.job_summary_list
                .into_iter()
                .filter(|job| job_name.map_or(true, |name| job.job_name == name)),
        );
        match page.next_token {
            Some(token) => request.next_token = Some(token),
            None => break,
        }
    }

    Ok(jobs)
}

/// Fold summaries into the view, keeping the newest job per name.
///
/// An existing entry is replaced only by a strictly later `created_at`, so the
/// result does not depend on the order the summaries arrive in (except for
/// exact ties).
pub fn merge_summaries(view: &mut AggregatedJobView, summaries: Vec<JobSummary>) {
    for summary in summaries {
        let candidate = AggregatedJob {
            id: summary.job_id,
            status: summary.status,
            created_at: summary.created_at,
        };
        match view.get_mut(&summary.job_name) {
            Some(existing) if candidate.created_at > existing.created_at => *existing = candidate,
            Some(_) => {}
            None => {
                view.insert(summary.job_name, candidate);
            }
        }
    }
}

/// Run one listing per status concurrently and collect every outcome.
fn list_all_statuses(
    api: &dyn BatchApi,
    queue: &str,
) -> Vec<(JobStatus, Result<Vec<JobSummary>>)> {
    let (tx, rx) = mpsc::channel();

    thread::scope(|scope| {
        for status in JobStatus::ALL {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = fetch_jobs_by_status(api, queue, status, None);
                let _ = tx.send((status, result));
            });
        }
    });
    drop(tx);

    rx.into_iter().collect()
}

/// Build the queue-wide view from one concurrent listing per status.
///
/// A listing that fails is logged and contributes no jobs; the remaining
/// statuses are still merged.
pub fn aggregate_job_statuses(api: &dyn BatchApi, queue: &str) -> AggregatedJobView {
    let mut view = AggregatedJobView::new();
    for (status, result) in list_all_statuses(api, queue) {
        match result {
            Ok(summaries) => {
                log::debug!("{} {} job(s) on {}", summaries.len(), status, queue);
                merge_summaries(&mut view, summaries);
            }
            Err(e) => {
                log::warn!("listing {} jobs on {} failed: {}", status, queue, e);
            }
        }
    }
    view
}

/// Like [`aggregate_job_statuses`], but any failed listing fails the whole
/// view. Used where a missing status would hide an existing job.
pub fn try_aggregate_job_statuses(api: &dyn BatchApi, queue: &str) -> Result<AggregatedJobView> {
    let mut view = AggregatedJobView::new();
    for (_, result) in list_all_statuses(api, queue) {
        merge_summaries(&mut view, result?);
    }
    Ok(view)
}

/// Entries sorted by job name, for display.
pub fn sorted_jobs(view: &AggregatedJobView) -> Vec<(&String, &AggregatedJob)> {
    let mut jobs: Vec<_> = view.iter().collect();
    jobs.sort_by(|a, b| a.0.cmp(b.0));
    jobs
}
