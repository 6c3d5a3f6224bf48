//! Error types shared by the service layer and the job operations.

use crate::model::JobStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    /// A required identifier or flag is missing or malformed.
    #[error("{0}")]
    Configuration(String),

    #[error("job_id {0} not found")]
    JobNotFound(String),

    #[error("job {name} not found on queue {queue}")]
    JobNameNotFound { name: String, queue: String },

    #[error("ACTIVE job definition with name '{0}' not found")]
    DefinitionNotFound(String),

    #[error("job '{name}' already processing with status {status}")]
    AlreadyProcessing { name: String, status: JobStatus },

    #[error("job '{name}' already processed with status {status}")]
    AlreadyProcessed { name: String, status: JobStatus },

    #[error("job {0} has no log stream")]
    LogStreamUnavailable(String),

    #[error("gave up waiting for job {job_id} (last status {last_status})")]
    Cancelled { job_id: String, last_status: String },

    #[error("{operation} failed{}: {message}", code_suffix(.code))]
    Transport {
        operation: String,
        code: Option<String>,
        message: String,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("could not decode {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BatchError {
    /// Duplicate-submission error for a job name that already exists on the queue.
    pub fn already_submitted(name: &str, status: JobStatus) -> Self {
        let name = name.to_string();
        if status.is_terminal() {
            BatchError::AlreadyProcessed { name, status }
        } else {
            BatchError::AlreadyProcessing { name, status }
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, BatchError>;
