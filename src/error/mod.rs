use log::error;
use thiserror::Error;

use crate::scan::job::{JobId, JobStatus};

#[derive(Debug, Clone, Error)]
pub enum ScanError {
    /// Invalid job settings or application configuration
    #[error("Configuration Error: {0}")]
    ConfigurationError(String),

    /// The catalog collaborator could not produce the enabled target list
    #[error("Catalog Unavailable: {0}")]
    CatalogUnavailable(String),

    /// A restart computed an empty target set
    #[error("No Work: {0}")]
    NoWork(String),

    /// Credentials rejected or the access token could not be obtained
    #[error("Auth Failure: {0}")]
    AuthFailure(String),

    #[error("Job Not Found: {0}")]
    JobNotFound(JobId),

    /// Lifecycle operation not allowed from the job's current status
    #[error("Invalid State: job {job_id} is {status}, cannot {operation}")]
    InvalidState {
        job_id: JobId,
        status: JobStatus,
        operation: &'static str,
    },

    /// Result store read/write errors
    #[error("Storage Error: {0}")]
    StorageError(String),

    /// Background task panicked or was aborted
    #[error("Worker Error: {0}")]
    WorkerError(String),
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::StorageError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::StorageError(format!("I/O error: {}", err))
    }
}

impl From<tokio::task::JoinError> for ScanError {
    fn from(err: tokio::task::JoinError) -> Self {
        ScanError::WorkerError(format!("scan worker terminated abnormally: {}", err))
    }
}

/// Machine-readable error kind surfaced by the command interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigurationError,
    CatalogUnavailable,
    NoWorkError,
    AuthFailure,
    JobNotFound,
    InvalidState,
    StorageError,
    WorkerError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::CatalogUnavailable => "CatalogUnavailable",
            ErrorKind::NoWorkError => "NoWorkError",
            ErrorKind::AuthFailure => "AuthFailure",
            ErrorKind::JobNotFound => "JobNotFound",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::StorageError => "StorageError",
            ErrorKind::WorkerError => "WorkerError",
        }
    }

    /// Process exit status for the CLI. Every kind is non-zero.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::ConfigurationError => 2,
            ErrorKind::CatalogUnavailable => 3,
            ErrorKind::NoWorkError => 4,
            ErrorKind::AuthFailure => 5,
            ErrorKind::JobNotFound => 6,
            ErrorKind::InvalidState => 7,
            ErrorKind::StorageError => 8,
            ErrorKind::WorkerError => 9,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::ConfigurationError(_) => ErrorKind::ConfigurationError,
            ScanError::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            ScanError::NoWork(_) => ErrorKind::NoWorkError,
            ScanError::AuthFailure(_) => ErrorKind::AuthFailure,
            ScanError::JobNotFound(_) => ErrorKind::JobNotFound,
            ScanError::InvalidState { .. } => ErrorKind::InvalidState,
            ScanError::StorageError(_) => ErrorKind::StorageError,
            ScanError::WorkerError(_) => ErrorKind::WorkerError,
        }
    }

    /// Informational errors are reported but do not indicate a fault.
    pub fn is_informational(&self) -> bool {
        matches!(self, ScanError::NoWork(_))
    }

    /// Errors that end a job as FAILED when they occur before dispatch.
    pub fn is_job_fatal(&self) -> bool {
        match self {
            ScanError::CatalogUnavailable(_) | ScanError::AuthFailure(_) => true,
            ScanError::ConfigurationError(_) => true,
            ScanError::NoWork(_) => false,
            ScanError::JobNotFound(_) | ScanError::InvalidState { .. } => false,
            ScanError::StorageError(_) | ScanError::WorkerError(_) => false,
        }
    }

    pub fn log(&self) {
        if self.is_informational() {
            log::info!("{}", self);
        } else {
            error!("[{}] {}", self.kind(), self);
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
