pub mod api;
pub mod config;
pub mod error;
pub mod pricing;
pub mod scan;
pub mod storage;
pub mod testing; // Mock collaborators and manual clock
pub mod utils;

pub use error::{ErrorKind, Result, ScanError};
pub use scan::{JobId, JobManager, JobStatus, ScanSettings, ScanTarget};
