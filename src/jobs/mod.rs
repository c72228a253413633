pub mod job;
pub mod scheduler;
pub mod store;

pub use job::{BatchConvertParams, JobOutcome, JobParams, JobRecord, JobStatus, SplitParams};
pub use scheduler::{JobError, JobScheduler};
pub use store::{JobStore, PersistenceError};
