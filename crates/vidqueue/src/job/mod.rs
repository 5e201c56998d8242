pub mod record;
pub mod status;

pub use record::{GenerationParams, JobRecord, StatusUpdate};
pub use status::JobStatus;
