//! In-memory fakes of the scheduler and the cloud shared by the hook tests.
pub mod utils;
