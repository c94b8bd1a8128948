pub mod cli;
pub mod export;
pub mod panic_handler;
pub mod paths;
pub mod record;
pub mod record_store;
pub mod session;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use export::{ExportController, ExportError, ExportJob, JobStatus, Progress};
pub use record::StudentRecord;
pub use record_store::{RecordSelection, RecordSource, RecordStore};
pub use session::SessionContext;
pub use settings::Settings;
