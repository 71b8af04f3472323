pub mod config;
pub mod intake;
pub mod processor;
pub mod service;

pub use config::PipelineConfig;
pub use intake::spawn_intake_watcher;
pub use processor::{ProcessOptions, StatementProcessor};
pub use service::{IngestService, Page, StatementProgress, UploadOptions};
