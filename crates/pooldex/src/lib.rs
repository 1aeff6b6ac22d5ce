pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod extract;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod retry;
pub mod run;
pub mod sanitize;

pub use config::{load_spec, JobSpec};
pub use db::Database;
pub use drive::{ClientSecrets, DriveClient, FolderStore, StoredTokenProvider};
pub use error::{ConfigError, PooldexError, ProcessError, Result, RunError};
pub use pipeline::Pipeline;
pub use record::{Record, RecordStatus, RunReport};
pub use run::RunCoordinator;
