use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PooldexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Drive error: {0}")]
    Drive(#[from] crate::drive::DriveError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read job spec '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse job spec YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Job spec validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to load PDF: {0}")]
    PdfLoad(String),

    #[error("Failed to rasterize page {page}: {reason}")]
    PageRender { page: u32, reason: String },

    #[error("Failed to decode page image: {0}")]
    ImageDecode(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Failed to parse recognition output: {0}")]
    RecognitionParse(String),

    #[error("Failed to render aggregate output: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pass-level failures: the whole pass aborts, the loop continues.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to list folder '{folder}': {source}")]
    ListFolder {
        folder: String,
        #[source]
        source: crate::drive::DriveError,
    },

    #[error("Failed to upload aggregate '{name}': {source}")]
    AggregateUpload {
        name: String,
        #[source]
        source: crate::drive::DriveError,
    },

    #[error("Failed to build aggregate output: {0}")]
    AggregateBuild(#[from] ProcessError),

    #[error("State store error: {0}")]
    State(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, PooldexError>;
