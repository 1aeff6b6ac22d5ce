pub mod loader;
pub mod schema;

pub use loader::{load_spec, load_spec_from_str};
pub use schema::{ExtractionSpec, JobSpec, OcrSpec};
