use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Immutable job specification for one run. Loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    /// Folder watched for incoming bundles.
    pub incoming_folder_id: String,
    /// Folder receiving anonymised copies, text, index and summary.
    pub processed_folder_id: String,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// Local state directory. Defaults to `~/.pooldex` when absent.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(rename = "loop", default)]
    pub loop_mode: bool,
    #[serde(default = "default_loop_sleep_seconds")]
    pub loop_sleep_seconds: u64,
    /// Failures per file before it is quarantined.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub ocr: OcrSpec,
    #[serde(default)]
    pub extraction: ExtractionSpec,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("client_secrets.json")
}

fn default_loop_sleep_seconds() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OcrSpec {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_dpi() -> u32 {
    300
}

impl Default for OcrSpec {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            dpi: default_dpi(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionSpec {
    /// Occurrences of an applicant id required before it counts.
    #[serde(default = "default_min_id_matches")]
    pub min_id_matches: u32,
}

fn default_min_id_matches() -> u32 {
    3
}

impl Default for ExtractionSpec {
    fn default() -> Self {
        Self {
            min_id_matches: default_min_id_matches(),
        }
    }
}
