use std::path::Path;

use crate::config::schema::JobSpec;
use crate::error::ConfigError;

pub fn load_spec<P: AsRef<Path>>(path: P) -> Result<JobSpec, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_spec_from_str(&content)
}

pub fn load_spec_from_str(content: &str) -> Result<JobSpec, ConfigError> {
    let spec: JobSpec = serde_yaml::from_str(content)?;

    validate_spec(&spec)?;

    Ok(spec)
}

fn validate_spec(spec: &JobSpec) -> Result<(), ConfigError> {
    if spec.incoming_folder_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "incoming_folder_id must not be empty".to_string(),
        });
    }

    if spec.processed_folder_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "processed_folder_id must not be empty".to_string(),
        });
    }

    if spec.incoming_folder_id == spec.processed_folder_id {
        return Err(ConfigError::Validation {
            message: "incoming_folder_id and processed_folder_id must differ".to_string(),
        });
    }

    if spec.loop_sleep_seconds == 0 {
        return Err(ConfigError::Validation {
            message: "loop_sleep_seconds must be at least 1".to_string(),
        });
    }

    if spec.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "max_attempts must be at least 1".to_string(),
        });
    }

    if spec.ocr.languages.is_empty() {
        return Err(ConfigError::Validation {
            message: "ocr.languages must not be empty".to_string(),
        });
    }

    if !(72..=1200).contains(&spec.ocr.dpi) {
        return Err(ConfigError::Validation {
            message: format!("ocr.dpi must be within 72..=1200, got {}", spec.ocr.dpi),
        });
    }

    if spec.extraction.min_id_matches == 0 {
        return Err(ConfigError::Validation {
            message: "extraction.min_id_matches must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_spec_applies_defaults() {
        let yaml = r#"
incoming_folder_id: "folder-in"
processed_folder_id: "folder-out"
"#;

        let spec = load_spec_from_str(yaml).unwrap();
        assert_eq!(spec.incoming_folder_id, "folder-in");
        assert_eq!(spec.processed_folder_id, "folder-out");
        assert!(!spec.loop_mode);
        assert_eq!(spec.loop_sleep_seconds, 600);
        assert_eq!(spec.max_attempts, 5);
        assert_eq!(spec.ocr.languages, vec!["eng".to_string()]);
        assert_eq!(spec.ocr.dpi, 300);
        assert_eq!(spec.extraction.min_id_matches, 3);
        assert!(spec.store_path.is_none());
    }

    #[test]
    fn test_load_full_spec() {
        let yaml = r#"
incoming_folder_id: "folder-in"
processed_folder_id: "folder-out"
credentials_path: "/etc/pooldex/client_secrets.json"
store_path: "/var/lib/pooldex"
loop: true
loop_sleep_seconds: 120
max_attempts: 3
ocr:
  languages: [eng, deu]
  dpi: 450
extraction:
  min_id_matches: 2
"#;

        let spec = load_spec_from_str(yaml).unwrap();
        assert!(spec.loop_mode);
        assert_eq!(spec.loop_sleep_seconds, 120);
        assert_eq!(spec.max_attempts, 3);
        assert_eq!(spec.ocr.languages.len(), 2);
        assert_eq!(spec.ocr.dpi, 450);
        assert_eq!(spec.extraction.min_id_matches, 2);
    }

    #[test]
    fn test_empty_incoming_folder_rejected() {
        let yaml = r#"
incoming_folder_id: ""
processed_folder_id: "folder-out"
"#;

        assert!(load_spec_from_str(yaml).is_err());
    }

    #[test]
    fn test_same_folders_rejected() {
        let yaml = r#"
incoming_folder_id: "folder"
processed_folder_id: "folder"
"#;

        assert!(load_spec_from_str(yaml).is_err());
    }

    #[test]
    fn test_zero_sleep_rejected() {
        let yaml = r#"
incoming_folder_id: "folder-in"
processed_folder_id: "folder-out"
loop_sleep_seconds: 0
"#;

        assert!(load_spec_from_str(yaml).is_err());
    }

    #[test]
    fn test_out_of_range_dpi_rejected() {
        let yaml = r#"
incoming_folder_id: "folder-in"
processed_folder_id: "folder-out"
ocr:
  dpi: 30
"#;

        assert!(load_spec_from_str(yaml).is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
incoming_folder_id: "folder-in"
processed_folder_id: "folder-out"
incomingFolderId: "typo"
"#;

        assert!(load_spec_from_str(yaml).is_err());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let yaml = r#"
processed_folder_id: "folder-out"
"#;

        assert!(load_spec_from_str(yaml).is_err());
    }
}
