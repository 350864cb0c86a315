use super::envelope::Severity;
use serde::{Deserialize, Serialize};

/// Retention knobs read by the pruner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSettings {
    pub enabled: bool,
    pub interval_hours: u32,
    pub max_age_hours: u32,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 1,
            max_age_hours: 24 * 7,
        }
    }
}

/// The single persisted configuration record. Replaced as a whole on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub capture_http: bool,
    pub capture_diagnostics: bool,
    pub minimum_level: Severity,
    pub ignore_paths: Vec<String>,
    pub ignore_static_files: bool,
    pub max_body_bytes: usize,
    pub retention: RetentionSettings,
    pub display_time_zone: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            capture_http: true,
            capture_diagnostics: true,
            minimum_level: Severity::Information,
            ignore_paths: Vec::new(),
            ignore_static_files: true,
            max_body_bytes: 64 * 1024,
            retention: RetentionSettings::default(),
            display_time_zone: "UTC".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_in_defaults() {
        let settings: MonitorSettings =
            serde_json::from_str(r#"{"ignorePaths": ["/health"], "captureHttp": false}"#).unwrap();
        assert!(!settings.capture_http);
        assert_eq!(settings.ignore_paths, vec!["/health".to_string()]);
        assert_eq!(settings.retention, RetentionSettings::default());
        assert_eq!(settings.display_time_zone, "UTC");
    }
}
