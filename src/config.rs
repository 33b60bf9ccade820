use crate::error::{ReconError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Runtime settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Saved cheque flags.
    pub flag_store: PathBuf,
    /// Last uploaded recovery sheet, reused when a run has no upload.
    pub recovery_cache: PathBuf,
    /// Serialized session state between runs.
    pub session_file: PathBuf,
    pub output_dir: PathBuf,
    /// Rows shown in console previews.
    pub preview_rows: usize,
    pub grand_total_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flag_store: PathBuf::from("cheque_flags.csv"),
            recovery_cache: PathBuf::from("data/recovery.csv"),
            session_file: PathBuf::from("session.json"),
            output_dir: PathBuf::from("reports"),
            preview_rows: 5,
            grand_total_label: "Grand Total".to_string(),
        }
    }
}

impl Config {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Config> {
        let body = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&body)
            .map_err(|e| ReconError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// The file at `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => Config::load(p),
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.grand_total_label.trim().is_empty() {
            return Err(ReconError::InvalidConfig(
                "grand_total_label must not be blank".into(),
            ));
        }
        for (name, path) in [
            ("flag_store", &self.flag_store),
            ("recovery_cache", &self.recovery_cache),
            ("session_file", &self.session_file),
            ("output_dir", &self.output_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ReconError::InvalidConfig(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"preview_rows": 12, "output_dir": "out"}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.preview_rows, 12);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.flag_store, PathBuf::from("cheque_flags.csv"));
        assert_eq!(config.grand_total_label, "Grand Total");
    }

    #[test]
    fn unknown_keys_and_blank_label_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"preview_row": 3}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ReconError::InvalidConfig(_))));
        std::fs::write(&path, r#"{"grand_total_label": " "}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ReconError::InvalidConfig(_))));
    }

    #[test]
    fn no_path_means_defaults() {
        assert_eq!(Config::load_or_default(None).unwrap(), Config::default());
    }
}
