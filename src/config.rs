use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ImportError, Result};
use crate::pipeline::orchestrator::DEFAULT_APPLY_LEASE;
use crate::pipeline::{DecoderOptions, ReviewOptions};
use crate::storage::sqlite::DATABASE_FILE;

pub const DEFAULT_CONFIG_PATH: &str = "school_import.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub review: ReviewConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the SQLite catalog.
    pub data_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub strict_dispatch: bool,
    pub quoting: bool,
    /// Seconds before an unfinished apply may be taken over by `resume`.
    pub apply_lease_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            strict_dispatch: false,
            quoting: true,
            apply_lease_secs: DEFAULT_APPLY_LEASE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// Also write JSON logs to a daily-rolling file under `dir`.
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            json_file: true,
        }
    }
}

impl Config {
    /// Load `.env`, then the TOML file, then environment overrides.
    ///
    /// Without an explicit path a missing `school_import.toml` means defaults; an explicit
    /// path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(root) = lookup("SCHOOL_IMPORT_DATA_ROOT") {
            self.storage.data_root = PathBuf::from(root);
        }
        if let Some(dir) = lookup("SCHOOL_IMPORT_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("SCHOOL_IMPORT_STRICT_DISPATCH") {
            self.review.strict_dispatch = parse_flag("SCHOOL_IMPORT_STRICT_DISPATCH", &raw)?;
        }
        if let Some(raw) = lookup("SCHOOL_IMPORT_APPLY_LEASE_SECS") {
            self.review.apply_lease_secs = raw.trim().parse().map_err(|_| {
                ImportError::Config(format!(
                    "SCHOOL_IMPORT_APPLY_LEASE_SECS must be a number of seconds, got '{}'",
                    raw
                ))
            })?;
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage.data_root.join(DATABASE_FILE)
    }

    pub fn review_options(&self) -> ReviewOptions {
        ReviewOptions {
            decoder: DecoderOptions {
                quoting: self.review.quoting,
            },
            strict_dispatch: self.review.strict_dispatch,
            apply_lease: Duration::from_secs(self.review.apply_lease_secs),
        }
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ImportError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.data_root, PathBuf::from("data"));
        assert!(!config.review.strict_dispatch);
        assert!(config.review.quoting);
        assert_eq!(config.review.apply_lease_secs, 600);
        assert!(config.logging.json_file);
        assert_eq!(
            config.database_path(),
            PathBuf::from("data").join("school_import.db")
        );
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [review]
            strict_dispatch = true

            [logging]
            dir = "/var/log/school_import"
            "#,
        )
        .unwrap();

        assert!(config.review.strict_dispatch);
        assert!(config.review.quoting);
        assert_eq!(config.logging.dir, PathBuf::from("/var/log/school_import"));
        assert_eq!(config.storage, StorageConfig::default());

        let options = config.review_options();
        assert!(options.strict_dispatch);
        assert!(options.decoder.quoting);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("[review]\nquoting = \"sometimes\""),
            Err(ImportError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ImportError::Config(_))
        ));
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SCHOOL_IMPORT_DATA_ROOT", "/srv/ecole"),
            ("SCHOOL_IMPORT_STRICT_DISPATCH", "on"),
            ("SCHOOL_IMPORT_APPLY_LEASE_SECS", "45"),
        ]);
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.data_root, PathBuf::from("/srv/ecole"));
        assert!(config.review.strict_dispatch);
        assert_eq!(config.review_options().apply_lease, Duration::from_secs(45));
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_invalid_flag_override_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "SCHOOL_IMPORT_STRICT_DISPATCH").then(|| "peut-être".to_string())
        });
        assert!(matches!(result, Err(ImportError::Config(_))));
    }
}
