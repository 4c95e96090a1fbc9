//! Configuration for both pipeline stages.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `PERSON_PIPELINE_*` environment variables, then CLI flags applied by the
//! binaries. The resulting [`Config`] is built once and passed to each stage.

use crate::constants::*;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub anonymization: AnonymizationConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Persons endpoint
    pub url: String,
    /// Number of records requested per run
    pub total_quantity: usize,
    /// Records per request
    pub chunk_size: usize,
    pub timeout_seconds: u64,
    /// Forwarded as `_locale`
    pub locale: Option<String>,
    /// Forwarded as `_seed`, offset by the page index
    pub seed: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            total_quantity: DEFAULT_TOTAL_QUANTITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            locale: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Drop previously stored persons before writing a new batch
    pub fresh: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            fresh: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnonymizationConfig {
    /// When unset a salt is generated once and kept in the database.
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Markdown => "md",
            ReportFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    /// File stem, the extension follows the format
    pub file_name: String,
    pub format: ReportFormat,
    pub top_n: usize,
    pub focus_provider: String,
    pub focus_country: String,
    pub senior_age: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            file_name: "report".to_string(),
            format: ReportFormat::Markdown,
            top_n: DEFAULT_TOP_N,
            focus_provider: DEFAULT_FOCUS_PROVIDER.to_string(),
            focus_country: DEFAULT_FOCUS_COUNTRY.to_string(),
            senior_age: DEFAULT_SENIOR_AGE,
        }
    }
}

impl ReportConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.file_name, self.format.extension()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rotated JSON logs; console only when unset
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path` (or `pipeline.toml` when present) and the
    /// process environment, including a `.env` file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PERSON_PIPELINE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api.url = url;
        }
        if let Some(db_path) = lookup(ENV_DB_PATH) {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.report.output_dir = PathBuf::from(dir);
        }
        if let Some(salt) = lookup(ENV_SALT) {
            self.anonymization.salt = Some(salt);
        }
        if let Some(raw) = lookup(ENV_TOTAL_QUANTITY) {
            self.api.total_quantity = parse_env_usize(ENV_TOTAL_QUANTITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CHUNK_SIZE) {
            self.api.chunk_size = parse_env_usize(ENV_CHUNK_SIZE, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.chunk_size == 0 || self.api.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "api.chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {}",
                self.api.chunk_size
            )));
        }
        if self.api.total_quantity > MAX_TOTAL_QUANTITY {
            return Err(ConfigError::Invalid(format!(
                "api.total_quantity must be at most {MAX_TOTAL_QUANTITY}, got {}",
                self.api.total_quantity
            )));
        }
        reqwest::Url::parse(&self.api.url)
            .map_err(|e| ConfigError::Invalid(format!("api.url '{}' is not a valid URL: {e}", self.api.url)))?;
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.db_path must not be empty".into()));
        }
        if self.report.output_dir.as_os_str().is_empty() || self.report.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("report.output_dir and report.file_name must not be empty".into()));
        }
        if self.report.top_n == 0 {
            return Err(ConfigError::Invalid("report.top_n must be greater than 0".into()));
        }
        if matches!(&self.anonymization.salt, Some(s) if s.is_empty()) {
            return Err(ConfigError::Invalid("anonymization.salt must not be empty when set".into()));
        }
        Ok(())
    }
}

fn parse_env_usize(var: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::Env {
        var: var.to_string(),
        reason: format!("{e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.api.url, DEFAULT_API_URL);
        assert_eq!(config.storage.db_path, PathBuf::from("persons.sqlite"));
        assert_eq!(config.report.output_path(), PathBuf::from("reports/report.md"));
    }

    #[test]
    fn toml_sections_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            [api]
            total_quantity = 10
            chunk_size = 5
            seed = 42

            [report]
            format = "json"
            focus_country = "France"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.total_quantity, 10);
        assert_eq!(config.api.chunk_size, 5);
        assert_eq!(config.api.seed, Some(42));
        assert_eq!(config.api.url, DEFAULT_API_URL);
        assert_eq!(config.report.format, ReportFormat::Json);
        assert_eq!(config.report.focus_country, "France");
        assert_eq!(config.report.output_path(), PathBuf::from("reports/report.json"));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DB_PATH, "/tmp/people.sqlite"),
            (ENV_CHUNK_SIZE, "250"),
            (ENV_SALT, "pepper"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/people.sqlite"));
        assert_eq!(config.api.chunk_size, 250);
        assert_eq!(config.anonymization.salt.as_deref(), Some("pepper"));
    }

    #[test]
    fn bad_env_number_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == ENV_TOTAL_QUANTITY).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let mut config = Config::default();
        config.api.chunk_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_quantities_are_invalid() {
        let mut config = Config::default();
        config.api.total_quantity = usize::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.api.chunk_size = usize::MAX / 2;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.api.total_quantity = MAX_TOTAL_QUANTITY;
        config.api.chunk_size = MAX_CHUNK_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unparseable_url_is_invalid() {
        let mut config = Config::default();
        config.api.url = "not a url".into();
        assert!(config.validate().is_err());
    }
}
