//! Converter configuration
//!
//! Sources, later ones win: built-in defaults, a TOML file, environment
//! variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunker::{ChunkThresholds, Chunker, ChunkingMode};
use crate::error::{ConvertError, ConvertResult};

/// Project-local config file name.
pub const CONFIG_FILE: &str = "hive2bq.toml";

/// Settings for one converter instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Repair attempts after the first failed validation
    pub max_retries: u32,

    /// Validate the Hive input before converting
    pub source_validation: bool,

    /// Whether oversized statements are chunked
    pub chunking: ChunkingMode,

    /// Character count above which a statement is chunked
    pub max_sql_length: usize,

    /// Line count above which a statement is chunked
    pub max_sql_lines: usize,

    /// CSV file with Hive → BigQuery table names (optional)
    pub table_mapping_csv: Option<PathBuf>,

    /// Expand `${zdt...}` macros before target validation
    pub expand_templates: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let thresholds = ChunkThresholds::default();
        Self {
            max_retries: 15,
            source_validation: true,
            chunking: ChunkingMode::Auto,
            max_sql_length: thresholds.max_chars,
            max_sql_lines: thresholds.max_lines,
            table_mapping_csv: None,
            expand_templates: true,
        }
    }
}

impl ConverterConfig {
    /// Defaults, then the config file, then the process environment.
    ///
    /// An explicit `path` must exist. Without one, `./hive2bq.toml` and then
    /// `<config dir>/hive2bq/config.toml` are tried.
    pub fn load(path: Option<&Path>) -> ConvertResult<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::discover(),
        };

        let mut config = match file {
            Some(file) => {
                tracing::debug!("Loading config from {}", file.display());
                let content = std::fs::read_to_string(&file)?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> ConvertResult<Self> {
        Ok(toml::from_str(content)?)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("hive2bq").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Override fields from environment-style variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConvertResult<()> {
        if let Some(v) = lookup("MAX_RETRIES") {
            self.max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("HIVE_VALIDATION_MODE") {
            self.source_validation = !matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "disabled" | "skip" | "off" | "false" | "0"
            );
        }
        if let Some(v) = lookup("SQL_CHUNKING_MODE") {
            self.chunking = v.parse()?;
        }
        if let Some(v) = lookup("MAX_SQL_LENGTH") {
            self.max_sql_length = parse_number("MAX_SQL_LENGTH", &v)?;
        }
        if let Some(v) = lookup("MAX_SQL_LINES") {
            self.max_sql_lines = parse_number("MAX_SQL_LINES", &v)?;
        }
        if let Some(v) = lookup("TABLE_MAPPING_CSV") {
            self.table_mapping_csv = Some(PathBuf::from(v.trim()));
        }
        if let Some(v) = lookup("EXPAND_TEMPLATES") {
            self.expand_templates = parse_bool("EXPAND_TEMPLATES", &v)?;
        }
        Ok(())
    }

    pub fn thresholds(&self) -> ChunkThresholds {
        ChunkThresholds {
            max_chars: self.max_sql_length,
            max_lines: self.max_sql_lines,
        }
    }

    pub fn chunker(&self) -> Chunker {
        Chunker::new(self.thresholds(), self.chunking)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ConvertResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConvertError::config(key, value, "a non-negative integer"))
}

fn parse_bool(key: &str, value: &str) -> ConvertResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConvertError::config(key, value, "true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ConverterConfig::default();
        assert_eq!(config.max_retries, 15);
        assert!(config.source_validation);
        assert_eq!(config.chunking, ChunkingMode::Auto);
        assert_eq!(config.thresholds(), ChunkThresholds::default());
    }

    #[test]
    fn test_toml_partial() {
        let config = ConverterConfig::from_toml_str(
            r#"
            max_retries = 3
            chunking = "always"
            table_mapping_csv = "maps/hive2bq.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.chunking, ChunkingMode::Always);
        assert_eq!(config.max_sql_lines, 200);
        assert_eq!(
            config.table_mapping_csv.as_deref(),
            Some(Path::new("maps/hive2bq.csv"))
        );
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        assert!(ConverterConfig::from_toml_str("max_retrys = 3").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConverterConfig::default();
        config
            .apply_env(env(&[
                ("MAX_RETRIES", "1"),
                ("HIVE_VALIDATION_MODE", "Skip"),
                ("SQL_CHUNKING_MODE", "disabled"),
                ("MAX_SQL_LENGTH", "100"),
                ("EXPAND_TEMPLATES", "false"),
            ]))
            .unwrap();
        assert_eq!(config.max_retries, 1);
        assert!(!config.source_validation);
        assert_eq!(config.chunking, ChunkingMode::Disabled);
        assert_eq!(config.max_sql_length, 100);
        assert!(!config.expand_templates);
    }

    #[test]
    fn test_env_invalid_values() {
        let mut config = ConverterConfig::default();
        let err = config.apply_env(env(&[("MAX_RETRIES", "-2")])).unwrap_err();
        assert!(err.to_string().contains("MAX_RETRIES='-2'"));
        assert!(config.apply_env(env(&[("SQL_CHUNKING_MODE", "eager")])).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_sql_lines = 50").unwrap();
        let config = ConverterConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.thresholds().max_lines, 50);

        assert!(ConverterConfig::load(Some(Path::new("/nonexistent/hive2bq.toml"))).is_err());
    }
}
